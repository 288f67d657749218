use brandwatch_core::{Post, RecommendationResult, ThreatLevel, ThreatResult};
use std::panic::{self, AssertUnwindSafe};
use tracing::error;

const DIRECT_RESPONSE_TEMPLATE: &str = "Thank you for bringing this to our attention. We take all \
     feedback seriously and would like to address your concerns directly. Please send us a private \
     message with more details so we can investigate and resolve this issue promptly.";

const SUPPORT_TEMPLATE: &str = "We appreciate your feedback and would like to learn more about \
     your experience. Please feel free to reach out to our customer support team so we can assist \
     you better.";

const MONITOR_TEMPLATE: &str =
    "Monitor for further developments. Consider engaging if conversation grows.";

struct ActionPlan {
    action_type: &'static str,
    priority: u8,
    escalation_needed: bool,
}

fn action_plan(level: ThreatLevel) -> ActionPlan {
    match level {
        ThreatLevel::Critical => ActionPlan {
            action_type: "Immediate Response Required",
            priority: 5,
            escalation_needed: true,
        },
        ThreatLevel::High => ActionPlan {
            action_type: "Urgent Response",
            priority: 4,
            escalation_needed: true,
        },
        ThreatLevel::Medium => ActionPlan {
            action_type: "Standard Response",
            priority: 3,
            escalation_needed: false,
        },
        ThreatLevel::Low => ActionPlan {
            action_type: "Monitor",
            priority: 1,
            escalation_needed: false,
        },
    }
}

fn message_template(level: ThreatLevel) -> &'static str {
    match level {
        ThreatLevel::Critical | ThreatLevel::High => DIRECT_RESPONSE_TEMPLATE,
        ThreatLevel::Medium => SUPPORT_TEMPLATE,
        ThreatLevel::Low => MONITOR_TEMPLATE,
    }
}

fn reasoning(threat: &ThreatResult) -> String {
    let mut reasons = vec![
        format!("Threat level: {}", threat.level),
        format!("Threat score: {:.2}", threat.score),
    ];

    if !threat.matched_keywords.is_empty() {
        reasons.push(format!(
            "Brand keywords detected: {}",
            threat.matched_keywords.join(", ")
        ));
    }
    if !threat.categories.is_empty() {
        reasons.push(format!(
            "Threat categories: {}",
            threat.categories.join(", ")
        ));
    }

    reasons.join("; ")
}

/// Response recommendation derived from the threat level.
pub fn generate_recommendation(post: &Post, threat: &ThreatResult) -> RecommendationResult {
    let built = panic::catch_unwind(AssertUnwindSafe(|| {
        let plan = action_plan(threat.level);
        RecommendationResult {
            action_type: plan.action_type.to_string(),
            priority: plan.priority,
            message_template: message_template(threat.level).to_string(),
            escalation_needed: plan.escalation_needed,
            reasoning: reasoning(threat),
        }
    }));

    match built {
        Ok(recommendation) => recommendation,
        Err(_) => {
            error!(post_id = %post.id, "Recommendation generation panicked, using review default");
            review_required()
        }
    }
}

/// Default returned when a recommendation cannot be built.
pub fn review_required() -> RecommendationResult {
    RecommendationResult {
        action_type: "Review Required".to_string(),
        priority: 2,
        message_template: "Please review this mention manually.".to_string(),
        escalation_needed: false,
        reasoning: "Error occurred during recommendation generation".to_string(),
    }
}
