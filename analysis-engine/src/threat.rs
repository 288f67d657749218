use brandwatch_core::{
    matched_keywords, ErrorExt, LlmProvider, Post, SentimentLabel, SentimentResult, ThreatLevel,
    ThreatResult,
};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{debug, error, warn};

use crate::sentiment::SentimentScorer;
use crate::taxonomy;

pub const CONTEXT_UNAVAILABLE: &str = "Context analysis unavailable (no context model configured)";
pub const CONTEXT_FAILED: &str = "Context analysis failed";
pub const ANALYSIS_ERROR_NOTE: &str = "Error occurred during analysis";
pub const IMPACT_UNKNOWN_NOTE: &str = "Unable to assess impact";
pub const LOW_IMPACT_NOTE: &str = "Low potential impact - limited reach and engagement";

const KEYWORD_WEIGHT: f64 = 0.1;
const KEYWORD_CAP: f64 = 0.3;
const SENTIMENT_WEIGHT: f64 = 0.4;
const ENGAGEMENT_BONUS: f64 = 0.1;
const CONTENT_WEIGHT: f64 = 0.05;
const CONTENT_CAP: f64 = 0.3;

/// The four independently capped parts of a threat score.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScoreFactors {
    pub keyword: f64,
    pub sentiment: f64,
    pub engagement: f64,
    pub content: f64,
}

impl ScoreFactors {
    pub fn compute(
        post: &Post,
        text_lower: &str,
        matched_count: usize,
        sentiment: &SentimentResult,
    ) -> Self {
        let keyword = (KEYWORD_WEIGHT * matched_count as f64).min(KEYWORD_CAP);

        let sentiment = if sentiment.label == SentimentLabel::Negative {
            SENTIMENT_WEIGHT * sentiment.confidence
        } else {
            0.0
        };

        // Downvoted and busy threads share one slot; a post that is both
        // still earns a single bonus.
        #[allow(clippy::if_same_then_else)]
        let engagement = if post.score < -5 {
            ENGAGEMENT_BONUS
        } else if post.num_comments > 50 {
            ENGAGEMENT_BONUS
        } else {
            0.0
        };

        let content =
            (CONTENT_WEIGHT * taxonomy::threat_word_count(text_lower) as f64).min(CONTENT_CAP);

        Self {
            keyword: keyword.max(0.0),
            sentiment: sentiment.max(0.0),
            engagement,
            content: content.max(0.0),
        }
    }

    /// Sum of the factors clamped to [0, 1]. Non-finite sums are 0.
    pub fn total(&self) -> f64 {
        let sum = self.keyword + self.sentiment + self.engagement + self.content;
        if sum.is_finite() {
            sum.clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Multi-factor threat scoring for a single post.
#[derive(Clone)]
pub struct ThreatAnalyzer {
    scorer: SentimentScorer,
    context: Option<Arc<dyn LlmProvider>>,
}

impl ThreatAnalyzer {
    pub fn new(scorer: SentimentScorer, context: Option<Arc<dyn LlmProvider>>) -> Self {
        Self { scorer, context }
    }

    pub fn scorer(&self) -> &SentimentScorer {
        &self.scorer
    }

    /// Scores sentiment of the post text, then analyzes it.
    pub async fn analyze(&self, post: &Post, keywords: &[String]) -> ThreatResult {
        let sentiment = self.scorer.score(&post.full_text()).await;
        self.analyze_with_sentiment(post, keywords, &sentiment).await
    }

    /// Analysis reusing a sentiment already computed for the post's full text.
    ///
    /// Never fails; a panic inside the analysis yields [`analysis_failed`].
    pub async fn analyze_with_sentiment(
        &self,
        post: &Post,
        keywords: &[String],
        sentiment: &SentimentResult,
    ) -> ThreatResult {
        match AssertUnwindSafe(self.run(post, keywords, sentiment))
            .catch_unwind()
            .await
        {
            Ok(result) => result,
            Err(_) => {
                error!(post_id = %post.id, "Threat analysis panicked, using safe default");
                analysis_failed()
            }
        }
    }

    async fn run(
        &self,
        post: &Post,
        keywords: &[String],
        sentiment: &SentimentResult,
    ) -> ThreatResult {
        let full_text = post.full_text();
        let text_lower = full_text.to_lowercase();

        let matched = matched_keywords(&full_text, keywords);
        let factors = ScoreFactors::compute(post, &text_lower, matched.len(), sentiment);
        let score = factors.total();
        let level = ThreatLevel::from_score(score);
        let categories = taxonomy::categories_for(&text_lower);

        debug!(
            post_id = %post.id,
            score,
            level = %level,
            keyword = factors.keyword,
            sentiment = factors.sentiment,
            engagement = factors.engagement,
            content = factors.content,
            "Threat score computed"
        );

        let context_note = self.context_note(post).await;
        let impact_note = impact_note(post, score);

        ThreatResult {
            level,
            score,
            categories,
            matched_keywords: matched,
            context_note,
            impact_note,
        }
    }

    async fn context_note(&self, post: &Post) -> String {
        let Some(provider) = &self.context else {
            return CONTEXT_UNAVAILABLE.to_string();
        };

        match provider.generate(&context_prompt(post)).await {
            Ok(note) if !note.trim().is_empty() => note.trim().to_string(),
            Ok(_) => CONTEXT_UNAVAILABLE.to_string(),
            Err(e) => {
                warn!(
                    provider = provider.provider_name(),
                    code = %e.error_code(),
                    "Context analysis failed: {}", e
                );
                CONTEXT_FAILED.to_string()
            }
        }
    }
}

/// Safe result used when analysis cannot complete.
pub fn analysis_failed() -> ThreatResult {
    ThreatResult {
        level: ThreatLevel::Low,
        score: 0.1,
        categories: Vec::new(),
        matched_keywords: Vec::new(),
        context_note: ANALYSIS_ERROR_NOTE.to_string(),
        impact_note: IMPACT_UNKNOWN_NOTE.to_string(),
    }
}

/// Rule-based reach and severity summary.
pub fn impact_note(post: &Post, threat_score: f64) -> String {
    let mut factors = Vec::new();

    if taxonomy::is_high_reach(&post.subreddit) {
        factors.push("High visibility subreddit");
    }

    if post.score > 100 {
        factors.push("High upvote count");
    } else if post.score < -10 {
        factors.push("Negative community response");
    }

    if post.num_comments > 50 {
        factors.push("High engagement (many comments)");
    }

    if threat_score > 0.7 {
        factors.push("Severe threat detected");
    } else if threat_score > 0.4 {
        factors.push("Moderate threat level");
    }

    if factors.is_empty() {
        return LOW_IMPACT_NOTE.to_string();
    }
    format!("Potential impact: {}", factors.join(", "))
}

fn context_prompt(post: &Post) -> String {
    format!(
        "Analyze the following Reddit {kind} for threats, concerns or opportunities \
         for the brand it mentions.\n\n\
         Subreddit: {subreddit}\n\
         Title: {title}\n\
         Content: {content}\n\
         Score: {score}\n\
         Comments: {comments}\n\n\
         Cover the products or services mentioned and the issues raised, the \
         author's sentiment towards the brand, the likely reputational impact, \
         any competitor comparisons, and how urgently the brand should respond. \
         Keep the analysis under 250 words.",
        kind = post.kind.as_str(),
        subreddit = post.subreddit,
        title = post.title,
        content = post.content,
        score = post.score,
        comments = post.num_comments,
    )
}
