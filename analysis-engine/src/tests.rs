use crate::{generate_recommendation, SentimentScorer, ThreatAnalyzer};
use async_trait::async_trait;
use brandwatch_core::{
    Classification, CoreError, Post, PostKind, SentimentClassifier, SentimentLabel, ThreatLevel,
};
use chrono::Utc;
use std::sync::Arc;

struct NegativeModel;

#[async_trait]
impl SentimentClassifier for NegativeModel {
    async fn classify(&self, _text: &str) -> Result<Classification, CoreError> {
        Ok(Classification {
            label: SentimentLabel::Negative,
            confidence: 1.0,
        })
    }
}

fn post(title: &str, content: &str, subreddit: &str, score: i64, num_comments: i64) -> Post {
    Post {
        id: "t1".to_string(),
        title: title.to_string(),
        content: content.to_string(),
        author: "reporter".to_string(),
        subreddit: subreddit.to_string(),
        url: "https://example.com".to_string(),
        permalink: "/r/test/comments/t1".to_string(),
        score,
        num_comments,
        created_at: Utc::now(),
        kind: PostKind::Post,
    }
}

fn keywords(list: &[&str]) -> Vec<String> {
    list.iter().map(|k| k.to_string()).collect()
}

#[tokio::test]
async fn test_scam_post_escalates() {
    let analyzer = ThreatAnalyzer::new(SentimentScorer::new(Some(Arc::new(NegativeModel))), None);
    let post = post("Company X scam detected, terrible", "", "news", -10, 60);

    let threat = analyzer.analyze(&post, &keywords(&["Company X"])).await;
    assert_eq!(threat.level, ThreatLevel::High);
    assert!(threat
        .impact_note
        .starts_with("Potential impact: High visibility subreddit, High engagement (many comments)"));

    let recommendation = generate_recommendation(&post, &threat);
    assert!(recommendation.escalation_needed);
    assert_eq!(recommendation.priority, 4);
    assert!(recommendation
        .reasoning
        .contains("Brand keywords detected: Company X"));
}

#[tokio::test]
async fn test_lexical_only_pipeline_scores_negative_post() {
    let analyzer = ThreatAnalyzer::new(SentimentScorer::lexical(), None);
    let post = post(
        "Acme refund nightmare",
        "Worst support ever, total scam. Avoid Acme, filing a complaint and a lawsuit.",
        "gadgets",
        2,
        4,
    );

    let threat = analyzer.analyze(&post, &keywords(&["acme", "globex"])).await;

    assert_eq!(threat.matched_keywords, keywords(&["acme"]));
    assert!(threat.score >= 0.3);
    assert!(threat.categories.contains(&"Legal/Regulatory".to_string()));
    assert!(threat.categories.contains(&"Repair/Support".to_string()));
}

#[tokio::test]
async fn test_more_matched_keywords_never_lower_the_score() {
    let analyzer = ThreatAnalyzer::new(SentimentScorer::lexical(), None);
    let post = post("Acme and Globex and Initech are broken", "", "rust", 0, 0);
    let all = keywords(&["Acme", "Globex", "Initech", "Umbrella"]);

    let mut previous = 0.0;
    for take in 0..=all.len() {
        let threat = analyzer.analyze(&post, &all[..take]).await;
        assert!(threat.score >= previous);
        assert!((0.0..=1.0).contains(&threat.score));
        previous = threat.score;
    }
}
