use brandwatch_core::{Post, SentimentLabel, SentimentResult};
use serde::{Deserialize, Serialize};

use crate::title::{TitleSentiment, TitleSentimentAnalyzer};

/// Title and body sentiment of one post.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PostSentiment {
    pub post_id: String,
    pub title: String,
    pub title_sentiment: TitleSentiment,
    /// `None` when the post has no body.
    pub content_sentiment: Option<SentimentResult>,
    /// Always the title label; the body does not weigh in.
    pub overall_sentiment: SentimentLabel,
}

/// Scores posts one after another, in input order.
pub async fn analyze_posts_sentiment_batch(
    analyzer: &TitleSentimentAnalyzer,
    posts: &[Post],
) -> Vec<PostSentiment> {
    let mut results = Vec::with_capacity(posts.len());

    for post in posts {
        let title_sentiment = analyzer.analyze(&post.title).await;
        let content_sentiment = if post.content.trim().is_empty() {
            None
        } else {
            Some(analyzer.scorer().score(&post.content).await)
        };

        results.push(PostSentiment {
            post_id: post.id.clone(),
            title: post.title.clone(),
            overall_sentiment: title_sentiment.sentiment,
            title_sentiment,
            content_sentiment,
        });
    }

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sentiment::SentimentScorer;
    use brandwatch_core::PostKind;
    use chrono::Utc;

    fn post(id: &str, title: &str, content: &str) -> Post {
        Post {
            id: id.to_string(),
            title: title.to_string(),
            content: content.to_string(),
            author: "a".to_string(),
            subreddit: "s".to_string(),
            url: String::new(),
            permalink: String::new(),
            score: 0,
            num_comments: 0,
            created_at: Utc::now(),
            kind: PostKind::Post,
        }
    }

    #[tokio::test]
    async fn test_overall_follows_title() {
        let analyzer = TitleSentimentAnalyzer::new(SentimentScorer::lexical(), None);
        let posts = vec![
            post("1", "I love it", "but honestly it is a terrible awful scam"),
            post("2", "Terrible experience", ""),
        ];

        let results = analyze_posts_sentiment_batch(&analyzer, &posts).await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].post_id, "1");
        assert_eq!(results[0].overall_sentiment, SentimentLabel::Positive);
        assert_eq!(results[0].title_sentiment.explanation, "Basic analysis: positive");
        assert_eq!(
            results[0].content_sentiment.as_ref().map(|s| s.label),
            Some(SentimentLabel::Negative)
        );
        assert_eq!(results[1].overall_sentiment, SentimentLabel::Negative);
        assert!(results[1].content_sentiment.is_none());
    }

    #[tokio::test]
    async fn test_untitled_post_is_neutral() {
        let analyzer = TitleSentimentAnalyzer::new(SentimentScorer::lexical(), None);
        let results = analyze_posts_sentiment_batch(&analyzer, &[post("3", "", "scam")]).await;

        assert_eq!(results[0].overall_sentiment, SentimentLabel::Neutral);
        assert_eq!(results[0].title_sentiment.explanation, "Empty title");
        assert_eq!(
            results[0].content_sentiment.as_ref().map(|s| s.label),
            Some(SentimentLabel::Negative)
        );
    }
}
