//! Sentiment and threat analysis for brand mentions.

pub mod batch;
pub mod lexicon;
pub mod recommendation;
pub mod sentiment;
pub mod taxonomy;
pub mod threat;
pub mod title;

pub use batch::{analyze_posts_sentiment_batch, PostSentiment};
pub use lexicon::PolarityLexicon;
pub use recommendation::{generate_recommendation, review_required};
pub use sentiment::SentimentScorer;
pub use threat::{analysis_failed, impact_note, ScoreFactors, ThreatAnalyzer};
pub use title::{TitleSentiment, TitleSentimentAnalyzer};

#[cfg(test)]
mod tests;
