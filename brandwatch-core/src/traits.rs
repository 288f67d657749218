//! Contracts for the collaborators the monitoring core depends on.
//!
//! Concrete implementations live in `reddit-client`, `llm-interface` and
//! `database`; tests supply their own in-process fakes.

use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::HashMap;

use crate::error::CoreError;
use crate::types::{
    GroupKey, Mention, MentionFilter, MentionId, MentionSort, MonitoringStats, Post, SearchQuery,
    SentimentLabel,
};

/// One-shot stream of candidate posts. Re-invoke the search to scan again.
pub type PostStream<'a> = BoxStream<'a, Result<Post, CoreError>>;

/// Source of Reddit posts and comments.
///
/// Implementations must only yield items whose title or body contains at
/// least one of the query keywords (case-insensitive substring). Items that
/// fail to convert are skipped with a warning rather than yielded as errors.
#[async_trait]
pub trait PostSource: Send + Sync {
    async fn search_by_keywords<'a>(&'a self, query: &SearchQuery)
        -> Result<PostStream<'a>, CoreError>;

    async fn get_by_id(&self, id: &str) -> Result<Option<Post>, CoreError>;
}

/// Output of a primary sentiment model.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub label: SentimentLabel,
    pub confidence: f64,
}

/// Primary sentiment model. Any error sends the caller to its fallback.
#[async_trait]
pub trait SentimentClassifier: Send + Sync {
    async fn classify(&self, text: &str) -> Result<Classification, CoreError>;
}

/// Free-form text generation used for context notes.
#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn provider_name(&self) -> &str;

    async fn generate(&self, prompt: &str) -> Result<String, CoreError>;
}

/// Persistence for mentions and the stats snapshot.
///
/// `insert` must reject a second mention for the same `post.id` with
/// `DatabaseError::DuplicateMention`; this is the only guard against two
/// concurrent scans storing the same post.
#[async_trait]
pub trait MentionStore: Send + Sync {
    async fn exists_by_post_id(&self, post_id: &str) -> Result<bool, CoreError>;

    async fn insert(&self, mention: &Mention) -> Result<MentionId, CoreError>;

    async fn find_by_id(&self, id: MentionId) -> Result<Option<Mention>, CoreError>;

    async fn find_by_post_id(&self, post_id: &str) -> Result<Option<Mention>, CoreError>;

    async fn find_filtered(
        &self,
        filter: &MentionFilter,
        sort: MentionSort,
        skip: u32,
        limit: u32,
    ) -> Result<Vec<Mention>, CoreError>;

    async fn count_filtered(&self, filter: &MentionFilter) -> Result<u64, CoreError>;

    async fn aggregate_group_count(
        &self,
        filter: &MentionFilter,
        key: GroupKey,
    ) -> Result<HashMap<String, u64>, CoreError>;

    /// Replaces the stats snapshot atomically.
    async fn upsert_stats(&self, stats: &MonitoringStats) -> Result<(), CoreError>;

    async fn get_stats(&self) -> Result<Option<MonitoringStats>, CoreError>;

    /// Returns false when no mention has this id.
    async fn mark_reviewed(&self, id: MentionId, notes: Option<&str>) -> Result<bool, CoreError>;
}
