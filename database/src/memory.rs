use async_trait::async_trait;
use brandwatch_core::{
    CoreError, DatabaseError, GroupKey, Mention, MentionFilter, MentionId, MentionSort,
    MentionStore, MonitoringStats,
};
use std::cmp::Ordering;
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct MemoryState {
    mentions: Vec<Mention>,
    next_id: MentionId,
    stats: Option<MonitoringStats>,
}

/// Process-local `MentionStore` with the same semantics as [`crate::Database`].
/// Nothing survives a restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<MemoryState>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.mentions.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

fn newest_first(a: &Mention, b: &Mention) -> Ordering {
    b.processed_at
        .cmp(&a.processed_at)
        .then_with(|| b.id.cmp(&a.id))
}

fn group_value(mention: &Mention, key: GroupKey) -> String {
    match key {
        GroupKey::ThreatLevel => mention.threat.level.as_str().to_string(),
        GroupKey::SentimentLabel => mention.sentiment.label.as_str().to_string(),
        GroupKey::Subreddit => mention.post.subreddit.clone(),
    }
}

#[async_trait]
impl MentionStore for MemoryStore {
    async fn exists_by_post_id(&self, post_id: &str) -> Result<bool, CoreError> {
        let state = self.state.read().await;
        Ok(state.mentions.iter().any(|m| m.post.id == post_id))
    }

    async fn insert(&self, mention: &Mention) -> Result<MentionId, CoreError> {
        let mut state = self.state.write().await;
        if state.mentions.iter().any(|m| m.post.id == mention.post.id) {
            return Err(DatabaseError::DuplicateMention {
                post_id: mention.post.id.clone(),
            }
            .into());
        }

        state.next_id += 1;
        let id = state.next_id;
        let mut stored = mention.clone();
        stored.id = Some(id);
        state.mentions.push(stored);
        Ok(id)
    }

    async fn find_by_id(&self, id: MentionId) -> Result<Option<Mention>, CoreError> {
        let state = self.state.read().await;
        Ok(state.mentions.iter().find(|m| m.id == Some(id)).cloned())
    }

    async fn find_by_post_id(&self, post_id: &str) -> Result<Option<Mention>, CoreError> {
        let state = self.state.read().await;
        Ok(state.mentions.iter().find(|m| m.post.id == post_id).cloned())
    }

    async fn find_filtered(
        &self,
        filter: &MentionFilter,
        sort: MentionSort,
        skip: u32,
        limit: u32,
    ) -> Result<Vec<Mention>, CoreError> {
        let state = self.state.read().await;
        let mut found: Vec<Mention> = state
            .mentions
            .iter()
            .filter(|m| filter.matches(m))
            .cloned()
            .collect();

        match sort {
            MentionSort::NewestFirst => found.sort_by(newest_first),
            MentionSort::HighestThreatFirst => found.sort_by(|a, b| {
                b.threat
                    .score
                    .total_cmp(&a.threat.score)
                    .then_with(|| newest_first(a, b))
            }),
        }

        Ok(found
            .into_iter()
            .skip(skip as usize)
            .take(limit as usize)
            .collect())
    }

    async fn count_filtered(&self, filter: &MentionFilter) -> Result<u64, CoreError> {
        let state = self.state.read().await;
        Ok(state.mentions.iter().filter(|m| filter.matches(m)).count() as u64)
    }

    async fn aggregate_group_count(
        &self,
        filter: &MentionFilter,
        key: GroupKey,
    ) -> Result<HashMap<String, u64>, CoreError> {
        let state = self.state.read().await;
        let mut groups = HashMap::new();
        for mention in state.mentions.iter().filter(|m| filter.matches(m)) {
            *groups.entry(group_value(mention, key)).or_insert(0) += 1;
        }
        Ok(groups)
    }

    async fn upsert_stats(&self, stats: &MonitoringStats) -> Result<(), CoreError> {
        self.state.write().await.stats = Some(stats.clone());
        Ok(())
    }

    async fn get_stats(&self) -> Result<Option<MonitoringStats>, CoreError> {
        Ok(self.state.read().await.stats.clone())
    }

    async fn mark_reviewed(&self, id: MentionId, notes: Option<&str>) -> Result<bool, CoreError> {
        let mut state = self.state.write().await;
        match state.mentions.iter_mut().find(|m| m.id == Some(id)) {
            Some(mention) => {
                mention.reviewed = true;
                if let Some(notes) = notes {
                    mention.notes = notes.to_string();
                }
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
