//! In-process collaborators for engine and scheduler tests.

use async_trait::async_trait;
use brandwatch_core::{
    Classification, CoreError, DatabaseError, GroupKey, Mention, MentionFilter, MentionId,
    MentionSort, MentionStore, MonitoringStats, Post, PostKind, PostSource, PostStream,
    SearchQuery, SentimentClassifier, SentimentLabel,
};
use chrono::Utc;
use database::MemoryStore;
use futures::{stream, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::ThreatNotifier;

pub fn post(id: &str, title: &str, subreddit: &str) -> Post {
    Post {
        id: id.to_string(),
        title: title.to_string(),
        content: String::new(),
        author: "poster".to_string(),
        subreddit: subreddit.to_string(),
        url: format!("https://www.reddit.com/r/{subreddit}/comments/{id}/"),
        permalink: format!("https://www.reddit.com/r/{subreddit}/comments/{id}/"),
        score: 5,
        num_comments: 2,
        created_at: Utc::now(),
        kind: PostKind::Post,
    }
}

/// A post that scores CRITICAL with [`NegativeModel`] and keyword "Acme".
pub fn scam_post(id: &str) -> Post {
    Post {
        title: "Acme scam, fraud and a lawsuit".to_string(),
        content: "Defective, dangerous and unsafe. Avoid.".to_string(),
        score: -20,
        ..post(id, "", "gadgets")
    }
}

pub enum Item {
    Post(Post),
    Malformed(String),
    Unavailable,
}

impl Item {
    fn to_result(&self) -> Result<Post, CoreError> {
        match self {
            Item::Post(post) => Ok(post.clone()),
            Item::Malformed(id) => Err(CoreError::malformed(id.clone(), "missing created_utc")),
            Item::Unavailable => Err(CoreError::source_unavailable("static", "connection reset")),
        }
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

/// Replays a fixed list of items on every search.
#[derive(Default)]
pub struct StaticSource {
    pub items: Mutex<Vec<Item>>,
    pub searches: AtomicUsize,
    pub failures_left: AtomicUsize,
    pub panics_left: AtomicUsize,
    pub hang: AtomicBool,
    pub last_query: Mutex<Option<SearchQuery>>,
}

impl StaticSource {
    pub fn with_posts(posts: Vec<Post>) -> Self {
        let source = Self::default();
        *source.items.lock().unwrap() = posts.into_iter().map(Item::Post).collect();
        source
    }

    pub fn push(&self, item: Item) {
        self.items.lock().unwrap().push(item);
    }

    pub fn searches(&self) -> usize {
        self.searches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PostSource for StaticSource {
    async fn search_by_keywords<'a>(
        &'a self,
        query: &SearchQuery,
    ) -> Result<PostStream<'a>, CoreError> {
        self.searches.fetch_add(1, Ordering::SeqCst);
        *self.last_query.lock().unwrap() = Some(query.clone());

        if self.hang.load(Ordering::SeqCst) {
            futures::future::pending::<()>().await;
        }
        if take_one(&self.panics_left) {
            panic!("source exploded");
        }
        if take_one(&self.failures_left) {
            return Err(CoreError::source_unavailable("static", "search endpoint down"));
        }

        let items: Vec<Result<Post, CoreError>> =
            self.items.lock().unwrap().iter().map(Item::to_result).collect();
        Ok(stream::iter(items).boxed())
    }

    async fn get_by_id(&self, id: &str) -> Result<Option<Post>, CoreError> {
        let items = self.items.lock().unwrap();
        Ok(items.iter().find_map(|item| match item {
            Item::Post(post) if post.id == id => Some(post.clone()),
            _ => None,
        }))
    }
}

pub struct NegativeModel;

#[async_trait]
impl SentimentClassifier for NegativeModel {
    async fn classify(&self, _text: &str) -> Result<Classification, CoreError> {
        Ok(Classification {
            label: SentimentLabel::Negative,
            confidence: 0.95,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreFault {
    None,
    /// Every call fails as if the database were down.
    Unavailable,
    /// The existence check always misses, as it would for a concurrent scan.
    StaleExistenceCheck,
}

/// [`MemoryStore`] with injectable faults.
pub struct FlakyStore {
    pub inner: MemoryStore,
    fault: Mutex<StoreFault>,
}

impl FlakyStore {
    pub fn new(fault: StoreFault) -> Self {
        Self {
            inner: MemoryStore::new(),
            fault: Mutex::new(fault),
        }
    }

    pub fn set_fault(&self, fault: StoreFault) {
        *self.fault.lock().unwrap() = fault;
    }

    fn check(&self) -> Result<StoreFault, CoreError> {
        let fault = *self.fault.lock().unwrap();
        if fault == StoreFault::Unavailable {
            return Err(DatabaseError::ConnectionFailed {
                reason: "disk unplugged".to_string(),
            }
            .into());
        }
        Ok(fault)
    }
}

#[async_trait]
impl MentionStore for FlakyStore {
    async fn exists_by_post_id(&self, post_id: &str) -> Result<bool, CoreError> {
        if self.check()? == StoreFault::StaleExistenceCheck {
            return Ok(false);
        }
        self.inner.exists_by_post_id(post_id).await
    }

    async fn insert(&self, mention: &Mention) -> Result<MentionId, CoreError> {
        self.check()?;
        self.inner.insert(mention).await
    }

    async fn find_by_id(&self, id: MentionId) -> Result<Option<Mention>, CoreError> {
        self.check()?;
        self.inner.find_by_id(id).await
    }

    async fn find_by_post_id(&self, post_id: &str) -> Result<Option<Mention>, CoreError> {
        self.check()?;
        self.inner.find_by_post_id(post_id).await
    }

    async fn find_filtered(
        &self,
        filter: &MentionFilter,
        sort: MentionSort,
        skip: u32,
        limit: u32,
    ) -> Result<Vec<Mention>, CoreError> {
        self.check()?;
        self.inner.find_filtered(filter, sort, skip, limit).await
    }

    async fn count_filtered(&self, filter: &MentionFilter) -> Result<u64, CoreError> {
        self.check()?;
        self.inner.count_filtered(filter).await
    }

    async fn aggregate_group_count(
        &self,
        filter: &MentionFilter,
        key: GroupKey,
    ) -> Result<HashMap<String, u64>, CoreError> {
        self.check()?;
        self.inner.aggregate_group_count(filter, key).await
    }

    async fn upsert_stats(&self, stats: &MonitoringStats) -> Result<(), CoreError> {
        self.check()?;
        self.inner.upsert_stats(stats).await
    }

    async fn get_stats(&self) -> Result<Option<MonitoringStats>, CoreError> {
        self.check()?;
        self.inner.get_stats().await
    }

    async fn mark_reviewed(&self, id: MentionId, notes: Option<&str>) -> Result<bool, CoreError> {
        self.check()?;
        self.inner.mark_reviewed(id, notes).await
    }
}

/// Remembers the post ids it was asked to announce.
#[derive(Default)]
pub struct RecordingNotifier {
    pub notified: Mutex<Vec<String>>,
    pub fail: AtomicBool,
}

impl RecordingNotifier {
    pub fn notified(&self) -> Vec<String> {
        self.notified.lock().unwrap().clone()
    }
}

#[async_trait]
impl ThreatNotifier for RecordingNotifier {
    async fn notify(&self, mention: &Mention) -> Result<(), CoreError> {
        self.notified.lock().unwrap().push(mention.post.id.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(CoreError::Internal {
                message: "notification service offline".to_string(),
            });
        }
        Ok(())
    }
}
