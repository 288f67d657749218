use analysis_engine::{generate_recommendation, ThreatAnalyzer};
use brandwatch_core::{
    matched_keywords, AlertConfig, AlertTestReport, AlertTestResult, CoreError, ErrorExt,
    FaultKind, GroupKey, Mention, MentionFilter, MentionId, MentionSort, MentionStore,
    MonitorConfig, MonitoringStats, Post, PostSource, Recency, SearchQuery, SentimentLabel,
    SubredditCount, ThreatLevel,
};
use chrono::{Duration as ChronoDuration, Utc};
use futures::StreamExt;
use std::collections::{BTreeMap, HashMap};
use std::str::FromStr;
use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Subreddits kept in the stats snapshot.
pub const TOP_SUBREDDITS: usize = 10;

/// Posts analysed when dry-running an alert rule.
pub const ALERT_TEST_LIMIT: u32 = 10;

/// Runs scan passes: search, dedup, analyse, persist.
pub struct MonitorEngine {
    source: Arc<dyn PostSource>,
    store: Arc<dyn MentionStore>,
    analyzer: ThreatAnalyzer,
    config: MonitorConfig,
}

impl MonitorEngine {
    pub fn new(
        source: Arc<dyn PostSource>,
        store: Arc<dyn MentionStore>,
        analyzer: ThreatAnalyzer,
        config: MonitorConfig,
    ) -> Self {
        Self {
            source,
            store,
            analyzer,
            config,
        }
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn MentionStore> {
        &self.store
    }

    fn keywords(&self) -> Vec<String> {
        self.config
            .keywords
            .iter()
            .filter(|k| !k.trim().is_empty())
            .cloned()
            .collect()
    }

    /// One scan pass. Returns the mentions created by this pass only.
    ///
    /// Per-post failures are logged and skipped. A source outage or a store
    /// outage ends the pass with an error; mentions stored before that point
    /// stay stored.
    pub async fn scan_for_mentions(&self) -> Result<Vec<Mention>, CoreError> {
        let keywords = self.keywords();
        if keywords.is_empty() {
            warn!("No brand keywords configured, skipping scan");
            return Ok(Vec::new());
        }

        let query = SearchQuery {
            keywords: keywords.clone(),
            subreddits: self.config.subreddits.clone(),
            limit: self.config.search_limit,
            recency: self.config.recency,
        };
        info!(
            keywords = keywords.len(),
            subreddits = query.subreddits.len(),
            "Starting mention scan"
        );

        let mut posts = self.source.search_by_keywords(&query).await?;
        let mut created = Vec::new();
        let mut seen = 0usize;
        let mut skipped = 0usize;

        while let Some(item) = posts.next().await {
            let post = match item {
                Ok(post) => post,
                Err(e) if e.fault_kind() == FaultKind::MalformedItem => {
                    warn!(code = %e.error_code(), "Skipping malformed item: {}", e);
                    continue;
                }
                Err(e) => return Err(e),
            };
            seen += 1;

            if matched_keywords(&post.full_text(), &keywords).is_empty() {
                debug!(post_id = %post.id, "Post does not mention a keyword, skipping");
                skipped += 1;
                continue;
            }

            match self.process_candidate(&post).await {
                Ok(Some(mention)) => {
                    created.push(mention);
                    let pacing = self.config.pacing_delay();
                    if !pacing.is_zero() {
                        sleep(pacing).await;
                    }
                }
                Ok(None) => skipped += 1,
                Err(e) if e.fault_kind() == FaultKind::PersistenceUnavailable => {
                    e.log_error();
                    return Err(e);
                }
                Err(e) => {
                    warn!(post_id = %post.id, code = %e.error_code(), "Failed to process post: {}", e);
                    skipped += 1;
                }
            }
        }

        info!(
            seen,
            skipped,
            created = created.len(),
            "Scan finished"
        );
        Ok(created)
    }

    /// Stores a new mention for `post`, or `None` when it was seen before.
    async fn process_candidate(&self, post: &Post) -> Result<Option<Mention>, CoreError> {
        if self.store.exists_by_post_id(&post.id).await? {
            debug!(post_id = %post.id, "Post already processed");
            return Ok(None);
        }

        let mention = self.analyze_post(post).await;
        self.persist(mention).await
    }

    async fn persist(&self, mut mention: Mention) -> Result<Option<Mention>, CoreError> {
        match self.store.insert(&mention).await {
            Ok(id) => {
                mention.id = Some(id);
                debug!(
                    post_id = %mention.post.id,
                    level = %mention.threat.level,
                    score = mention.threat.score,
                    "Stored new mention"
                );
                Ok(Some(mention))
            }
            Err(e) if e.fault_kind() == FaultKind::PersistenceConflict => {
                debug!(post_id = %mention.post.id, "Post stored concurrently, skipping");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Analyses a post against the configured keywords without storing it.
    pub async fn analyze_post(&self, post: &Post) -> Mention {
        let keywords = self.keywords();
        let sentiment = self.analyzer.scorer().score(&post.full_text()).await;
        let threat = self
            .analyzer
            .analyze_with_sentiment(post, &keywords, &sentiment)
            .await;
        let recommendation = (threat.score >= self.config.threat_threshold)
            .then(|| generate_recommendation(post, &threat));

        Mention::new(post.clone(), sentiment, threat, recommendation, Utc::now())
    }

    /// Fetches one post by id and returns its mention, analysing and storing
    /// it first when it has not been seen. `None` when the source does not
    /// know the id.
    pub async fn scan_post(&self, post_id: &str) -> Result<Option<Mention>, CoreError> {
        let Some(post) = self.source.get_by_id(post_id).await? else {
            warn!(post_id, "Post not found");
            return Ok(None);
        };

        if let Some(existing) = self.store.find_by_post_id(&post.id).await? {
            debug!(post_id, "Post already processed, returning stored mention");
            return Ok(Some(existing));
        }

        let mention = self.analyze_post(&post).await;
        match self.persist(mention).await? {
            Some(mention) => {
                info!(post_id, "Manually scanned and stored post");
                Ok(Some(mention))
            }
            None => self.store.find_by_post_id(&post.id).await,
        }
    }

    /// Recomputes the stats snapshot over the trailing window and replaces
    /// the stored one.
    pub async fn refresh_stats(&self) -> Result<MonitoringStats, CoreError> {
        let since = Utc::now() - ChronoDuration::hours(self.config.stats_window_hours);
        let filter = MentionFilter::since(since);

        let total_mentions = self.store.count_filtered(&filter).await?;
        let threat_distribution = distribution::<ThreatLevel>(
            self.store
                .aggregate_group_count(&filter, GroupKey::ThreatLevel)
                .await?,
        );
        let sentiment_distribution = distribution::<SentimentLabel>(
            self.store
                .aggregate_group_count(&filter, GroupKey::SentimentLabel)
                .await?,
        );
        let top_subreddits = top_subreddits(
            self.store
                .aggregate_group_count(&filter, GroupKey::Subreddit)
                .await?,
        );

        let stats = MonitoringStats {
            total_mentions,
            threat_distribution,
            sentiment_distribution,
            top_subreddits,
            trending_keywords: self.keywords(),
            last_updated: Utc::now(),
        };

        self.store.upsert_stats(&stats).await?;
        info!(total_mentions, "Monitoring stats updated");
        Ok(stats)
    }

    pub async fn get_stats(&self) -> Result<Option<MonitoringStats>, CoreError> {
        self.store.get_stats().await
    }

    pub async fn get_mentions(
        &self,
        filter: &MentionFilter,
        sort: MentionSort,
        skip: u32,
        limit: u32,
    ) -> Result<Vec<Mention>, CoreError> {
        self.store.find_filtered(filter, sort, skip, limit).await
    }

    pub async fn get_mention_by_id(&self, id: MentionId) -> Result<Option<Mention>, CoreError> {
        self.store.find_by_id(id).await
    }

    pub async fn mark_reviewed(&self, id: MentionId, notes: Option<&str>) -> Result<bool, CoreError> {
        self.store.mark_reviewed(id, notes).await
    }

    /// HIGH and CRITICAL mentions, highest score first.
    pub async fn high_priority_threats(&self, limit: u32) -> Result<Vec<Mention>, CoreError> {
        let mut threats = Vec::new();
        for level in [ThreatLevel::Critical, ThreatLevel::High] {
            let filter = MentionFilter::default().with_threat_level(level);
            threats.extend(
                self.store
                    .find_filtered(&filter, MentionSort::HighestThreatFirst, 0, limit)
                    .await?,
            );
        }

        threats.sort_by(|a, b| {
            b.threat
                .score
                .total_cmp(&a.threat.score)
                .then_with(|| b.processed_at.cmp(&a.processed_at))
        });
        threats.truncate(limit as usize);
        Ok(threats)
    }

    /// Dry-runs an alert rule against a fresh search. Nothing is stored.
    pub async fn test_alert(&self, alert: &AlertConfig) -> Result<AlertTestReport, CoreError> {
        let query = SearchQuery {
            keywords: alert.keywords.clone(),
            subreddits: alert.subreddits.clone(),
            limit: ALERT_TEST_LIMIT,
            recency: Recency::Day,
        };

        let mut posts = self.source.search_by_keywords(&query).await?;
        let mut results = Vec::new();
        while let Some(item) = posts.next().await {
            match item {
                Ok(post) => {
                    let mention = self.analyze_post(&post).await;
                    let meets_criteria = alert.is_met_by(&mention);
                    results.push(AlertTestResult {
                        mention,
                        meets_criteria,
                    });
                }
                Err(e) if e.fault_kind() == FaultKind::MalformedItem => {
                    warn!("Skipping malformed item during alert test: {}", e);
                }
                Err(e) => return Err(e),
            }
        }

        let matching = results.iter().filter(|r| r.meets_criteria).count();
        info!(
            alert = %alert.name,
            matching,
            total = results.len(),
            "Alert test completed"
        );
        Ok(AlertTestReport {
            total: results.len(),
            matching,
            results,
        })
    }
}

fn distribution<K>(groups: HashMap<String, u64>) -> BTreeMap<K, u64>
where
    K: FromStr<Err = CoreError> + Ord,
{
    let mut counts = BTreeMap::new();
    for (key, count) in groups {
        match key.parse::<K>() {
            Ok(parsed) => {
                *counts.entry(parsed).or_insert(0) += count;
            }
            Err(e) => error!("Ignoring unknown group key in stats: {}", e),
        }
    }
    counts
}

fn top_subreddits(groups: HashMap<String, u64>) -> Vec<SubredditCount> {
    let mut subreddits: Vec<SubredditCount> = groups
        .into_iter()
        .map(|(subreddit, count)| SubredditCount { subreddit, count })
        .collect();
    subreddits.sort_by(|a, b| {
        b.count
            .cmp(&a.count)
            .then_with(|| a.subreddit.cmp(&b.subreddit))
    });
    subreddits.truncate(TOP_SUBREDDITS);
    subreddits
}
