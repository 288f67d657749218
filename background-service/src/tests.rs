use crate::fakes::{
    post, scam_post, FlakyStore, Item, NegativeModel, RecordingNotifier, StaticSource, StoreFault,
};
use crate::{MonitorEngine, Scheduler, SchedulerStatus, ALERT_TEST_LIMIT};
use analysis_engine::{SentimentScorer, ThreatAnalyzer};
use brandwatch_core::{
    AlertConfig, CoreError, ErrorExt, FaultKind, MentionFilter, MentionSort, MentionStore,
    MonitorConfig, Recency, SentimentLabel, ThreatLevel,
};
use chrono::{Duration as ChronoDuration, Utc};
use database::MemoryStore;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{sleep, Instant};

fn config(keywords: &[&str]) -> MonitorConfig {
    MonitorConfig {
        keywords: keywords.iter().map(|k| k.to_string()).collect(),
        subreddits: vec!["gadgets".to_string(), "technology".to_string()],
        pacing_delay_ms: 0,
        ..Default::default()
    }
}

fn engine(
    source: Arc<StaticSource>,
    store: Arc<dyn MentionStore>,
    config: MonitorConfig,
) -> MonitorEngine {
    let analyzer = ThreatAnalyzer::new(
        SentimentScorer::new(Some(Arc::new(NegativeModel))),
        None,
    );
    MonitorEngine::new(source, store, analyzer, config)
}

fn review_post(id: &str) -> brandwatch_core::Post {
    post(id, "Acme phone review", "technology")
}

fn two_post_source() -> Arc<StaticSource> {
    Arc::new(StaticSource::with_posts(vec![
        scam_post("p1"),
        review_post("p2"),
    ]))
}

// ---------------------------------------------------------------------------
// MonitorEngine
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_scan_stores_new_mentions_once() {
    let source = two_post_source();
    let store = Arc::new(MemoryStore::new());
    let engine = engine(source.clone(), store.clone(), config(&["Acme"]));

    let created = engine.scan_for_mentions().await.unwrap();
    assert_eq!(created.len(), 2);
    assert!(created.iter().all(|m| m.id.is_some()));

    let scam = &created[0];
    assert_eq!(scam.post.id, "p1");
    assert_eq!(scam.threat.level, ThreatLevel::Critical);
    assert_eq!(scam.sentiment.label, SentimentLabel::Negative);
    assert!(scam.recommendation.as_ref().unwrap().escalation_needed);
    assert!(!scam.reviewed);

    let review = &created[1];
    assert_eq!(review.threat.level, ThreatLevel::Medium);
    assert!(review.recommendation.is_none());

    let query = source.last_query.lock().unwrap().clone().unwrap();
    assert_eq!(query.keywords, vec!["Acme"]);
    assert_eq!(query.limit, 100);
    assert_eq!(query.recency, Recency::Day);

    // Second pass over the same results finds nothing new.
    assert!(engine.scan_for_mentions().await.unwrap().is_empty());
    assert_eq!(store.len().await, 2);
}

#[tokio::test]
async fn test_scan_skips_posts_already_stored() {
    let source = two_post_source();
    let store = Arc::new(MemoryStore::new());
    let engine = engine(source, store.clone(), config(&["Acme"]));

    let earlier = engine.analyze_post(&scam_post("p1")).await;
    store.insert(&earlier).await.unwrap();

    let created = engine.scan_for_mentions().await.unwrap();
    let ids: Vec<_> = created.iter().map(|m| m.post.id.as_str()).collect();
    assert_eq!(ids, vec!["p2"]);
}

#[tokio::test]
async fn test_scan_without_keywords_does_not_search() {
    let source = two_post_source();
    let engine = engine(source.clone(), Arc::new(MemoryStore::new()), config(&[" "]));

    assert!(engine.scan_for_mentions().await.unwrap().is_empty());
    assert_eq!(source.searches(), 0);
}

#[tokio::test]
async fn test_source_outage_is_surfaced_and_recoverable() {
    let source = two_post_source();
    source.failures_left.store(1, Ordering::SeqCst);
    let engine = engine(source.clone(), Arc::new(MemoryStore::new()), config(&["Acme"]));

    let error = engine.scan_for_mentions().await.unwrap_err();
    assert_eq!(error.fault_kind(), FaultKind::SourceUnavailable);

    assert_eq!(engine.scan_for_mentions().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_malformed_items_are_skipped() {
    let source = Arc::new(StaticSource::default());
    source.push(Item::Post(scam_post("p1")));
    source.push(Item::Malformed("broken".to_string()));
    source.push(Item::Post(review_post("p2")));
    let engine = engine(source, Arc::new(MemoryStore::new()), config(&["Acme"]));

    let created = engine.scan_for_mentions().await.unwrap();
    assert_eq!(created.len(), 2);
}

#[tokio::test]
async fn test_outage_mid_stream_keeps_stored_mentions() {
    let source = Arc::new(StaticSource::default());
    source.push(Item::Post(scam_post("p1")));
    source.push(Item::Unavailable);
    source.push(Item::Post(review_post("p2")));
    let store = Arc::new(MemoryStore::new());
    let engine = engine(source, store.clone(), config(&["Acme"]));

    let error = engine.scan_for_mentions().await.unwrap_err();
    assert!(matches!(error, CoreError::SourceUnavailable { .. }));
    assert!(store.exists_by_post_id("p1").await.unwrap());
    assert!(!store.exists_by_post_id("p2").await.unwrap());
}

#[tokio::test]
async fn test_posts_without_a_keyword_are_ignored() {
    let source = Arc::new(StaticSource::with_posts(vec![
        post("p3", "Globex launches a phone", "technology"),
        review_post("p2"),
    ]));
    let engine = engine(source, Arc::new(MemoryStore::new()), config(&["Acme"]));

    let created = engine.scan_for_mentions().await.unwrap();
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].post.id, "p2");
}

#[tokio::test]
async fn test_insert_conflict_counts_as_already_processed() {
    let source = two_post_source();
    let store = Arc::new(FlakyStore::new(StoreFault::StaleExistenceCheck));
    let engine = engine(source, store.clone(), config(&["Acme"]));

    // Another scan stored p1 after our existence check.
    let racing = engine.analyze_post(&scam_post("p1")).await;
    store.inner.insert(&racing).await.unwrap();

    let created = engine.scan_for_mentions().await.unwrap();
    let ids: Vec<_> = created.iter().map(|m| m.post.id.as_str()).collect();
    assert_eq!(ids, vec!["p2"]);
    assert_eq!(store.inner.len().await, 2);
}

#[tokio::test]
async fn test_store_outage_aborts_the_scan() {
    let source = two_post_source();
    let store = Arc::new(FlakyStore::new(StoreFault::Unavailable));
    let engine = engine(source, store.clone(), config(&["Acme"]));

    let error = engine.scan_for_mentions().await.unwrap_err();
    assert_eq!(error.fault_kind(), FaultKind::PersistenceUnavailable);

    store.set_fault(StoreFault::None);
    assert_eq!(engine.scan_for_mentions().await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_threshold_controls_recommendations() {
    let mut everything = config(&["Acme"]);
    everything.threat_threshold = 0.0;
    let engine_low = engine(two_post_source(), Arc::new(MemoryStore::new()), everything);
    let created = engine_low.scan_for_mentions().await.unwrap();
    assert!(created.iter().all(|m| m.recommendation.is_some()));

    let mut nothing = config(&["Acme"]);
    nothing.threat_threshold = 1.0;
    let engine_high = engine(two_post_source(), Arc::new(MemoryStore::new()), nothing);
    let created = engine_high.scan_for_mentions().await.unwrap();
    assert!(created.iter().all(|m| m.recommendation.is_none()));
}

#[tokio::test(start_paused = true)]
async fn test_scan_paces_between_new_mentions() {
    let source = Arc::new(StaticSource::with_posts(vec![
        scam_post("p1"),
        review_post("p2"),
        review_post("p3"),
    ]));
    let mut paced = config(&["Acme"]);
    paced.pacing_delay_ms = 500;
    let engine = engine(source, Arc::new(MemoryStore::new()), paced);

    let started = Instant::now();
    assert_eq!(engine.scan_for_mentions().await.unwrap().len(), 3);
    assert!(started.elapsed() >= Duration::from_millis(1500));
}

#[tokio::test]
async fn test_refresh_stats_matches_trailing_window() {
    let source = two_post_source();
    let store = Arc::new(MemoryStore::new());
    let engine = engine(source, store.clone(), config(&["Acme"]));
    assert!(engine.get_stats().await.unwrap().is_none());

    let mut stale = engine.analyze_post(&scam_post("old")).await;
    stale.processed_at = Utc::now() - ChronoDuration::hours(48);
    store.insert(&stale).await.unwrap();
    engine.scan_for_mentions().await.unwrap();

    let stats = engine.refresh_stats().await.unwrap();
    let window = MentionFilter::since(Utc::now() - ChronoDuration::hours(24));
    assert_eq!(stats.total_mentions, store.count_filtered(&window).await.unwrap());
    assert_eq!(stats.total_mentions, 2);
    assert_eq!(stats.threat_distribution.get(&ThreatLevel::Critical), Some(&1));
    assert_eq!(stats.threat_distribution.get(&ThreatLevel::Medium), Some(&1));
    assert_eq!(
        stats.sentiment_distribution.get(&SentimentLabel::Negative),
        Some(&2)
    );
    let subreddits: Vec<_> = stats
        .top_subreddits
        .iter()
        .map(|s| s.subreddit.as_str())
        .collect();
    assert_eq!(subreddits, vec!["gadgets", "technology"]);
    assert_eq!(stats.trending_keywords, vec!["Acme"]);

    assert_eq!(engine.get_stats().await.unwrap(), Some(stats));
}

#[tokio::test]
async fn test_scan_post_by_id() {
    let source = two_post_source();
    let store = Arc::new(MemoryStore::new());
    let engine = engine(source.clone(), store.clone(), config(&["Acme"]));

    assert!(engine.scan_post("missing").await.unwrap().is_none());

    let first = engine.scan_post("p1").await.unwrap().unwrap();
    assert!(first.id.is_some());
    assert_eq!(first.threat.level, ThreatLevel::Critical);

    let again = engine.scan_post("p1").await.unwrap().unwrap();
    assert_eq!(again.id, first.id);
    assert_eq!(store.len().await, 1);
    assert_eq!(source.searches(), 0);
}

#[tokio::test]
async fn test_high_priority_threats_are_ordered_by_score() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine(two_post_source(), store.clone(), config(&["Acme"]));

    for (id, score) in [("a", 0.65), ("b", 0.9), ("c", 0.85), ("d", 0.4)] {
        let mut mention = engine.analyze_post(&review_post(id)).await;
        mention.threat.score = score;
        mention.threat.level = ThreatLevel::from_score(score);
        store.insert(&mention).await.unwrap();
    }

    let ids = |mentions: Vec<brandwatch_core::Mention>| -> Vec<String> {
        mentions.into_iter().map(|m| m.post.id).collect()
    };
    assert_eq!(
        ids(engine.high_priority_threats(10).await.unwrap()),
        vec!["b", "c", "a"]
    );
    assert_eq!(
        ids(engine.high_priority_threats(2).await.unwrap()),
        vec!["b", "c"]
    );
}

#[tokio::test]
async fn test_alert_dry_run_does_not_persist() {
    let source = two_post_source();
    let store = Arc::new(MemoryStore::new());
    let engine = engine(source.clone(), store.clone(), config(&["Acme"]));

    let alert = AlertConfig::new(
        "Acme fraud",
        vec!["Acme".to_string()],
        vec!["gadgets".to_string()],
    );
    let report = engine.test_alert(&alert).await.unwrap();

    assert_eq!(report.total, 2);
    assert_eq!(report.matching, 1);
    assert!(report.results[0].meets_criteria);
    assert!(!report.results[1].meets_criteria);
    assert!(store.is_empty().await);

    let query = source.last_query.lock().unwrap().clone().unwrap();
    assert_eq!(query.limit, ALERT_TEST_LIMIT);
    assert_eq!(query.subreddits, vec!["gadgets"]);

    let mut positive_only = alert.clone();
    positive_only.sentiment_filter = Some(SentimentLabel::Positive);
    assert_eq!(engine.test_alert(&positive_only).await.unwrap().matching, 0);
}

#[tokio::test]
async fn test_review_and_lookup() {
    let store = Arc::new(MemoryStore::new());
    let engine = engine(two_post_source(), store, config(&["Acme"]));
    let created = engine.scan_for_mentions().await.unwrap();
    let id = created[0].id.unwrap();

    assert!(engine.mark_reviewed(id, Some("escalated to PR")).await.unwrap());
    let stored = engine.get_mention_by_id(id).await.unwrap().unwrap();
    assert!(stored.reviewed);
    assert_eq!(stored.notes, "escalated to PR");

    let open = MentionFilter {
        reviewed: Some(false),
        ..Default::default()
    };
    let remaining = engine
        .get_mentions(&open, MentionSort::NewestFirst, 0, 50)
        .await
        .unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].post.id, "p2");
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

fn scheduler_for(source: Arc<StaticSource>) -> (Scheduler, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(engine(source, store.clone(), config(&["Acme"])));
    (Scheduler::new(engine), store)
}

#[tokio::test]
async fn test_stop_before_start_is_a_noop() {
    let (scheduler, _) = scheduler_for(two_post_source());
    assert_eq!(scheduler.stop().await, SchedulerStatus::Stopped);
    assert_eq!(scheduler.status().await, SchedulerStatus::Stopped);
}

#[tokio::test(start_paused = true)]
async fn test_loops_run_until_stopped() {
    let source = two_post_source();
    let (scheduler, store) = scheduler_for(source.clone());

    assert_eq!(scheduler.start().await, SchedulerStatus::Running);
    assert_eq!(scheduler.start().await, SchedulerStatus::Running);
    assert_eq!(scheduler.status().await, SchedulerStatus::Running);

    sleep(Duration::from_secs(1)).await;
    assert_eq!(source.searches(), 1);
    assert_eq!(store.len().await, 2);
    assert!(store.get_stats().await.unwrap().is_some());

    sleep(Duration::from_secs(300)).await;
    assert_eq!(source.searches(), 2);

    assert_eq!(scheduler.stop().await, SchedulerStatus::Stopped);
    assert_eq!(scheduler.status().await, SchedulerStatus::Stopped);

    sleep(Duration::from_secs(3600)).await;
    assert_eq!(source.searches(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_failed_iteration_backs_off_and_continues() {
    let source = two_post_source();
    source.failures_left.store(1, Ordering::SeqCst);
    let (scheduler, store) = scheduler_for(source.clone());

    scheduler.start().await;
    sleep(Duration::from_secs(30)).await;
    assert_eq!(source.searches(), 1);
    assert!(store.is_empty().await);

    sleep(Duration::from_secs(40)).await;
    assert_eq!(source.searches(), 2);
    assert_eq!(store.len().await, 2);

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_panicking_iteration_does_not_kill_the_loop() {
    let source = two_post_source();
    source.panics_left.store(1, Ordering::SeqCst);
    let (scheduler, store) = scheduler_for(source.clone());

    scheduler.start().await;
    sleep(Duration::from_secs(61)).await;
    assert_eq!(source.searches(), 2);
    assert_eq!(store.len().await, 2);
    assert_eq!(scheduler.status().await, SchedulerStatus::Running);

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_high_priority_mentions_reach_notifiers() {
    let source = two_post_source();
    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(engine(source, store, config(&["Acme"])));
    let recorder = Arc::new(RecordingNotifier::default());
    recorder.fail.store(true, Ordering::SeqCst);
    let scheduler = Scheduler::new(engine).with_notifier(recorder.clone());

    scheduler.start().await;
    sleep(Duration::from_secs(1)).await;
    scheduler.stop().await;

    assert_eq!(recorder.notified(), vec!["p1"]);
}

#[tokio::test(start_paused = true)]
async fn test_stop_cancels_a_stalled_scan() {
    let source = two_post_source();
    source.hang.store(true, Ordering::SeqCst);
    let (scheduler, _) = scheduler_for(source.clone());

    scheduler.start().await;
    sleep(Duration::from_secs(5)).await;
    assert_eq!(source.searches(), 1);

    let started = Instant::now();
    assert_eq!(scheduler.stop().await, SchedulerStatus::Stopped);
    assert!(started.elapsed() < scheduler.timing().shutdown_grace);
}

#[tokio::test(start_paused = true)]
async fn test_restart_always_ends_running() {
    let source = two_post_source();
    let (scheduler, _) = scheduler_for(source.clone());

    assert_eq!(scheduler.restart().await, SchedulerStatus::Running);
    sleep(Duration::from_secs(1)).await;
    assert_eq!(source.searches(), 1);

    assert_eq!(scheduler.restart().await, SchedulerStatus::Running);
    sleep(Duration::from_secs(1)).await;
    assert_eq!(source.searches(), 2);

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_stalled_scan_does_not_block_stats_refresh() {
    let source = two_post_source();
    source.hang.store(true, Ordering::SeqCst);
    let store = Arc::new(MemoryStore::new());
    let engine = Arc::new(engine(source.clone(), store.clone(), config(&["Acme"])));
    let scheduler = Scheduler::new(engine.clone());

    scheduler.start().await;
    sleep(Duration::from_secs(1)).await;
    let first = store.get_stats().await.unwrap().unwrap();
    assert_eq!(first.total_mentions, 0);

    let late = engine.analyze_post(&review_post("late")).await;
    store.insert(&late).await.unwrap();

    sleep(scheduler.timing().stats_interval * 2 + Duration::from_secs(1)).await;
    let later = store.get_stats().await.unwrap().unwrap();
    assert_eq!(later.total_mentions, 1);
    assert!(later.last_updated >= first.last_updated);
    assert_eq!(source.searches(), 1);

    scheduler.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_dropping_a_running_scheduler_ends_its_loops() {
    let source = two_post_source();
    let (scheduler, store) = scheduler_for(source.clone());

    scheduler.start().await;
    sleep(Duration::from_secs(1)).await;
    assert_eq!(source.searches(), 1);

    drop(scheduler);
    sleep(Duration::from_secs(3000)).await;
    assert_eq!(source.searches(), 1);
    assert_eq!(store.len().await, 2);
}
