//! SQLite persistence for mentions, the stats snapshot and alert rules.

pub mod alerts;
pub mod memory;

pub use memory::MemoryStore;

use async_trait::async_trait;
use brandwatch_core::{
    CoreError, DatabaseError, GroupKey, Mention, MentionFilter, MentionId, MentionSort,
    MentionStore, MonitoringStats, Post, PostKind, RecommendationResult, SentimentResult,
    ThreatResult,
};
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite};
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

const MENTION_COLUMNS: &str = "id, post_id, post_kind, title, content, author, subreddit, url, \
    permalink, post_score, num_comments, post_created_at, sentiment_label, sentiment_confidence, \
    positive_score, negative_score, neutral_score, threat_level, threat_score, threat_categories, \
    matched_keywords, context_note, impact_note, recommendation, processed_at, reviewed, notes, tags";

#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens (creating if missing) the database at `url`.
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, CoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| DatabaseError::ConnectionFailed {
                reason: format!("invalid database url '{url}': {e}"),
            })?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| DatabaseError::ConnectionFailed {
                reason: e.to_string(),
            })?;

        info!("Connected to database at {}", url);
        Ok(Self { pool })
    }

    /// Private in-memory database. A single connection that never expires
    /// keeps the data alive for the lifetime of the pool.
    pub async fn in_memory() -> Result<Self, CoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| DatabaseError::ConnectionFailed {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    pub async fn run_migrations(&self) -> Result<(), CoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| DatabaseError::MigrationFailed {
                migration: e.to_string(),
            })?;
        debug!("Database migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

pub(crate) fn sql(error: sqlx::Error) -> CoreError {
    match error {
        sqlx::Error::Database(ref db) if db.message().contains("database is locked") => {
            DatabaseError::DatabaseLocked.into()
        }
        other => DatabaseError::Sql(other).into(),
    }
}

pub(crate) fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db) if db.is_unique_violation())
}

pub(crate) fn corrupt(details: impl Into<String>) -> CoreError {
    DatabaseError::CorruptRecord {
        details: details.into(),
    }
    .into()
}

pub(crate) fn from_millis(millis: i64, column: &str) -> Result<DateTime<Utc>, CoreError> {
    DateTime::<Utc>::from_timestamp_millis(millis)
        .ok_or_else(|| corrupt(format!("{column} holds out-of-range timestamp {millis}")))
}

pub(crate) fn from_json<T: DeserializeOwned>(raw: &str, column: &str) -> Result<T, CoreError> {
    serde_json::from_str(raw).map_err(|e| corrupt(format!("{column}: {e}")))
}

fn parse_column<T>(raw: &str, column: &str) -> Result<T, CoreError>
where
    T: FromStr<Err = CoreError>,
{
    raw.parse()
        .map_err(|e: CoreError| corrupt(format!("{column}: {e}")))
}

fn mention_from_row(row: &SqliteRow) -> Result<Mention, CoreError> {
    let post = Post {
        id: row.try_get("post_id").map_err(sql)?,
        title: row.try_get("title").map_err(sql)?,
        content: row.try_get("content").map_err(sql)?,
        author: row.try_get("author").map_err(sql)?,
        subreddit: row.try_get("subreddit").map_err(sql)?,
        url: row.try_get("url").map_err(sql)?,
        permalink: row.try_get("permalink").map_err(sql)?,
        score: row.try_get("post_score").map_err(sql)?,
        num_comments: row.try_get("num_comments").map_err(sql)?,
        created_at: from_millis(
            row.try_get("post_created_at").map_err(sql)?,
            "post_created_at",
        )?,
        kind: parse_column::<PostKind>(
            &row.try_get::<String, _>("post_kind").map_err(sql)?,
            "post_kind",
        )?,
    };

    let sentiment = SentimentResult {
        label: parse_column(
            &row.try_get::<String, _>("sentiment_label").map_err(sql)?,
            "sentiment_label",
        )?,
        confidence: row.try_get("sentiment_confidence").map_err(sql)?,
        positive_score: row.try_get("positive_score").map_err(sql)?,
        negative_score: row.try_get("negative_score").map_err(sql)?,
        neutral_score: row.try_get("neutral_score").map_err(sql)?,
    };

    let threat = ThreatResult {
        level: parse_column(
            &row.try_get::<String, _>("threat_level").map_err(sql)?,
            "threat_level",
        )?,
        score: row.try_get("threat_score").map_err(sql)?,
        categories: from_json(
            &row.try_get::<String, _>("threat_categories").map_err(sql)?,
            "threat_categories",
        )?,
        matched_keywords: from_json(
            &row.try_get::<String, _>("matched_keywords").map_err(sql)?,
            "matched_keywords",
        )?,
        context_note: row.try_get("context_note").map_err(sql)?,
        impact_note: row.try_get("impact_note").map_err(sql)?,
    };

    let recommendation = row
        .try_get::<Option<String>, _>("recommendation")
        .map_err(sql)?
        .map(|raw| from_json::<RecommendationResult>(&raw, "recommendation"))
        .transpose()?;

    Ok(Mention {
        id: Some(row.try_get("id").map_err(sql)?),
        post,
        sentiment,
        threat,
        recommendation,
        processed_at: from_millis(row.try_get("processed_at").map_err(sql)?, "processed_at")?,
        reviewed: row.try_get("reviewed").map_err(sql)?,
        notes: row.try_get("notes").map_err(sql)?,
        tags: from_json(&row.try_get::<String, _>("tags").map_err(sql)?, "tags")?,
    })
}

fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &MentionFilter) {
    builder.push(" WHERE 1 = 1");
    if let Some(level) = filter.threat_level {
        builder.push(" AND threat_level = ").push_bind(level.as_str());
    }
    if let Some(label) = filter.sentiment {
        builder.push(" AND sentiment_label = ").push_bind(label.as_str());
    }
    if let Some(subreddit) = &filter.subreddit {
        builder.push(" AND subreddit = ").push_bind(subreddit.clone());
    }
    if let Some(after) = filter.processed_after {
        builder
            .push(" AND processed_at >= ")
            .push_bind(after.timestamp_millis());
    }
    if let Some(before) = filter.processed_before {
        builder
            .push(" AND processed_at <= ")
            .push_bind(before.timestamp_millis());
    }
    if let Some(reviewed) = filter.reviewed {
        builder.push(" AND reviewed = ").push_bind(reviewed);
    }
}

fn group_column(key: GroupKey) -> &'static str {
    match key {
        GroupKey::ThreatLevel => "threat_level",
        GroupKey::SentimentLabel => "sentiment_label",
        GroupKey::Subreddit => "subreddit",
    }
}

#[async_trait]
impl MentionStore for Database {
    async fn exists_by_post_id(&self, post_id: &str) -> Result<bool, CoreError> {
        let row = sqlx::query("SELECT 1 FROM mentions WHERE post_id = ?")
            .bind(post_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(sql)?;
        Ok(row.is_some())
    }

    async fn insert(&self, mention: &Mention) -> Result<MentionId, CoreError> {
        let post = &mention.post;
        let recommendation = mention
            .recommendation
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        let result = sqlx::query(
            "INSERT INTO mentions (
                post_id, post_kind, title, content, author, subreddit, url, permalink,
                post_score, num_comments, post_created_at,
                sentiment_label, sentiment_confidence, positive_score, negative_score, neutral_score,
                threat_level, threat_score, threat_categories, matched_keywords,
                context_note, impact_note, recommendation,
                processed_at, reviewed, notes, tags
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&post.id)
        .bind(post.kind.as_str())
        .bind(&post.title)
        .bind(&post.content)
        .bind(&post.author)
        .bind(&post.subreddit)
        .bind(&post.url)
        .bind(&post.permalink)
        .bind(post.score)
        .bind(post.num_comments)
        .bind(post.created_at.timestamp_millis())
        .bind(mention.sentiment.label.as_str())
        .bind(mention.sentiment.confidence)
        .bind(mention.sentiment.positive_score)
        .bind(mention.sentiment.negative_score)
        .bind(mention.sentiment.neutral_score)
        .bind(mention.threat.level.as_str())
        .bind(mention.threat.score)
        .bind(serde_json::to_string(&mention.threat.categories)?)
        .bind(serde_json::to_string(&mention.threat.matched_keywords)?)
        .bind(&mention.threat.context_note)
        .bind(&mention.threat.impact_note)
        .bind(recommendation)
        .bind(mention.processed_at.timestamp_millis())
        .bind(mention.reviewed)
        .bind(&mention.notes)
        .bind(serde_json::to_string(&mention.tags)?)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e) {
                DatabaseError::DuplicateMention {
                    post_id: post.id.clone(),
                }
                .into()
            } else {
                sql(e)
            }
        })?;

        let id = result.last_insert_rowid();
        debug!("Stored mention {} for post {}", id, post.id);
        Ok(id)
    }

    async fn find_by_id(&self, id: MentionId) -> Result<Option<Mention>, CoreError> {
        let row = sqlx::query(&format!("SELECT {MENTION_COLUMNS} FROM mentions WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(sql)?;
        row.as_ref().map(mention_from_row).transpose()
    }

    async fn find_by_post_id(&self, post_id: &str) -> Result<Option<Mention>, CoreError> {
        let row = sqlx::query(&format!(
            "SELECT {MENTION_COLUMNS} FROM mentions WHERE post_id = ?"
        ))
        .bind(post_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(sql)?;
        row.as_ref().map(mention_from_row).transpose()
    }

    async fn find_filtered(
        &self,
        filter: &MentionFilter,
        sort: MentionSort,
        skip: u32,
        limit: u32,
    ) -> Result<Vec<Mention>, CoreError> {
        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {MENTION_COLUMNS} FROM mentions"
        ));
        push_filter(&mut builder, filter);
        builder.push(match sort {
            MentionSort::NewestFirst => " ORDER BY processed_at DESC, id DESC",
            MentionSort::HighestThreatFirst => {
                " ORDER BY threat_score DESC, processed_at DESC, id DESC"
            }
        });
        builder
            .push(" LIMIT ")
            .push_bind(i64::from(limit))
            .push(" OFFSET ")
            .push_bind(i64::from(skip));

        let rows = builder.build().fetch_all(&self.pool).await.map_err(sql)?;
        rows.iter().map(mention_from_row).collect()
    }

    async fn count_filtered(&self, filter: &MentionFilter) -> Result<u64, CoreError> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) AS total FROM mentions");
        push_filter(&mut builder, filter);

        let row = builder.build().fetch_one(&self.pool).await.map_err(sql)?;
        let total: i64 = row.try_get("total").map_err(sql)?;
        Ok(total.max(0) as u64)
    }

    async fn aggregate_group_count(
        &self,
        filter: &MentionFilter,
        key: GroupKey,
    ) -> Result<HashMap<String, u64>, CoreError> {
        let column = group_column(key);
        let mut builder = QueryBuilder::<Sqlite>::new(format!(
            "SELECT {column} AS group_key, COUNT(*) AS total FROM mentions"
        ));
        push_filter(&mut builder, filter);
        builder.push(format!(" GROUP BY {column}"));

        let rows = builder.build().fetch_all(&self.pool).await.map_err(sql)?;
        let mut groups = HashMap::with_capacity(rows.len());
        for row in &rows {
            let group: String = row.try_get("group_key").map_err(sql)?;
            let total: i64 = row.try_get("total").map_err(sql)?;
            groups.insert(group, total.max(0) as u64);
        }
        Ok(groups)
    }

    async fn upsert_stats(&self, stats: &MonitoringStats) -> Result<(), CoreError> {
        sqlx::query(
            "INSERT INTO monitoring_stats (id, snapshot, updated_at) VALUES (1, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                snapshot = excluded.snapshot,
                updated_at = excluded.updated_at",
        )
        .bind(serde_json::to_string(stats)?)
        .bind(stats.last_updated.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(sql)?;
        Ok(())
    }

    async fn get_stats(&self) -> Result<Option<MonitoringStats>, CoreError> {
        let row = sqlx::query("SELECT snapshot FROM monitoring_stats WHERE id = 1")
            .fetch_optional(&self.pool)
            .await
            .map_err(sql)?;

        match row {
            Some(row) => {
                let raw: String = row.try_get("snapshot").map_err(sql)?;
                Ok(Some(from_json(&raw, "monitoring_stats.snapshot")?))
            }
            None => Ok(None),
        }
    }

    async fn mark_reviewed(&self, id: MentionId, notes: Option<&str>) -> Result<bool, CoreError> {
        let result = sqlx::query(
            "UPDATE mentions SET reviewed = 1, reviewed_at = ?, notes = COALESCE(?, notes)
             WHERE id = ?",
        )
        .bind(Utc::now().timestamp_millis())
        .bind(notes)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(sql)?;
        Ok(result.rows_affected() > 0)
    }
}
