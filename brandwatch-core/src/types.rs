use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::CoreError;

/// Store-assigned identifier of a persisted mention.
pub type MentionId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostKind {
    Post,
    Comment,
}

impl PostKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostKind::Post => "post",
            PostKind::Comment => "comment",
        }
    }
}

impl FromStr for PostKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "post" => Ok(PostKind::Post),
            "comment" => Ok(PostKind::Comment),
            other => Err(CoreError::InvalidInput {
                message: format!("unknown post kind '{other}'"),
            }),
        }
    }
}

/// A Reddit submission or comment, normalized by the post source.
///
/// Comments carry the title of the submission they belong to, so keyword and
/// category matching see the same context a reader would.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Post {
    pub id: String,
    pub title: String,
    pub content: String,
    pub author: String,
    pub subreddit: String,
    pub url: String,
    pub permalink: String,
    pub score: i64,
    pub num_comments: i64,
    pub created_at: DateTime<Utc>,
    pub kind: PostKind,
}

impl Post {
    /// Title and body joined by a space, trimmed.
    pub fn full_text(&self) -> String {
        format!("{} {}", self.title, self.content).trim().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Negative => "negative",
            SentimentLabel::Neutral => "neutral",
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SentimentLabel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "positive" => Ok(SentimentLabel::Positive),
            "negative" => Ok(SentimentLabel::Negative),
            "neutral" => Ok(SentimentLabel::Neutral),
            other => Err(CoreError::InvalidInput {
                message: format!("unknown sentiment label '{other}'"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentResult {
    pub label: SentimentLabel,
    pub confidence: f64,
    pub positive_score: f64,
    pub negative_score: f64,
    pub neutral_score: f64,
}

impl SentimentResult {
    /// Deterministic result for empty input and for internal faults.
    pub fn neutral() -> Self {
        Self {
            label: SentimentLabel::Neutral,
            confidence: 0.0,
            positive_score: 0.0,
            negative_score: 0.0,
            neutral_score: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ThreatLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl ThreatLevel {
    /// Tier boundaries are inclusive on their lower bound.
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            ThreatLevel::Critical
        } else if score >= 0.6 {
            ThreatLevel::High
        } else if score >= 0.3 {
            ThreatLevel::Medium
        } else {
            ThreatLevel::Low
        }
    }

    pub fn is_high_priority(&self) -> bool {
        matches!(self, ThreatLevel::High | ThreatLevel::Critical)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ThreatLevel::Low => "low",
            ThreatLevel::Medium => "medium",
            ThreatLevel::High => "high",
            ThreatLevel::Critical => "critical",
        }
    }
}

impl fmt::Display for ThreatLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ThreatLevel {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(ThreatLevel::Low),
            "medium" => Ok(ThreatLevel::Medium),
            "high" => Ok(ThreatLevel::High),
            "critical" => Ok(ThreatLevel::Critical),
            other => Err(CoreError::InvalidInput {
                message: format!("unknown threat level '{other}'"),
            }),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThreatResult {
    pub level: ThreatLevel,
    pub score: f64,
    /// Unique category names in taxonomy order.
    pub categories: Vec<String>,
    /// Matched brand keywords in configured order.
    pub matched_keywords: Vec<String>,
    pub context_note: String,
    pub impact_note: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecommendationResult {
    pub action_type: String,
    pub priority: u8,
    pub message_template: String,
    pub escalation_needed: bool,
    pub reasoning: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mention {
    pub id: Option<MentionId>,
    pub post: Post,
    pub sentiment: SentimentResult,
    pub threat: ThreatResult,
    pub recommendation: Option<RecommendationResult>,
    pub processed_at: DateTime<Utc>,
    pub reviewed: bool,
    pub notes: String,
    pub tags: Vec<String>,
}

impl Mention {
    pub fn new(
        post: Post,
        sentiment: SentimentResult,
        threat: ThreatResult,
        recommendation: Option<RecommendationResult>,
        processed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: None,
            post,
            sentiment,
            threat,
            recommendation,
            processed_at,
            reviewed: false,
            notes: String::new(),
            tags: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubredditCount {
    pub subreddit: String,
    pub count: u64,
}

/// Singleton snapshot, replaced wholesale on every refresh.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringStats {
    pub total_mentions: u64,
    pub threat_distribution: BTreeMap<ThreatLevel, u64>,
    pub sentiment_distribution: BTreeMap<SentimentLabel, u64>,
    pub top_subreddits: Vec<SubredditCount>,
    pub trending_keywords: Vec<String>,
    pub last_updated: DateTime<Utc>,
}

/// Conjunctive filter over stored mentions. `None` fields do not constrain.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MentionFilter {
    pub threat_level: Option<ThreatLevel>,
    pub sentiment: Option<SentimentLabel>,
    pub subreddit: Option<String>,
    pub processed_after: Option<DateTime<Utc>>,
    pub processed_before: Option<DateTime<Utc>>,
    pub reviewed: Option<bool>,
}

impl MentionFilter {
    pub fn since(processed_after: DateTime<Utc>) -> Self {
        Self {
            processed_after: Some(processed_after),
            ..Default::default()
        }
    }

    pub fn with_threat_level(mut self, level: ThreatLevel) -> Self {
        self.threat_level = Some(level);
        self
    }

    pub fn with_sentiment(mut self, label: SentimentLabel) -> Self {
        self.sentiment = Some(label);
        self
    }

    pub fn with_subreddit(mut self, subreddit: impl Into<String>) -> Self {
        self.subreddit = Some(subreddit.into());
        self
    }

    /// In-process evaluation, used by stores that cannot push the filter down.
    pub fn matches(&self, mention: &Mention) -> bool {
        if let Some(level) = self.threat_level {
            if mention.threat.level != level {
                return false;
            }
        }
        if let Some(label) = self.sentiment {
            if mention.sentiment.label != label {
                return false;
            }
        }
        if let Some(ref subreddit) = self.subreddit {
            if &mention.post.subreddit != subreddit {
                return false;
            }
        }
        if let Some(after) = self.processed_after {
            if mention.processed_at < after {
                return false;
            }
        }
        if let Some(before) = self.processed_before {
            if mention.processed_at > before {
                return false;
            }
        }
        if let Some(reviewed) = self.reviewed {
            if mention.reviewed != reviewed {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MentionSort {
    #[default]
    NewestFirst,
    HighestThreatFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupKey {
    ThreatLevel,
    SentimentLabel,
    Subreddit,
}

/// Reddit's `t` search parameter.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Recency {
    Hour,
    #[default]
    Day,
    Week,
    Month,
    Year,
    All,
}

impl Recency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Recency::Hour => "hour",
            Recency::Day => "day",
            Recency::Week => "week",
            Recency::Month => "month",
            Recency::Year => "year",
            Recency::All => "all",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub keywords: Vec<String>,
    /// Empty means all of Reddit.
    pub subreddits: Vec<String>,
    pub limit: u32,
    pub recency: Recency,
}

/// Keywords of `keywords` whose lower-cased trimmed form occurs in `text`,
/// in input order.
pub fn matched_keywords(text: &str, keywords: &[String]) -> Vec<String> {
    let text_lower = text.to_lowercase();
    keywords
        .iter()
        .filter(|keyword| text_lower.contains(&keyword.trim().to_lowercase()))
        .cloned()
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertConfig {
    pub id: Option<i64>,
    pub name: String,
    pub keywords: Vec<String>,
    pub subreddits: Vec<String>,
    pub threat_threshold: f64,
    pub sentiment_filter: Option<SentimentLabel>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AlertConfig {
    pub fn new(name: impl Into<String>, keywords: Vec<String>, subreddits: Vec<String>) -> Self {
        let now = Utc::now();
        Self {
            id: None,
            name: name.into(),
            keywords,
            subreddits,
            threat_threshold: 0.7,
            sentiment_filter: None,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_met_by(&self, mention: &Mention) -> bool {
        if mention.threat.score < self.threat_threshold {
            return false;
        }
        match self.sentiment_filter {
            Some(label) => mention.sentiment.label == label,
            None => true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertTestResult {
    pub mention: Mention,
    pub meets_criteria: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlertTestReport {
    pub total: usize,
    pub matching: usize,
    pub results: Vec<AlertTestResult>,
}
