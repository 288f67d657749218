use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::{ConfigError, CoreError};
use crate::types::Recency;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub reddit: RedditConfig,
    pub monitor: MonitorConfig,
    pub models: ModelConfig,
    pub database: DatabaseConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedditConfig {
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
    pub user_agent: String,
}

impl Default for RedditConfig {
    fn default() -> Self {
        Self {
            client_id: None,
            client_secret: None,
            user_agent: "brandwatch/0.1".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub keywords: Vec<String>,
    pub subreddits: Vec<String>,
    pub search_limit: u32,
    pub recency: Recency,
    pub threat_threshold: f64,
    pub scan_interval_secs: u64,
    pub stats_interval_secs: u64,
    pub error_backoff_secs: u64,
    pub pacing_delay_ms: u64,
    pub stats_window_hours: i64,
    pub shutdown_grace_secs: u64,
    /// Also raise a desktop notification for high-priority mentions.
    pub desktop_notifications: bool,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            keywords: Vec::new(),
            subreddits: vec![
                "all".to_string(),
                "technology".to_string(),
                "business".to_string(),
            ],
            search_limit: 100,
            recency: Recency::Day,
            threat_threshold: 0.7,
            scan_interval_secs: 300,
            stats_interval_secs: 300,
            error_backoff_secs: 60,
            pacing_delay_ms: 500,
            stats_window_hours: 24,
            shutdown_grace_secs: 10,
            desktop_notifications: false,
        }
    }
}

impl MonitorConfig {
    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }

    pub fn stats_interval(&self) -> Duration {
        Duration::from_secs(self.stats_interval_secs)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_secs(self.error_backoff_secs)
    }

    pub fn pacing_delay(&self) -> Duration {
        Duration::from_millis(self.pacing_delay_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextProviderKind {
    #[default]
    None,
    OpenAi,
    Anthropic,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Hugging Face style inference endpoint for the primary sentiment model.
    pub sentiment_endpoint: Option<String>,
    pub sentiment_api_token: Option<String>,
    pub context_provider: ContextProviderKind,
    pub openai_api_key: Option<String>,
    pub anthropic_api_key: Option<String>,
    pub openai_model: String,
    pub anthropic_model: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            sentiment_endpoint: None,
            sentiment_api_token: None,
            context_provider: ContextProviderKind::None,
            openai_api_key: None,
            anthropic_api_key: None,
            openai_model: "gpt-3.5-turbo".to_string(),
            anthropic_model: "claude-3-haiku-20240307".to_string(),
            max_tokens: 1000,
            temperature: 0.3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "sqlite://brandwatch.db?mode=rwc".to_string(),
            max_connections: 5,
        }
    }
}

impl AppConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, CoreError> {
        let config: AppConfig = toml::from_str(contents).map_err(ConfigError::Parse)?;
        Ok(config)
    }

    /// Loads the file if it exists, otherwise starts from defaults. Environment
    /// overrides are applied on top either way.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, CoreError> {
        let path = path.as_ref();
        let mut config = if path.exists() {
            let contents = std::fs::read_to_string(path)?;
            info!("Loading configuration from {}", path.display());
            Self::from_toml_str(&contents)?
        } else {
            debug!("No config file at {}, using defaults", path.display());
            Self::default()
        };

        config.apply_overrides(|name| std::env::var(name).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// `lookup` resolves a variable name; `std::env::var` in production.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), CoreError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("BRAND_KEYWORDS") {
            self.monitor.keywords = split_list(&value);
        }
        if let Some(value) = lookup("MONITOR_SUBREDDITS") {
            self.monitor.subreddits = split_list(&value);
        }
        if let Some(value) = lookup("MONITOR_INTERVAL") {
            self.monitor.scan_interval_secs = parse_value("MONITOR_INTERVAL", &value)?;
        }
        if let Some(value) = lookup("THREAT_THRESHOLD") {
            self.monitor.threat_threshold = parse_value("THREAT_THRESHOLD", &value)?;
        }
        if let Some(value) = lookup("REDDIT_CLIENT_ID") {
            self.reddit.client_id = Some(value);
        }
        if let Some(value) = lookup("REDDIT_CLIENT_SECRET") {
            self.reddit.client_secret = Some(value);
        }
        if let Some(value) = lookup("REDDIT_USER_AGENT") {
            self.reddit.user_agent = value;
        }
        if let Some(value) = lookup("SENTIMENT_MODEL_URL") {
            self.models.sentiment_endpoint = Some(value);
        }
        if let Some(value) = lookup("OPENAI_API_KEY") {
            self.models.openai_api_key = Some(value);
            if self.models.context_provider == ContextProviderKind::None {
                self.models.context_provider = ContextProviderKind::OpenAi;
            }
        }
        if let Some(value) = lookup("ANTHROPIC_API_KEY") {
            self.models.anthropic_api_key = Some(value);
            if self.models.context_provider == ContextProviderKind::None {
                self.models.context_provider = ContextProviderKind::Anthropic;
            }
        }
        if let Some(value) = lookup("DATABASE_URL") {
            self.database.url = value;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        let monitor = &self.monitor;
        if !(0.0..=1.0).contains(&monitor.threat_threshold) {
            return Err(ConfigError::InvalidValue {
                field: "monitor.threat_threshold".to_string(),
                value: monitor.threat_threshold.to_string(),
            }
            .into());
        }
        for (field, value) in [
            ("monitor.scan_interval_secs", monitor.scan_interval_secs),
            ("monitor.stats_interval_secs", monitor.stats_interval_secs),
            ("monitor.error_backoff_secs", monitor.error_backoff_secs),
        ] {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    value: value.to_string(),
                }
                .into());
            }
        }
        if monitor.stats_window_hours <= 0 {
            return Err(ConfigError::InvalidValue {
                field: "monitor.stats_window_hours".to_string(),
                value: monitor.stats_window_hours.to_string(),
            }
            .into());
        }
        if let Some(endpoint) = &self.models.sentiment_endpoint {
            let parsed = url::Url::parse(endpoint).map_err(|_| ConfigError::InvalidValue {
                field: "models.sentiment_endpoint".to_string(),
                value: endpoint.clone(),
            })?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(ConfigError::InvalidValue {
                    field: "models.sentiment_endpoint".to_string(),
                    value: endpoint.clone(),
                }
                .into());
            }
        }
        if self.reddit.user_agent.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "reddit.user_agent".to_string(),
            }
            .into());
        }
        Ok(())
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_value<T: std::str::FromStr>(field: &str, value: &str) -> Result<T, CoreError> {
    value.trim().parse::<T>().map_err(|_| {
        ConfigError::InvalidValue {
            field: field.to_string(),
            value: value.to_string(),
        }
        .into()
    })
}
