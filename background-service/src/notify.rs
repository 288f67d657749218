use async_trait::async_trait;
use brandwatch_core::{CoreError, Mention};
use notify_rust::{Notification, Timeout};
use tracing::{info, warn};

/// Receives every HIGH or CRITICAL mention found by a scheduled scan.
#[async_trait]
pub trait ThreatNotifier: Send + Sync {
    async fn notify(&self, mention: &Mention) -> Result<(), CoreError>;
}

/// Escalation notice in the log. Always installed.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

#[async_trait]
impl ThreatNotifier for LogNotifier {
    async fn notify(&self, mention: &Mention) -> Result<(), CoreError> {
        warn!(
            post_id = %mention.post.id,
            level = %mention.threat.level,
            score = mention.threat.score,
            "High-priority threat detected"
        );
        info!(
            subreddit = %mention.post.subreddit,
            keywords = ?mention.threat.matched_keywords,
            categories = ?mention.threat.categories,
            permalink = %mention.post.permalink,
            "Threat details"
        );
        Ok(())
    }
}

/// Desktop popup through the platform notification service.
#[derive(Debug, Clone)]
pub struct DesktopNotifier {
    app_name: String,
}

impl DesktopNotifier {
    pub fn new(app_name: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
        }
    }
}

impl Default for DesktopNotifier {
    fn default() -> Self {
        Self::new("brandwatch")
    }
}

pub(crate) fn summary(mention: &Mention) -> String {
    format!(
        "{} threat in r/{}",
        mention.threat.level.as_str().to_uppercase(),
        mention.post.subreddit
    )
}

pub(crate) fn body(mention: &Mention) -> String {
    let mut body = format!(
        "{}\nScore {:.2}",
        mention.post.title, mention.threat.score
    );
    if !mention.threat.matched_keywords.is_empty() {
        body.push_str(&format!(
            " | keywords: {}",
            mention.threat.matched_keywords.join(", ")
        ));
    }
    body
}

#[async_trait]
impl ThreatNotifier for DesktopNotifier {
    async fn notify(&self, mention: &Mention) -> Result<(), CoreError> {
        let app_name = self.app_name.clone();
        let summary = summary(mention);
        let body = body(mention);

        // The platform call blocks on D-Bus / the notification center.
        tokio::task::spawn_blocking(move || {
            Notification::new()
                .appname(&app_name)
                .summary(&summary)
                .body(&body)
                .timeout(Timeout::Milliseconds(10_000))
                .show()
                .map(|_| ())
        })
        .await
        .map_err(|e| CoreError::Internal {
            message: format!("notification task failed: {e}"),
        })?
        .map_err(|e| CoreError::Internal {
            message: format!("desktop notification failed: {e}"),
        })
    }
}
