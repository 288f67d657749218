use analysis_engine::{SentimentScorer, ThreatAnalyzer};
use anyhow::Context;
use background_service::{DesktopNotifier, MonitorEngine, Scheduler};
use brandwatch_core::AppConfig;
use database::Database;
use reddit_client::RedditSource;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG_PATH: &str = "brandwatch.toml";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("brandwatch=info,background_service=info")),
        )
        .init();

    tracing::info!("Starting Brandwatch - Reddit brand monitor");

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = AppConfig::load(&config_path)
        .with_context(|| format!("loading configuration from {config_path}"))?;

    let database = Database::connect(&config.database.url, config.database.max_connections)
        .await
        .context("opening the mention database")?;
    database
        .run_migrations()
        .await
        .context("migrating the mention database")?;

    let source = RedditSource::new(&config.reddit).context("configuring the Reddit client")?;

    let scorer = SentimentScorer::new(llm_interface::sentiment_classifier(&config.models));
    if !scorer.has_primary() {
        tracing::info!("No sentiment model configured, using the lexical scorer");
    }
    let context = llm_interface::context_provider(&config.models);
    if let Some(provider) = &context {
        tracing::info!("Context notes generated by {}", provider.provider_name());
    }

    let engine = Arc::new(MonitorEngine::new(
        Arc::new(source),
        Arc::new(database.clone()),
        ThreatAnalyzer::new(scorer, context),
        config.monitor.clone(),
    ));

    let mut scheduler = Scheduler::new(engine);
    if config.monitor.desktop_notifications {
        scheduler = scheduler.with_notifier(Arc::new(DesktopNotifier::default()));
    }

    scheduler.start().await;
    tracing::info!(
        keywords = ?config.monitor.keywords,
        subreddits = ?config.monitor.subreddits,
        "Monitoring started, press Ctrl-C to stop"
    );

    tokio::signal::ctrl_c()
        .await
        .context("waiting for the shutdown signal")?;

    tracing::info!("Shutting down");
    scheduler.stop().await;
    database.close().await;

    Ok(())
}
