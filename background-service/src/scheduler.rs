use brandwatch_core::{CoreError, ErrorExt, Mention};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::monitor::MonitorEngine;
use crate::notify::{LogNotifier, ThreatNotifier};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SchedulerStatus {
    Stopped,
    Running,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoopTiming {
    pub scan_interval: Duration,
    pub stats_interval: Duration,
    pub error_backoff: Duration,
    /// How long `stop` waits for a loop before aborting it.
    pub shutdown_grace: Duration,
}

struct RunningLoops {
    cancel: CancellationToken,
    scan: JoinHandle<()>,
    stats: JoinHandle<()>,
}

/// Drives the scan loop and the stats loop of one [`MonitorEngine`].
pub struct Scheduler {
    engine: Arc<MonitorEngine>,
    notifiers: Vec<Arc<dyn ThreatNotifier>>,
    timing: LoopTiming,
    loops: Mutex<Option<RunningLoops>>,
}

impl Scheduler {
    /// Timing comes from the engine's monitor config; a [`LogNotifier`] is
    /// installed.
    pub fn new(engine: Arc<MonitorEngine>) -> Self {
        let config = engine.config();
        let timing = LoopTiming {
            scan_interval: config.scan_interval(),
            stats_interval: config.stats_interval(),
            error_backoff: config.error_backoff(),
            shutdown_grace: config.shutdown_grace(),
        };

        Self {
            engine,
            notifiers: vec![Arc::new(LogNotifier)],
            timing,
            loops: Mutex::new(None),
        }
    }

    pub fn with_notifier(mut self, notifier: Arc<dyn ThreatNotifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    pub fn with_timing(mut self, timing: LoopTiming) -> Self {
        self.timing = timing;
        self
    }

    pub fn timing(&self) -> LoopTiming {
        self.timing
    }

    pub async fn status(&self) -> SchedulerStatus {
        if self.loops.lock().await.is_some() {
            SchedulerStatus::Running
        } else {
            SchedulerStatus::Stopped
        }
    }

    pub async fn start(&self) -> SchedulerStatus {
        let mut loops = self.loops.lock().await;
        if loops.is_some() {
            warn!("Scheduler already running");
            return SchedulerStatus::Running;
        }

        *loops = Some(self.spawn_loops());
        info!("Monitoring scheduler started");
        SchedulerStatus::Running
    }

    /// Cancels both loops and waits for them to finish. A loop that does not
    /// finish within the shutdown grace period is aborted.
    pub async fn stop(&self) -> SchedulerStatus {
        let mut loops = self.loops.lock().await;
        if let Some(running) = loops.take() {
            self.shutdown(running).await;
            info!("Monitoring scheduler stopped");
        }
        SchedulerStatus::Stopped
    }

    pub async fn restart(&self) -> SchedulerStatus {
        let mut loops = self.loops.lock().await;
        if let Some(running) = loops.take() {
            self.shutdown(running).await;
        }

        *loops = Some(self.spawn_loops());
        info!("Monitoring scheduler restarted");
        SchedulerStatus::Running
    }

    fn spawn_loops(&self) -> RunningLoops {
        let cancel = CancellationToken::new();
        let timing = self.timing;

        let engine = self.engine.clone();
        let notifiers = self.notifiers.clone();
        let scan = tokio::spawn(run_loop(
            "scan",
            cancel.child_token(),
            timing.scan_interval,
            timing.error_backoff,
            move || {
                let engine = engine.clone();
                let notifiers = notifiers.clone();
                async move { scan_iteration(&engine, &notifiers).await }
            },
        ));

        let engine = self.engine.clone();
        let stats = tokio::spawn(run_loop(
            "stats",
            cancel.child_token(),
            timing.stats_interval,
            timing.error_backoff,
            move || {
                let engine = engine.clone();
                async move { engine.refresh_stats().await.map(|_| ()) }
            },
        ));

        RunningLoops {
            cancel,
            scan,
            stats,
        }
    }

    async fn shutdown(&self, running: RunningLoops) {
        running.cancel.cancel();
        for (name, mut handle) in [("scan", running.scan), ("stats", running.stats)] {
            match timeout(self.timing.shutdown_grace, &mut handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => warn!("{} loop ended abnormally: {}", name, e),
                Err(_) => {
                    warn!(
                        "{} loop did not stop within {:?}, aborting",
                        name, self.timing.shutdown_grace
                    );
                    handle.abort();
                    let _ = handle.await;
                }
            }
        }
    }
}

impl Drop for Scheduler {
    /// Loops must not outlive their scheduler. There is no waiting here; both
    /// tasks are cancelled and aborted.
    fn drop(&mut self) {
        if let Some(running) = self.loops.get_mut().take() {
            running.cancel.cancel();
            running.scan.abort();
            running.stats.abort();
            info!("Monitoring scheduler dropped while running, loops aborted");
        }
    }
}

/// Runs `iteration` until cancelled, sleeping `interval` after a success and
/// `backoff` after an error or panic.
async fn run_loop<F, Fut>(
    name: &'static str,
    cancel: CancellationToken,
    interval: Duration,
    backoff: Duration,
    mut iteration: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<(), CoreError>>,
{
    info!("Starting {} loop", name);

    loop {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => break,
            outcome = AssertUnwindSafe(iteration()).catch_unwind() => outcome,
        };

        let wait = match outcome {
            Ok(Ok(())) => interval,
            Ok(Err(e)) => {
                error!(code = %e.error_code(), "Error in {} loop: {}", name, e);
                backoff
            }
            Err(_) => {
                error!("{} loop iteration panicked", name);
                backoff
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = sleep(wait) => {}
        }
    }

    info!("{} loop stopped", name);
}

async fn scan_iteration(
    engine: &MonitorEngine,
    notifiers: &[Arc<dyn ThreatNotifier>],
) -> Result<(), CoreError> {
    let mentions = engine.scan_for_mentions().await?;
    if !mentions.is_empty() {
        info!("Processed {} new mentions", mentions.len());
        check_high_priority(&mentions, notifiers).await;
    }
    Ok(())
}

/// Hands HIGH and CRITICAL mentions to every notifier. Notifier failures are
/// logged only.
pub async fn check_high_priority(mentions: &[Mention], notifiers: &[Arc<dyn ThreatNotifier>]) {
    let urgent: Vec<&Mention> = mentions
        .iter()
        .filter(|m| m.threat.level.is_high_priority())
        .collect();
    if urgent.is_empty() {
        return;
    }

    warn!("Found {} high-priority threats", urgent.len());
    for mention in urgent {
        for notifier in notifiers {
            if let Err(e) = notifier.notify(mention).await {
                warn!(post_id = %mention.post.id, "Notifier failed: {}", e);
            }
        }
    }
}
