//! Scan orchestration and the periodic monitoring loops.

pub mod monitor;
pub mod notify;
pub mod scheduler;

pub use monitor::{MonitorEngine, ALERT_TEST_LIMIT, TOP_SUBREDDITS};
pub use notify::{DesktopNotifier, LogNotifier, ThreatNotifier};
pub use scheduler::{check_high_priority, LoopTiming, Scheduler, SchedulerStatus};

#[cfg(test)]
mod fakes;
#[cfg(test)]
mod tests;
