//! Periodic maintenance driver.
//!
//! Runs WAL checkpoints (and optionally statistics refresh) on a fixed
//! cadence until the shutdown channel flips to `true`.

use crate::config::Config;
use crate::db::Database;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, Interval, MissedTickBehavior};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MaintenanceSchedule {
    pub checkpoint_interval: Option<Duration>,
    pub analyze_interval: Option<Duration>,
}

impl From<&Config> for MaintenanceSchedule {
    fn from(config: &Config) -> Self {
        MaintenanceSchedule {
            checkpoint_interval: config.checkpoint_interval,
            analyze_interval: config.analyze_interval,
        }
    }
}

#[derive(Default)]
struct RunCounters {
    checkpoints: AtomicU64,
    analyzes: AtomicU64,
}

pub struct MaintenanceScheduler {
    counters: Arc<RunCounters>,
    handle: JoinHandle<()>,
}

impl MaintenanceScheduler {
    /// Spawn the maintenance task. The first run of each job happens one
    /// full period after spawning.
    pub fn spawn(
        db: Database,
        schedule: MaintenanceSchedule,
        mut shutdown: watch::Receiver<bool>,
    ) -> Self {
        let counters = Arc::new(RunCounters::default());
        let task_counters = counters.clone();

        let handle = tokio::spawn(async move {
            let mut checkpoint = schedule.checkpoint_interval.map(periodic);
            let mut analyze = schedule.analyze_interval.map(periodic);
            info!(
                checkpoint_secs = ?schedule.checkpoint_interval.map(|d| d.as_secs()),
                analyze_secs = ?schedule.analyze_interval.map(|d| d.as_secs()),
                "Maintenance scheduler started"
            );

            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    _ = next_tick(&mut checkpoint) => {
                        if db.checkpoint_and_truncate().await.is_some() {
                            task_counters.checkpoints.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    _ = next_tick(&mut analyze) => {
                        if db.refresh_statistics().await {
                            task_counters.analyzes.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
            }

            debug!("Maintenance scheduler stopped");
        });

        MaintenanceScheduler { counters, handle }
    }

    /// Successful checkpoints so far.
    pub fn checkpoints_run(&self) -> u64 {
        self.counters.checkpoints.load(Ordering::Relaxed)
    }

    /// Successful statistics refreshes so far.
    pub fn analyzes_run(&self) -> u64 {
        self.counters.analyzes.load(Ordering::Relaxed)
    }

    /// Wait for the task to exit after shutdown has been signalled.
    pub async fn join(self) {
        let _ = self.handle.await;
    }
}

fn periodic(period: Duration) -> Interval {
    let mut interval = interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
