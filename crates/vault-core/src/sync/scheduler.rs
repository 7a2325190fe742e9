use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{SyncReport, SyncResult};

/// Anything that can run a sync pass on demand.
#[async_trait]
pub trait SyncRunner: Send + Sync + 'static {
    async fn run_sync(&self) -> SyncResult<SyncReport>;
}

/// Longest interval the scheduler accepts.
pub const MAX_AUTO_SYNC_INTERVAL: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Map a stored interval setting to a timer period; non-positive disables.
pub fn interval_from_millis(millis: i64) -> Option<Duration> {
    u64::try_from(millis)
        .ok()
        .filter(|millis| *millis > 0)
        .map(Duration::from_millis)
}

/// A running repeating timer. Cancelled on drop.
pub struct AutoSyncHandle {
    interval: Duration,
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl AutoSyncHandle {
    /// Returns `None` when the first deadline cannot be represented.
    fn spawn(runner: Arc<dyn SyncRunner>, interval: Duration) -> Option<Self> {
        let start = Instant::now().checked_add(interval)?;
        let token = CancellationToken::new();
        let cancelled = token.clone();
        let task = tokio::spawn(async move {
            let mut ticker = interval_at(start, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    () = cancelled.cancelled() => break,
                    _ = ticker.tick() => match runner.run_sync().await {
                        Ok(report) => tracing::debug!(
                            "Auto-sync pass done ({} succeeded, {} failed)",
                            report.succeeded(),
                            report.failures.len()
                        ),
                        Err(error) => tracing::warn!("Auto-sync pass failed: {}", error),
                    },
                }
            }
            tracing::debug!("Auto-sync timer stopped");
        });

        Some(Self {
            interval,
            token,
            task,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled() || self.task.is_finished()
    }
}

impl Drop for AutoSyncHandle {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

/// Owns at most one auto-sync timer at a time.
pub struct AutoSyncScheduler {
    runner: Arc<dyn SyncRunner>,
    active: Mutex<Option<AutoSyncHandle>>,
}

impl AutoSyncScheduler {
    pub fn new(runner: Arc<dyn SyncRunner>) -> Self {
        Self {
            runner,
            active: Mutex::new(None),
        }
    }

    /// Replace the running timer. `None` or a zero interval disables it.
    ///
    /// Intervals above [`MAX_AUTO_SYNC_INTERVAL`] are rejected and leave
    /// auto-sync off. Must be called inside a tokio runtime. Returns whether
    /// a timer is now running.
    pub fn set_auto_sync_interval(&self, interval: Option<Duration>) -> bool {
        let mut active = self.lock();
        if let Some(previous) = active.take() {
            previous.cancel();
        }

        match interval.filter(|interval| !interval.is_zero()) {
            Some(interval) if interval > MAX_AUTO_SYNC_INTERVAL => {
                tracing::warn!(
                    "Auto-sync interval {}s exceeds the {}s limit, auto-sync disabled",
                    interval.as_secs(),
                    MAX_AUTO_SYNC_INTERVAL.as_secs()
                );
                false
            }
            Some(interval) => {
                *active = AutoSyncHandle::spawn(self.runner.clone(), interval);
                if active.is_some() {
                    tracing::info!("Auto-sync every {}s", interval.as_secs_f64());
                } else {
                    tracing::warn!("Auto-sync interval out of range, auto-sync disabled");
                }
                active.is_some()
            }
            None => {
                tracing::info!("Auto-sync disabled");
                false
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|handle| !handle.is_cancelled())
    }

    pub fn interval(&self) -> Option<Duration> {
        self.lock().as_ref().map(AutoSyncHandle::interval)
    }

    pub fn stop(&self) {
        self.set_auto_sync_interval(None);
    }

    fn lock(&self) -> MutexGuard<'_, Option<AutoSyncHandle>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
