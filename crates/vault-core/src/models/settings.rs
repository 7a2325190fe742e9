//! Sync settings model

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Persisted sync preferences
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Auto-sync interval in milliseconds; `None` means manual sync only
    pub auto_sync_interval_ms: Option<u64>,
}

impl SyncSettings {
    /// Interval to hand to the scheduler, treating zero as disabled
    pub fn auto_sync_interval(&self) -> Option<Duration> {
        self.auto_sync_interval_ms
            .filter(|millis| *millis > 0)
            .map(Duration::from_millis)
    }

    pub fn set_auto_sync_interval(&mut self, interval: Option<Duration>) {
        self.auto_sync_interval_ms = interval
            .map(|interval| u64::try_from(interval.as_millis()).unwrap_or(u64::MAX))
            .filter(|millis| *millis > 0);
    }
}
