//! Background reconciliation between the local store and the remote collection.

mod reconciler;
mod scheduler;

use serde::Serialize;
use thiserror::Error;

use crate::models::LocalId;

pub use reconciler::SyncReconciler;
pub use scheduler::{
    interval_from_millis, AutoSyncHandle, AutoSyncScheduler, SyncRunner, MAX_AUTO_SYNC_INTERVAL,
};

/// Errors that abort a whole pass. Per-record failures live in [`SyncReport`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    #[error("Sign-in failed: {0}")]
    Auth(String),
    #[error("Sync pass was interrupted before it finished")]
    Interrupted,
}

pub type SyncResult<T> = Result<T, SyncError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOperation {
    Create,
    Update,
    Delete,
}

impl SyncOperation {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecordFailure {
    pub local_id: LocalId,
    pub operation: SyncOperation,
    pub reason: String,
}

/// Summary of one reconciliation pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    /// Dirty records seen at the start of the pass
    pub attempted: usize,
    pub created: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Tombstones settled without a remote call
    pub local_tombstones: usize,
    /// Confirmed writes whose record was edited again mid-pass
    pub superseded: usize,
    pub failures: Vec<RecordFailure>,
    /// Completion time (Unix ms); `None` when nothing was dirty
    pub finished_at: Option<i64>,
}

impl SyncReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.created + self.updated + self.deleted + self.local_tombstones
    }
}
