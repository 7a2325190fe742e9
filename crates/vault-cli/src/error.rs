use std::io;

use thiserror::Error;
use vault_core::auth::AuthError;
use vault_core::remote::RemoteError;
use vault_core::sync::SyncError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] vault_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error(transparent)]
    Remote(#[from] RemoteError),
    #[error("Title cannot be empty")]
    EmptyTitle,
    #[error("Work ID cannot be empty")]
    EmptyWorkId,
    #[error("Work not found for id/prefix: {0}")]
    WorkNotFound(String),
    #[error("{0}")]
    AmbiguousWorkId(String),
    #[error("Nothing to change; pass at least one field to edit")]
    NothingToEdit,
    #[error("Configuration error: {0}")]
    Config(String),
    #[error(
        "Sync is not configured. Run `vault config init --api-base-url <URL> --firebase-api-key <KEY>` first."
    )]
    SyncNotConfigured,
    #[error(
        "No auto-sync interval configured. Pass --interval-secs or run `vault config set-interval <secs>`."
    )]
    NoAutoSyncInterval,
}
