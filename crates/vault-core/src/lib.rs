//! vault-core - Core library for My Doujin Vault
//!
//! This crate contains the catalog models, the local-first record store, the
//! sync reconciler and auto-sync scheduler, the remote collection and identity
//! adapters, and the `SQLite` persistence used by the `vault` CLI.

pub mod auth;
pub mod db;
pub mod error;
pub mod models;
pub mod remote;
pub mod store;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{LocalId, RemoteId, Work, WorkDetails, WorkPatch};
pub use store::WorkStore;
pub use sync::{AutoSyncScheduler, SyncReconciler, SyncReport};
