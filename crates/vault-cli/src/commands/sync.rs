use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use vault_core::db::{Database, SettingsRepository, SqliteSettingsRepository};
use vault_core::sync::{SyncReconciler, SyncReport, SyncResult, SyncRunner};
use vault_core::AutoSyncScheduler;

use crate::commands::common::{connect_remote, load_store, open_database, save_store, short_id};
use crate::error::CliError;

pub async fn run_sync(
    keep_tombstones: bool,
    db_path: &Path,
    global_profile: Option<&str>,
) -> Result<(), CliError> {
    let context = connect_remote(global_profile)?;
    let db = open_database(db_path)?;
    let store = Arc::new(load_store(&db)?);
    let reconciler = SyncReconciler::new(store, context.identity, context.remote);

    let report = sync_once(&db, &reconciler, keep_tombstones).await?;
    for line in format_report_lines(&report) {
        println!("{line}");
    }
    if !report.is_clean() {
        tracing::warn!("{} works failed to sync and stay pending", report.failures.len());
    }
    Ok(())
}

/// Run one pass and persist the resulting store state
pub async fn sync_once(
    db: &Database,
    reconciler: &SyncReconciler,
    keep_tombstones: bool,
) -> Result<SyncReport, CliError> {
    let report = reconciler.sync_now().await?;
    if !keep_tombstones {
        let purged = reconciler.store().purge_synced_tombstones();
        if purged > 0 {
            tracing::debug!("Purged {} confirmed tombstones", purged);
        }
    }
    save_store(db, reconciler.store())?;
    Ok(report)
}

pub fn format_report_lines(report: &SyncReport) -> Vec<String> {
    if report.attempted == 0 {
        return vec!["Nothing to sync".to_string()];
    }

    let mut lines = vec![format!(
        "Synced {}/{} ({} created, {} updated, {} deleted)",
        report.succeeded(),
        report.attempted,
        report.created,
        report.updated,
        report.deleted + report.local_tombstones
    )];
    if report.superseded > 0 {
        lines.push(format!(
            "{} works changed during sync and stay pending",
            report.superseded
        ));
    }
    for failure in &report.failures {
        lines.push(format!(
            "failed {} {}: {}",
            failure.operation.as_str(),
            short_id(failure.local_id.as_str()),
            failure.reason
        ));
    }
    lines
}

/// Reconciler that writes the store back to disk after every pass
pub struct PersistingRunner {
    reconciler: SyncReconciler,
    db: Mutex<Database>,
}

impl PersistingRunner {
    pub const fn new(reconciler: SyncReconciler, db: Database) -> Self {
        Self {
            reconciler,
            db: Mutex::new(db),
        }
    }
}

#[async_trait]
impl SyncRunner for PersistingRunner {
    async fn run_sync(&self) -> SyncResult<SyncReport> {
        let report = self.reconciler.sync_now().await?;
        self.reconciler.store().purge_synced_tombstones();

        {
            let db = self.db.lock().unwrap_or_else(PoisonError::into_inner);
            if let Err(error) = save_store(&db, self.reconciler.store()) {
                tracing::error!("Failed to save works after sync: {}", error);
            }
        }

        let lines = format_report_lines(&report);
        if report.is_clean() {
            lines.iter().for_each(|line| tracing::info!("{}", line));
        } else {
            lines.iter().for_each(|line| tracing::warn!("{}", line));
        }
        Ok(report)
    }
}

/// Sync on a timer until Ctrl-C.
///
/// Works are loaded once; edits made by other processes meanwhile are
/// overwritten by the next save.
pub async fn run_watch(
    interval_secs: Option<u64>,
    db_path: &Path,
    global_profile: Option<&str>,
) -> Result<(), CliError> {
    let context = connect_remote(global_profile)?;
    let db = open_database(db_path)?;
    let interval = match interval_secs {
        Some(secs) => Some(std::time::Duration::from_secs(secs)),
        None => SqliteSettingsRepository::new(db.connection())
            .load()?
            .auto_sync_interval(),
    }
    .filter(|interval| !interval.is_zero())
    .ok_or(CliError::NoAutoSyncInterval)?;

    let store = Arc::new(load_store(&db)?);
    let reconciler = SyncReconciler::new(store, context.identity, context.remote);
    let runner = Arc::new(PersistingRunner::new(reconciler, db));

    if let Err(error) = runner.run_sync().await {
        tracing::warn!("Initial sync pass failed: {}", error);
    }

    let scheduler = AutoSyncScheduler::new(runner);
    if !scheduler.set_auto_sync_interval(Some(interval)) {
        return Err(CliError::Config(format!(
            "auto-sync interval {}s is out of range",
            interval.as_secs()
        )));
    }
    println!(
        "Syncing every {}s with profile '{}'. Press Ctrl-C to stop.",
        interval.as_secs(),
        context.profile_name
    );

    tokio::signal::ctrl_c().await?;
    scheduler.stop();
    println!("Stopped");
    Ok(())
}
