use std::path::Path;

use serde::Serialize;
use vault_core::db::{SettingsRepository, SqliteSettingsRepository};
use vault_core::store::SyncCounts;

use crate::commands::common::{format_sync_timestamp, load_store, open_database};
use crate::error::CliError;

#[derive(Debug, Serialize)]
pub struct StatusReport {
    #[serde(flatten)]
    pub counts: SyncCounts,
    pub last_sync_at: Option<i64>,
    pub auto_sync_interval_ms: Option<u64>,
}

pub fn run_status(as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let store = load_store(&db)?;
    let settings = SqliteSettingsRepository::new(db.connection()).load()?;
    let report = StatusReport {
        counts: store.counts(),
        last_sync_at: store.last_sync_at(),
        auto_sync_interval_ms: settings.auto_sync_interval_ms,
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    for line in format_status_lines(&report) {
        println!("{line}");
    }
    Ok(())
}

pub fn format_status_lines(report: &StatusReport) -> Vec<String> {
    let counts = &report.counts;
    let mut lines = vec![
        format!("works:         {}", counts.listed),
        format!("pending:       {}", counts.dirty),
    ];
    if counts.errored > 0 {
        lines.push(format!("failed:        {}", counts.errored));
    }
    if counts.tombstones > 0 {
        lines.push(format!("tombstones:    {}", counts.tombstones));
    }
    lines.push(format!(
        "last sync:     {}",
        report
            .last_sync_at
            .map_or_else(|| "never".to_string(), format_sync_timestamp)
    ));
    lines.push(format!(
        "auto-sync:     {}",
        report
            .auto_sync_interval_ms
            .map_or_else(|| "off".to_string(), |millis| format!("every {}s", millis / 1000))
    ));
    lines
}
