//! Settings repository implementation

use crate::error::Result;
use crate::models::SyncSettings;
use crate::sync::interval_from_millis;
use rusqlite::{params, Connection, OptionalExtension};

const AUTO_SYNC_INTERVAL_KEY: &str = "auto_sync_interval_ms";
const LAST_SYNC_AT_KEY: &str = "last_sync_at";

/// Trait for settings storage operations
pub trait SettingsRepository {
    /// Load sync settings, falling back to defaults for missing keys
    fn load(&self) -> Result<SyncSettings>;

    /// Save sync settings
    fn save(&self, settings: &SyncSettings) -> Result<()>;

    fn last_sync_at(&self) -> Result<Option<i64>>;

    fn set_last_sync_at(&self, timestamp_ms: Option<i64>) -> Result<()>;
}

/// `SQLite` implementation of `SettingsRepository`
pub struct SqliteSettingsRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteSettingsRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn get_setting(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .conn
            .query_row(
                "SELECT value FROM settings WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn set_setting(&self, key: &str, value: Option<&str>) -> Result<()> {
        match value {
            Some(value) => self.conn.execute(
                "INSERT OR REPLACE INTO settings (key, value) VALUES (?1, ?2)",
                params![key, value],
            )?,
            None => self
                .conn
                .execute("DELETE FROM settings WHERE key = ?1", params![key])?,
        };
        Ok(())
    }
}

impl SettingsRepository for SqliteSettingsRepository<'_> {
    fn load(&self) -> Result<SyncSettings> {
        let mut settings = SyncSettings::default();

        if let Some(value) = self.get_setting(AUTO_SYNC_INTERVAL_KEY)? {
            match value.trim().parse::<i64>() {
                Ok(millis) => settings.set_auto_sync_interval(interval_from_millis(millis)),
                Err(_) => tracing::warn!("Ignoring invalid {AUTO_SYNC_INTERVAL_KEY} `{value}`"),
            }
        }

        Ok(settings)
    }

    fn save(&self, settings: &SyncSettings) -> Result<()> {
        let interval = settings.auto_sync_interval_ms.map(|millis| millis.to_string());
        self.set_setting(AUTO_SYNC_INTERVAL_KEY, interval.as_deref())
    }

    fn last_sync_at(&self) -> Result<Option<i64>> {
        Ok(self
            .get_setting(LAST_SYNC_AT_KEY)?
            .and_then(|value| value.trim().parse().ok()))
    }

    fn set_last_sync_at(&self, timestamp_ms: Option<i64>) -> Result<()> {
        let value = timestamp_ms.map(|timestamp| timestamp.to_string());
        self.set_setting(LAST_SYNC_AT_KEY, value.as_deref())
    }
}
