//! SQLite persistence for the record store and sync settings

mod connection;
mod migrations;
mod settings_repository;
mod work_repository;

pub use connection::Database;
pub use settings_repository::{SettingsRepository, SqliteSettingsRepository};
pub use work_repository::{SqliteWorkRepository, WorkRepository};
