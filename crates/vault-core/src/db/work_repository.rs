//! Work repository implementation

#![allow(clippy::cast_possible_wrap)] // SQLite stores positions as i64

use crate::error::{Error, Result};
use crate::models::{LocalId, Platform, RemoteId, SyncState, Work, WorkDetails, WorkStatus};
use crate::store::StoreSnapshot;
use rusqlite::{params, Connection, Row};

use super::settings_repository::{SettingsRepository, SqliteSettingsRepository};

/// Trait for persisting the whole record store
pub trait WorkRepository {
    /// Load every stored work together with the listing order
    fn load_snapshot(&self) -> Result<StoreSnapshot>;

    /// Replace stored works with `snapshot` in one transaction
    fn save_snapshot(&self, snapshot: &StoreSnapshot) -> Result<()>;
}

/// `SQLite` implementation of `WorkRepository`
pub struct SqliteWorkRepository<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteWorkRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

const SELECT_WORKS: &str = "SELECT local_id, remote_id, title, platform, status, tags, rating,
        cover_image_url, cover_source_url, product_url, created_at, updated_at,
        dirty, deleted, sync_state, revision, position
    FROM works
    ORDER BY position IS NULL, position, local_id";

struct WorkRow {
    local_id: String,
    remote_id: Option<String>,
    title: String,
    platform: Option<String>,
    status: Option<String>,
    tags: String,
    rating: Option<i64>,
    cover_image_url: Option<String>,
    cover_source_url: Option<String>,
    product_url: Option<String>,
    created_at: i64,
    updated_at: i64,
    dirty: bool,
    deleted: bool,
    sync_state: String,
    revision: i64,
    position: Option<i64>,
}

impl WorkRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            local_id: row.get(0)?,
            remote_id: row.get(1)?,
            title: row.get(2)?,
            platform: row.get(3)?,
            status: row.get(4)?,
            tags: row.get(5)?,
            rating: row.get(6)?,
            cover_image_url: row.get(7)?,
            cover_source_url: row.get(8)?,
            product_url: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
            dirty: row.get(12)?,
            deleted: row.get(13)?,
            sync_state: row.get(14)?,
            revision: row.get(15)?,
            position: row.get(16)?,
        })
    }

    fn into_work(self) -> Result<Work> {
        let tags: Vec<String> = serde_json::from_str(&self.tags)?;
        let rating = self
            .rating
            .map(|rating| {
                u8::try_from(rating)
                    .map_err(|_| Error::Database(format!("rating {rating} out of range")))
            })
            .transpose()?;

        Ok(Work {
            local_id: LocalId::from(self.local_id),
            remote_id: self.remote_id.map(RemoteId::new),
            details: WorkDetails {
                title: self.title,
                platform: self
                    .platform
                    .as_deref()
                    .map(str::parse::<Platform>)
                    .transpose()?,
                status: self
                    .status
                    .as_deref()
                    .map(str::parse::<WorkStatus>)
                    .transpose()?,
                tags,
                rating,
                cover_image_url: self.cover_image_url,
                cover_source_url: self.cover_source_url,
                product_url: self.product_url,
            },
            created_at: self.created_at,
            updated_at: self.updated_at,
            dirty: self.dirty,
            deleted: self.deleted,
            sync_state: self.sync_state.parse::<SyncState>()?,
            revision: u64::try_from(self.revision).unwrap_or_default(),
        })
    }
}

impl WorkRepository for SqliteWorkRepository<'_> {
    fn load_snapshot(&self) -> Result<StoreSnapshot> {
        let mut stmt = self.conn.prepare(SELECT_WORKS)?;
        let rows = stmt
            .query_map([], WorkRow::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut snapshot = StoreSnapshot {
            last_sync_at: SqliteSettingsRepository::new(self.conn).last_sync_at()?,
            ..StoreSnapshot::default()
        };
        for row in rows {
            let ordered = row.position.is_some();
            let work = row.into_work()?;
            if ordered {
                snapshot.order.push(work.local_id.clone());
            }
            snapshot.works.push(work);
        }

        tracing::debug!("Loaded {} works from database", snapshot.works.len());
        Ok(snapshot)
    }

    fn save_snapshot(&self, snapshot: &StoreSnapshot) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute("DELETE FROM works", [])?;

        {
            let mut insert = tx.prepare(
                "INSERT INTO works (
                    local_id, remote_id, title, platform, status, tags, rating,
                    cover_image_url, cover_source_url, product_url, created_at, updated_at,
                    dirty, deleted, sync_state, revision, position
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17)",
            )?;
            for work in &snapshot.works {
                let position = snapshot
                    .order
                    .iter()
                    .position(|id| id == &work.local_id)
                    .map(|index| index as i64);
                let details = &work.details;
                insert.execute(params![
                    work.local_id.as_str(),
                    work.remote_id.as_ref().map(RemoteId::as_str),
                    details.title,
                    details.platform.map(Platform::as_str),
                    details.status.map(WorkStatus::as_str),
                    serde_json::to_string(&details.tags)?,
                    details.rating.map(i64::from),
                    details.cover_image_url,
                    details.cover_source_url,
                    details.product_url,
                    work.created_at,
                    work.updated_at,
                    work.dirty,
                    work.deleted,
                    work.sync_state.as_str(),
                    i64::try_from(work.revision).unwrap_or(i64::MAX),
                    position,
                ])?;
            }
        }

        SqliteSettingsRepository::new(&tx).set_last_sync_at(snapshot.last_sync_at)?;
        tx.commit()?;
        tracing::debug!("Saved {} works to database", snapshot.works.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::WorkPatch;
    use crate::store::WorkStore;
    use pretty_assertions::assert_eq;

    fn populated_store() -> WorkStore {
        let store = WorkStore::new();
        let first = store.add_local(WorkDetails {
            platform: Some(Platform::DlSite),
            status: Some(WorkStatus::Playing),
            tags: vec!["ASMR".to_string(), "百合".to_string()],
            rating: Some(4),
            product_url: Some("https://www.dlsite.com/work/RJ01".to_string()),
            ..WorkDetails::new("First")
        });
        let second = store.add_local(WorkDetails::new("Second"));
        store.add_local(WorkDetails::new("Third"));
        store.mark_synced(&first, 0, Some(RemoteId::new("doc-1")));
        store.update_local(
            &first,
            WorkPatch {
                status: Some(Some(WorkStatus::Finished)),
                ..WorkPatch::default()
            },
        );
        store.mark_delete_local(second.as_str());
        store.mark_sync_failed(&second);
        store.mark_delete_local("remote-only");
        store.set_last_sync_at(1_700_000_000_000);
        store
    }

    #[test]
    fn test_snapshot_roundtrip_preserves_state() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteWorkRepository::new(db.connection());
        let snapshot = populated_store().snapshot();

        repo.save_snapshot(&snapshot).unwrap();
        let loaded = repo.load_snapshot().unwrap();

        assert_eq!(loaded, snapshot);
        let restored = WorkStore::from_snapshot(loaded);
        let titles: Vec<String> = restored
            .list()
            .into_iter()
            .map(|work| work.details.title)
            .collect();
        assert_eq!(titles, vec!["Third".to_string(), "First".to_string()]);
        assert_eq!(restored.counts(), populated_store().counts());
    }

    #[test]
    fn test_save_replaces_previous_rows() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteWorkRepository::new(db.connection());
        repo.save_snapshot(&populated_store().snapshot()).unwrap();

        let store = WorkStore::new();
        store.add_local(WorkDetails::new("Only"));
        repo.save_snapshot(&store.snapshot()).unwrap();

        let loaded = repo.load_snapshot().unwrap();
        assert_eq!(loaded.works.len(), 1);
        assert_eq!(loaded.last_sync_at, None);
    }

    #[test]
    fn test_empty_database_loads_empty_snapshot() {
        let db = Database::open_in_memory().unwrap();
        let repo = SqliteWorkRepository::new(db.connection());
        assert_eq!(repo.load_snapshot().unwrap(), StoreSnapshot::default());
    }
}
