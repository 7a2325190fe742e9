//! Local-first record store.
//!
//! Holds every catalog record in memory together with its dirty/deleted/sync
//! bookkeeping. Each operation takes the store lock once and applies its
//! change in a single step, so callers never observe a half-applied mutation
//! and the lock is never held across an `.await`.

use std::collections::hash_map::Entry;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::{Deserialize, Serialize};

use crate::models::{
    LocalId, Platform, RemoteId, SyncState, Work, WorkDetails, WorkPatch, WorkStatus,
};
use crate::util::unix_millis_now;

/// Optional narrowing applied on top of [`WorkStore::list`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkFilter {
    pub platform: Option<Platform>,
    pub status: Option<WorkStatus>,
    /// Exact tag match, case-insensitive
    pub tag: Option<String>,
    /// Title substring, case-insensitive
    pub query: Option<String>,
}

impl WorkFilter {
    pub fn matches(&self, work: &Work) -> bool {
        if self.platform.is_some() && work.details.platform != self.platform {
            return false;
        }
        if self.status.is_some() && work.details.status != self.status {
            return false;
        }
        if let Some(tag) = self.tag.as_deref() {
            if !work.details.has_tag(tag) {
                return false;
            }
        }
        if let Some(query) = self.query.as_deref() {
            let query = query.trim().to_lowercase();
            if !query.is_empty() && !work.details.title.to_lowercase().contains(&query) {
                return false;
            }
        }
        true
    }
}

/// Aggregate sync status across the store
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncCounts {
    /// Non-deleted records
    pub listed: usize,
    pub dirty: usize,
    pub errored: usize,
    pub tombstones: usize,
}

/// Result of resolving a user-supplied identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdLookup {
    Found(LocalId),
    NotFound,
    Ambiguous(Vec<LocalId>),
}

/// Serializable copy of the whole store
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    /// Listing order, most recent first
    pub order: Vec<LocalId>,
    /// Every record, including tombstones outside the ordering
    pub works: Vec<Work>,
    pub last_sync_at: Option<i64>,
}

#[derive(Debug, Default)]
struct StoreState {
    items: HashMap<LocalId, Work>,
    order: VecDeque<LocalId>,
    last_sync_at: Option<i64>,
}

/// In-memory catalog state shared by the host and the reconciler.
#[derive(Debug, Default)]
pub struct WorkStore {
    state: Mutex<StoreState>,
}

impl WorkStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from a persisted snapshot.
    ///
    /// Ordering entries without a matching record are dropped.
    #[must_use]
    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let items: HashMap<LocalId, Work> = snapshot
            .works
            .into_iter()
            .map(|work| (work.local_id.clone(), work))
            .collect();
        let order = snapshot
            .order
            .into_iter()
            .filter(|id| items.contains_key(id))
            .collect();
        Self {
            state: Mutex::new(StoreState {
                items,
                order,
                last_sync_at: snapshot.last_sync_at,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a new unsynced work at the head of the listing
    pub fn add_local(&self, details: WorkDetails) -> LocalId {
        let work = Work::new(details);
        let id = work.local_id.clone();
        let mut state = self.lock();
        state.order.push_front(id.clone());
        state.items.insert(id.clone(), work);
        tracing::debug!("Added work {} locally", id);
        id
    }

    /// Merge `patch` onto an existing work and mark it dirty.
    ///
    /// Returns `false` without touching the store when `id` is unknown or
    /// already tombstoned.
    pub fn update_local(&self, id: &LocalId, patch: WorkPatch) -> bool {
        let mut state = self.lock();
        let Some(work) = state.items.get_mut(id).filter(|work| !work.deleted) else {
            tracing::debug!("Ignoring update for unknown or deleted work {}", id);
            return false;
        };
        work.details = patch.apply_to(std::mem::take(&mut work.details));
        touch(work);
        true
    }

    /// Tombstone a work so the next pass deletes it remotely.
    ///
    /// When `id` is unknown locally it is assumed to be a remote identifier
    /// and a tombstone carrying it as both local and remote id is created.
    /// An existing tombstone is left as is, so each remote delete is issued
    /// once.
    pub fn mark_delete_local(&self, id: &str) {
        let mut state = self.lock();
        match state.items.entry(LocalId::from(id)) {
            Entry::Occupied(mut entry) => {
                let work = entry.get_mut();
                if work.deleted {
                    tracing::debug!("Work {} is already deleted", id);
                    return;
                }
                work.deleted = true;
                touch(work);
            }
            Entry::Vacant(entry) => {
                tracing::debug!("Synthesizing tombstone for remote-only work {}", id);
                entry.insert(Work::remote_tombstone(id));
            }
        }
    }

    /// Purge a work and its ordering entry unconditionally
    pub fn remove_local(&self, id: &LocalId) -> Option<Work> {
        let mut state = self.lock();
        state.order.retain(|candidate| candidate != id);
        state.items.remove(id)
    }

    /// Non-deleted works, most recent first
    pub fn list(&self) -> Vec<Work> {
        let state = self.lock();
        state
            .order
            .iter()
            .filter_map(|id| state.items.get(id))
            .filter(|work| !work.deleted)
            .cloned()
            .collect()
    }

    pub fn list_filtered(&self, filter: &WorkFilter) -> Vec<Work> {
        let state = self.lock();
        state
            .order
            .iter()
            .filter_map(|id| state.items.get(id))
            .filter(|work| !work.deleted && filter.matches(work))
            .cloned()
            .collect()
    }

    /// Look up a work by local id, tombstones included
    pub fn get(&self, id: &LocalId) -> Option<Work> {
        self.lock().items.get(id).cloned()
    }

    /// Every dirty work: listed order first, then unordered tombstones
    pub fn dirty_records(&self) -> Vec<Work> {
        let state = self.lock();
        ordered_works(&state)
            .into_iter()
            .filter(|work| work.dirty)
            .cloned()
            .collect()
    }

    /// Resolve a local id, a remote id, or a unique local-id prefix
    pub fn resolve_id(&self, query: &str) -> IdLookup {
        let query = query.trim();
        if query.is_empty() {
            return IdLookup::NotFound;
        }

        let state = self.lock();
        let key = LocalId::from(query);
        if state.items.contains_key(&key) {
            return IdLookup::Found(key);
        }

        if let Some(work) = state
            .items
            .values()
            .find(|work| work.remote_id.as_ref().is_some_and(|remote| remote.as_str() == query))
        {
            return IdLookup::Found(work.local_id.clone());
        }

        let mut matches = state
            .items
            .keys()
            .filter(|id| id.as_str().starts_with(query))
            .cloned()
            .collect::<Vec<_>>();
        matches.sort();
        match matches.len() {
            0 => IdLookup::NotFound,
            1 => IdLookup::Found(matches.remove(0)),
            _ => IdLookup::Ambiguous(matches),
        }
    }

    /// Record a confirmed remote write for `id`.
    ///
    /// `remote_id` is bound whenever given. The work is only marked synced
    /// when no local mutation happened since `revision` was read; otherwise it
    /// stays dirty so the newer state is pushed on the next pass. Returns
    /// whether the work is now clean.
    pub fn mark_synced(&self, id: &LocalId, revision: u64, remote_id: Option<RemoteId>) -> bool {
        let mut state = self.lock();
        let Some(work) = state.items.get_mut(id) else {
            return false;
        };
        if let Some(remote_id) = remote_id {
            work.remote_id = Some(remote_id);
        }
        if work.revision == revision {
            work.dirty = false;
            work.sync_state = SyncState::Synced;
            true
        } else {
            work.sync_state = SyncState::Pending;
            false
        }
    }

    /// Flag a failed remote write; the work stays dirty for the next pass
    pub fn mark_sync_failed(&self, id: &LocalId) {
        if let Some(work) = self.lock().items.get_mut(id) {
            work.sync_state = SyncState::Error;
        }
    }

    /// Drop tombstones whose deletion is confirmed. Returns how many were purged.
    pub fn purge_synced_tombstones(&self) -> usize {
        let mut state = self.lock();
        let purged = state
            .items
            .values()
            .filter(|work| work.deleted && !work.dirty)
            .map(|work| work.local_id.clone())
            .collect::<Vec<_>>();
        for id in &purged {
            state.items.remove(id);
        }
        state.order.retain(|id| !purged.contains(id));
        purged.len()
    }

    pub fn last_sync_at(&self) -> Option<i64> {
        self.lock().last_sync_at
    }

    pub fn set_last_sync_at(&self, timestamp_ms: i64) {
        self.lock().last_sync_at = Some(timestamp_ms);
    }

    pub fn counts(&self) -> SyncCounts {
        let state = self.lock();
        state.items.values().fold(SyncCounts::default(), |mut counts, work| {
            if work.deleted {
                counts.tombstones += 1;
            } else {
                counts.listed += 1;
            }
            if work.dirty {
                counts.dirty += 1;
            }
            if work.sync_state == SyncState::Error {
                counts.errored += 1;
            }
            counts
        })
    }

    pub fn is_empty(&self) -> bool {
        self.lock().items.is_empty()
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        let state = self.lock();
        StoreSnapshot {
            order: state.order.iter().cloned().collect(),
            works: ordered_works(&state).into_iter().cloned().collect(),
            last_sync_at: state.last_sync_at,
        }
    }
}

fn touch(work: &mut Work) {
    work.updated_at = unix_millis_now().max(work.updated_at);
    work.dirty = true;
    work.sync_state = SyncState::Pending;
    work.revision += 1;
}

fn ordered_works(state: &StoreState) -> Vec<&Work> {
    let mut works = state
        .order
        .iter()
        .filter_map(|id| state.items.get(id))
        .collect::<Vec<_>>();
    let mut unordered = state
        .items
        .values()
        .filter(|work| !state.order.contains(&work.local_id))
        .collect::<Vec<_>>();
    unordered.sort_by(|a, b| a.local_id.cmp(&b.local_id));
    works.extend(unordered);
    works
}
