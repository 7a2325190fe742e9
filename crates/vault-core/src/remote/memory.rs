//! In-process remote collection used by tests and offline demos.

use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

use super::{
    PageRequest, RemoteCollection, RemoteDocument, RemoteError, RemoteItem, RemoteListFilter,
    RemoteOutcome, RemotePage, RemoteResult,
};
use crate::models::RemoteId;

/// A write observed by [`InMemoryRemoteCollection`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteCall {
    Create { title: String, owner_id: String },
    Update { remote_id: RemoteId },
    Delete { remote_id: RemoteId },
}

#[derive(Debug, Default)]
struct MemoryState {
    documents: BTreeMap<String, (String, RemoteDocument)>,
    next_id: u64,
    calls: Vec<RemoteCall>,
    failing_titles: HashSet<String>,
    failing_ids: HashSet<String>,
}

#[derive(Debug, Default)]
pub struct InMemoryRemoteCollection {
    state: Mutex<MemoryState>,
    latency: Option<Duration>,
}

impl InMemoryRemoteCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every write by `latency` before it completes.
    #[must_use]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Fail writes whose payload title equals `title`.
    pub fn fail_title(&self, title: &str) {
        self.lock().failing_titles.insert(title.to_string());
    }

    /// Fail updates and deletes addressed to `remote_id`.
    pub fn fail_remote_id(&self, remote_id: &RemoteId) {
        self.lock()
            .failing_ids
            .insert(remote_id.as_str().to_string());
    }

    pub fn clear_failures(&self) {
        let mut state = self.lock();
        state.failing_titles.clear();
        state.failing_ids.clear();
    }

    pub fn calls(&self) -> Vec<RemoteCall> {
        self.lock().calls.clone()
    }

    pub fn document(&self, remote_id: &RemoteId) -> Option<RemoteDocument> {
        self.lock()
            .documents
            .get(remote_id.as_str())
            .map(|(_, document)| document.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn simulate_latency(&self) {
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
    }
}

#[async_trait]
impl RemoteCollection for InMemoryRemoteCollection {
    async fn create(&self, document: &RemoteDocument, owner_id: &str) -> RemoteOutcome {
        self.simulate_latency().await;
        let mut state = self.lock();
        state.calls.push(RemoteCall::Create {
            title: document.title.clone(),
            owner_id: owner_id.to_string(),
        });
        if state.failing_titles.contains(&document.title) {
            return RemoteOutcome::failed(format!("create rejected for `{}`", document.title));
        }

        state.next_id += 1;
        let remote_id = format!("doc-{}", state.next_id);
        state
            .documents
            .insert(remote_id.clone(), (owner_id.to_string(), document.clone()));
        RemoteOutcome::Created {
            remote_id: RemoteId::new(remote_id),
        }
    }

    async fn update(&self, remote_id: &RemoteId, document: &RemoteDocument) -> RemoteOutcome {
        self.simulate_latency().await;
        let mut state = self.lock();
        state.calls.push(RemoteCall::Update {
            remote_id: remote_id.clone(),
        });
        if state.failing_ids.contains(remote_id.as_str())
            || state.failing_titles.contains(&document.title)
        {
            return RemoteOutcome::failed(format!("update rejected for {remote_id}"));
        }

        match state.documents.get_mut(remote_id.as_str()) {
            Some((_, stored)) => {
                *stored = document.clone();
                RemoteOutcome::Updated
            }
            None => RemoteOutcome::failed(format!("document {remote_id} not found")),
        }
    }

    async fn delete(&self, remote_id: &RemoteId) -> RemoteOutcome {
        self.simulate_latency().await;
        let mut state = self.lock();
        state.calls.push(RemoteCall::Delete {
            remote_id: remote_id.clone(),
        });
        if state.failing_ids.contains(remote_id.as_str()) {
            return RemoteOutcome::failed(format!("delete rejected for {remote_id}"));
        }

        match state.documents.remove(remote_id.as_str()) {
            Some(_) => RemoteOutcome::Deleted,
            None => RemoteOutcome::failed(format!("document {remote_id} not found")),
        }
    }

    async fn list(
        &self,
        filter: &RemoteListFilter,
        page: &PageRequest,
    ) -> RemoteResult<RemotePage> {
        if page.limit == 0 {
            return Err(RemoteError::InvalidPayload(
                "page limit must be positive".to_string(),
            ));
        }
        let state = self.lock();
        let mut matching = state
            .documents
            .iter()
            .filter(|(id, _)| {
                page.cursor
                    .as_deref()
                    .is_none_or(|cursor| id.as_str() > cursor)
            })
            .filter(|(_, (owner, document))| filter.matches(owner, document));

        let items: Vec<RemoteItem> = matching
            .by_ref()
            .take(page.limit)
            .map(|(id, (owner, document))| RemoteItem {
                id: RemoteId::new(id.clone()),
                uid: Some(owner.clone()),
                document: document.clone(),
            })
            .collect();
        let next_cursor = if matching.next().is_some() {
            items.last().map(|item| item.id.as_str().to_string())
        } else {
            None
        };

        Ok(RemotePage { items, next_cursor })
    }
}
