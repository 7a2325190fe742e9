use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::sync::oneshot;

use super::{RecordFailure, SyncError, SyncOperation, SyncReport, SyncResult, SyncRunner};
use crate::auth::{Identity, IdentityProvider};
use crate::models::{RemoteId, Work};
use crate::remote::{RemoteCollection, RemoteDocument, RemoteOutcome};
use crate::store::WorkStore;
use crate::util::unix_millis_now;

type Waiters = Vec<oneshot::Sender<SyncResult<SyncReport>>>;

/// Pushes dirty records from a [`WorkStore`] to a [`RemoteCollection`].
///
/// At most one pass runs at a time. Callers arriving while a pass is in
/// flight wait for it and receive the same result.
pub struct SyncReconciler {
    store: Arc<WorkStore>,
    identity: Arc<dyn IdentityProvider>,
    remote: Arc<dyn RemoteCollection>,
    in_flight: Mutex<Option<Waiters>>,
}

impl SyncReconciler {
    pub fn new(
        store: Arc<WorkStore>,
        identity: Arc<dyn IdentityProvider>,
        remote: Arc<dyn RemoteCollection>,
    ) -> Self {
        Self {
            store,
            identity,
            remote,
            in_flight: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &Arc<WorkStore> {
        &self.store
    }

    /// Run one reconciliation pass, or join the one already running.
    pub async fn sync_now(&self) -> SyncResult<SyncReport> {
        let joined = {
            let mut in_flight = lock(&self.in_flight);
            if let Some(waiters) = in_flight.as_mut() {
                let (sender, receiver) = oneshot::channel();
                waiters.push(sender);
                Some(receiver)
            } else {
                *in_flight = Some(Vec::new());
                None
            }
        };

        if let Some(receiver) = joined {
            tracing::debug!("Joining sync pass already in flight");
            return receiver.await.unwrap_or(Err(SyncError::Interrupted));
        }

        let pass = InFlightPass {
            slot: &self.in_flight,
            finished: false,
        };
        let result = self.run_pass().await;
        pass.finish(&result);
        result
    }

    async fn run_pass(&self) -> SyncResult<SyncReport> {
        let dirty = self.store.dirty_records();
        if dirty.is_empty() {
            tracing::debug!("Nothing to sync");
            return Ok(SyncReport::default());
        }

        let identity = self.identity.ensure_signed_in().await.map_err(|error| {
            tracing::warn!("Sync aborted, sign-in failed: {}", error);
            SyncError::Auth(error.to_string())
        })?;

        let mut report = SyncReport {
            attempted: dirty.len(),
            ..SyncReport::default()
        };
        for work in &dirty {
            self.reconcile(work, &identity, &mut report).await;
        }

        let finished_at = unix_millis_now();
        self.store.set_last_sync_at(finished_at);
        report.finished_at = Some(finished_at);

        tracing::info!(
            "Sync finished: {} created, {} updated, {} deleted, {} failed",
            report.created,
            report.updated,
            report.deleted + report.local_tombstones,
            report.failures.len()
        );
        Ok(report)
    }

    async fn reconcile(&self, work: &Work, identity: &Identity, report: &mut SyncReport) {
        if work.is_local_only_tombstone() {
            tracing::debug!("Settling local-only tombstone {}", work.local_id);
            report.local_tombstones += 1;
            self.confirm(work, None, report);
            return;
        }

        let (operation, outcome) = match (&work.remote_id, work.deleted) {
            (Some(remote_id), true) => (SyncOperation::Delete, self.remote.delete(remote_id).await),
            (Some(remote_id), false) => (
                SyncOperation::Update,
                self.remote
                    .update(remote_id, &RemoteDocument::from_work(work))
                    .await,
            ),
            (None, _) => (
                SyncOperation::Create,
                self.remote
                    .create(&RemoteDocument::from_work(work), &identity.id)
                    .await,
            ),
        };

        match (operation, outcome) {
            (SyncOperation::Create, RemoteOutcome::Created { remote_id }) => {
                tracing::debug!("Created {} as {}", work.local_id, remote_id);
                report.created += 1;
                self.confirm(work, Some(remote_id), report);
            }
            (SyncOperation::Update, RemoteOutcome::Updated) => {
                report.updated += 1;
                self.confirm(work, None, report);
            }
            (SyncOperation::Delete, RemoteOutcome::Deleted) => {
                report.deleted += 1;
                self.confirm(work, None, report);
            }
            (operation, RemoteOutcome::Failed { reason }) => {
                self.fail(work, operation, reason, report);
            }
            (operation, outcome) => {
                let reason = format!("unexpected outcome {outcome:?}");
                self.fail(work, operation, reason, report);
            }
        }
    }

    fn confirm(&self, work: &Work, remote_id: Option<RemoteId>, report: &mut SyncReport) {
        if self.store.get(&work.local_id).is_none() {
            tracing::debug!("Record {} vanished during sync", work.local_id);
            return;
        }
        if !self
            .store
            .mark_synced(&work.local_id, work.revision, remote_id)
        {
            tracing::debug!("Record {} changed mid-sync, keeping it dirty", work.local_id);
            report.superseded += 1;
        }
    }

    fn fail(&self, work: &Work, operation: SyncOperation, reason: String, report: &mut SyncReport) {
        tracing::warn!(
            "Failed to {} {}: {}",
            operation.as_str(),
            work.local_id,
            reason
        );
        self.store.mark_sync_failed(&work.local_id);
        report.failures.push(RecordFailure {
            local_id: work.local_id.clone(),
            operation,
            reason,
        });
    }
}

#[async_trait]
impl SyncRunner for SyncReconciler {
    async fn run_sync(&self) -> SyncResult<SyncReport> {
        self.sync_now().await
    }
}

/// Owns the in-flight slot for the leading caller. Dropping it before
/// `finish` releases joined callers with [`SyncError::Interrupted`].
struct InFlightPass<'a> {
    slot: &'a Mutex<Option<Waiters>>,
    finished: bool,
}

impl InFlightPass<'_> {
    fn finish(mut self, result: &SyncResult<SyncReport>) {
        self.finished = true;
        let waiters = lock(self.slot).take().unwrap_or_default();
        for waiter in waiters {
            let _ = waiter.send(result.clone());
        }
    }
}

impl Drop for InFlightPass<'_> {
    fn drop(&mut self) {
        if !self.finished {
            lock(self.slot).take();
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::auth::{AuthError, AuthResult, StaticIdentity};
    use crate::models::{SyncState, WorkDetails, WorkPatch};
    use crate::remote::{InMemoryRemoteCollection, RemoteCall};

    struct RejectingIdentity;

    #[async_trait]
    impl IdentityProvider for RejectingIdentity {
        async fn ensure_signed_in(&self) -> AuthResult<Identity> {
            Err(AuthError::Api("network unreachable".to_string()))
        }
    }

    fn setup(
        remote: InMemoryRemoteCollection,
    ) -> (Arc<WorkStore>, Arc<InMemoryRemoteCollection>, SyncReconciler) {
        let store = Arc::new(WorkStore::new());
        let remote = Arc::new(remote);
        let reconciler = SyncReconciler::new(
            store.clone(),
            Arc::new(StaticIdentity(Identity::new("u1"))),
            remote.clone(),
        );
        (store, remote, reconciler)
    }

    fn create_count(remote: &InMemoryRemoteCollection) -> usize {
        remote
            .calls()
            .iter()
            .filter(|call| matches!(call, RemoteCall::Create { .. }))
            .count()
    }

    #[tokio::test]
    async fn clean_store_makes_no_remote_calls() {
        let (store, remote, reconciler) = setup(InMemoryRemoteCollection::new());

        let report = reconciler.sync_now().await.unwrap();

        assert_eq!(report, SyncReport::default());
        assert!(remote.calls().is_empty());
        assert_eq!(store.last_sync_at(), None);
    }

    #[tokio::test]
    async fn dirty_record_is_created_and_bound() {
        let (store, remote, reconciler) = setup(InMemoryRemoteCollection::new());
        let id = store.add_local(WorkDetails::new("A"));

        let report = reconciler.sync_now().await.unwrap();

        assert_eq!(report.created, 1);
        let work = store.get(&id).unwrap();
        assert!(!work.dirty);
        assert_eq!(work.sync_state, SyncState::Synced);
        let remote_id = work.remote_id.unwrap();
        assert_eq!(remote.document(&remote_id).unwrap().title, "A");
        assert_eq!(
            remote.calls(),
            vec![RemoteCall::Create {
                title: "A".to_string(),
                owner_id: "u1".to_string(),
            }]
        );
        assert_eq!(store.last_sync_at(), report.finished_at);

        reconciler.sync_now().await.unwrap();
        assert_eq!(remote.calls().len(), 1);
    }

    #[tokio::test]
    async fn one_failure_does_not_block_other_records() {
        let (store, remote, reconciler) = setup(InMemoryRemoteCollection::new());
        let first = store.add_local(WorkDetails::new("one"));
        let second = store.add_local(WorkDetails::new("two"));
        let third = store.add_local(WorkDetails::new("three"));
        remote.fail_title("two");

        let report = reconciler.sync_now().await.unwrap();

        assert_eq!(report.created, 2);
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].local_id, second);
        assert_eq!(report.failures[0].operation, SyncOperation::Create);
        for id in [&first, &third] {
            let work = store.get(id).unwrap();
            assert_eq!(work.sync_state, SyncState::Synced);
            assert!(!work.dirty);
        }
        let failed = store.get(&second).unwrap();
        assert_eq!(failed.sync_state, SyncState::Error);
        assert!(failed.dirty);
        assert!(failed.remote_id.is_none());
        assert!(store.last_sync_at().is_some());

        remote.clear_failures();
        let retry = reconciler.sync_now().await.unwrap();
        assert_eq!(retry.created, 1);
        assert!(!store.get(&second).unwrap().dirty);
    }

    #[tokio::test]
    async fn edit_after_create_issues_update() {
        let (store, remote, reconciler) = setup(InMemoryRemoteCollection::new());
        let id = store.add_local(WorkDetails::new("A"));
        reconciler.sync_now().await.unwrap();
        let remote_id = store.get(&id).unwrap().remote_id.unwrap();

        store.update_local(
            &id,
            WorkPatch {
                title: Some("A2".to_string()),
                ..WorkPatch::default()
            },
        );
        let report = reconciler.sync_now().await.unwrap();

        assert_eq!(report.updated, 1);
        assert_eq!(remote.document(&remote_id).unwrap().title, "A2");
        assert_eq!(store.get(&id).unwrap().remote_id, Some(remote_id));
    }

    #[tokio::test]
    async fn tombstone_before_first_sync_skips_remote() {
        let (store, remote, reconciler) = setup(InMemoryRemoteCollection::new());
        let id = store.add_local(WorkDetails::new("A"));
        store.mark_delete_local(id.as_str());

        let report = reconciler.sync_now().await.unwrap();

        assert_eq!(report.local_tombstones, 1);
        assert!(remote.calls().is_empty());
        let work = store.get(&id).unwrap();
        assert!(work.deleted && !work.dirty);
        assert_eq!(work.sync_state, SyncState::Synced);
    }

    #[tokio::test]
    async fn synced_tombstone_issues_remote_delete() {
        let (store, remote, reconciler) = setup(InMemoryRemoteCollection::new());
        let id = store.add_local(WorkDetails::new("A"));
        reconciler.sync_now().await.unwrap();
        let remote_id = store.get(&id).unwrap().remote_id.unwrap();

        store.mark_delete_local(id.as_str());
        let report = reconciler.sync_now().await.unwrap();

        assert_eq!(report.deleted, 1);
        assert!(remote.document(&remote_id).is_none());
        assert_eq!(store.purge_synced_tombstones(), 1);
        assert!(store.get(&id).is_none());
    }

    #[tokio::test]
    async fn repeated_delete_of_confirmed_tombstone_stays_settled() {
        let (store, remote, reconciler) = setup(InMemoryRemoteCollection::new());
        let id = store.add_local(WorkDetails::new("A"));
        reconciler.sync_now().await.unwrap();
        store.mark_delete_local(id.as_str());
        reconciler.sync_now().await.unwrap();
        let calls_after_delete = remote.calls().len();

        store.mark_delete_local(id.as_str());
        assert!(!store.update_local(
            &id,
            WorkPatch {
                title: Some("B".to_string()),
                ..WorkPatch::default()
            },
        ));
        let report = reconciler.sync_now().await.unwrap();

        assert_eq!(report.deleted, 0);
        assert!(report.is_clean());
        assert_eq!(remote.calls().len(), calls_after_delete);
        let work = store.get(&id).unwrap();
        assert!(work.deleted && !work.dirty);
        assert_eq!(work.sync_state, SyncState::Synced);
    }

    #[tokio::test]
    async fn failed_remote_delete_keeps_tombstone_for_retry() {
        let (store, remote, reconciler) = setup(InMemoryRemoteCollection::new());
        let id = store.add_local(WorkDetails::new("A"));
        reconciler.sync_now().await.unwrap();
        let remote_id = store.get(&id).unwrap().remote_id.unwrap();
        remote.fail_remote_id(&remote_id);

        store.mark_delete_local(id.as_str());
        let report = reconciler.sync_now().await.unwrap();

        assert!(!report.is_clean());
        assert_eq!(report.failures[0].operation, SyncOperation::Delete);
        let work = store.get(&id).unwrap();
        assert!(work.deleted && work.dirty);
        assert_eq!(work.sync_state, SyncState::Error);
        assert_eq!(store.purge_synced_tombstones(), 0);
        assert!(remote.document(&remote_id).is_some());

        remote.clear_failures();
        let report = reconciler.sync_now().await.unwrap();
        assert_eq!(report.deleted, 1);
        assert!(remote.document(&remote_id).is_none());
        assert_eq!(store.purge_synced_tombstones(), 1);
    }

    #[tokio::test]
    async fn remote_only_tombstone_reaches_remote() {
        let (store, remote, reconciler) = setup(InMemoryRemoteCollection::new());
        let RemoteOutcome::Created { remote_id } = remote
            .create(&RemoteDocument::default(), "u1")
            .await
        else {
            panic!("expected Created");
        };

        store.mark_delete_local(remote_id.as_str());
        let report = reconciler.sync_now().await.unwrap();

        assert_eq!(report.deleted, 1);
        assert!(remote.is_empty());
    }

    #[tokio::test]
    async fn auth_failure_leaves_records_untouched() {
        let store = Arc::new(WorkStore::new());
        let remote = Arc::new(InMemoryRemoteCollection::new());
        let reconciler =
            SyncReconciler::new(store.clone(), Arc::new(RejectingIdentity), remote.clone());
        let id = store.add_local(WorkDetails::new("A"));
        let before = store.get(&id).unwrap();

        let result = reconciler.sync_now().await;

        assert!(matches!(result, Err(SyncError::Auth(_))));
        assert_eq!(store.get(&id).unwrap(), before);
        assert_eq!(store.last_sync_at(), None);
        assert!(remote.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn edit_during_inflight_create_stays_dirty() {
        let (store, remote, reconciler) =
            setup(InMemoryRemoteCollection::new().with_latency(Duration::from_millis(50)));
        let id = store.add_local(WorkDetails::new("A"));

        let (report, ()) = tokio::join!(reconciler.sync_now(), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            store.update_local(
                &id,
                WorkPatch {
                    title: Some("A2".to_string()),
                    ..WorkPatch::default()
                },
            );
        });
        let report = report.unwrap();

        assert_eq!(report.created, 1);
        assert_eq!(report.superseded, 1);
        let work = store.get(&id).unwrap();
        assert!(work.dirty);
        assert_eq!(work.details.title, "A2");
        let remote_id = work.remote_id.clone().unwrap();

        let next = reconciler.sync_now().await.unwrap();
        assert_eq!(next.updated, 1);
        assert_eq!(create_count(&remote), 1);
        assert_eq!(remote.document(&remote_id).unwrap().title, "A2");
        assert!(!store.get(&id).unwrap().dirty);
    }

    #[tokio::test(start_paused = true)]
    async fn overlapping_calls_share_one_pass() {
        let (store, remote, reconciler) =
            setup(InMemoryRemoteCollection::new().with_latency(Duration::from_millis(20)));
        store.add_local(WorkDetails::new("A"));
        store.add_local(WorkDetails::new("B"));

        let (first, second) = tokio::join!(reconciler.sync_now(), reconciler.sync_now());

        let first = first.unwrap();
        assert_eq!(first.created, 2);
        assert_eq!(second.unwrap(), first);
        assert_eq!(create_count(&remote), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn dropped_pass_interrupts_joined_callers() {
        let (store, _remote, reconciler) =
            setup(InMemoryRemoteCollection::new().with_latency(Duration::from_millis(100)));
        store.add_local(WorkDetails::new("A"));
        let reconciler = Arc::new(reconciler);

        let lead = tokio::spawn({
            let reconciler = reconciler.clone();
            async move { reconciler.sync_now().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        let joined = tokio::spawn({
            let reconciler = reconciler.clone();
            async move { reconciler.sync_now().await }
        });
        tokio::time::sleep(Duration::from_millis(10)).await;
        lead.abort();

        assert_eq!(joined.await.unwrap(), Err(SyncError::Interrupted));

        let report = reconciler.sync_now().await.unwrap();
        assert_eq!(report.created, 1);
    }
}
