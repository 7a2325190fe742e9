use std::sync::Arc;

use clap::Parser;
use pretty_assertions::assert_eq;
use vault_core::auth::{Identity, StaticIdentity};
use vault_core::db::{Database, SqliteWorkRepository, WorkRepository};
use vault_core::models::{LocalId, Platform, RemoteId, SyncState, Work, WorkDetails, WorkStatus};
use vault_core::remote::{InMemoryRemoteCollection, RemoteCall};
use vault_core::store::{StoreSnapshot, WorkStore};
use vault_core::sync::{RecordFailure, SyncOperation, SyncReconciler, SyncReport};

use crate::cli::{Cli, CompletionShell, WorkFields};
use crate::commands::add::run_add;
use crate::commands::common::{
    details_from_fields, format_relative_time, format_sync_timestamp, format_work_lines,
    load_store, normalize_work_identifier, patch_from_fields, resolve_any_work, resolve_title,
    resolve_work, title_preview,
};
use crate::commands::completions::run_completions;
use crate::commands::config::{
    apply_profile_init, parse_interval, ProfileInit, MAX_INTERVAL_SECS,
};
use crate::commands::delete::run_delete;
use crate::commands::edit::run_edit;
use crate::commands::status::{format_status_lines, StatusReport};
use crate::commands::sync::{format_report_lines, sync_once};
use crate::config_profiles::CliProfilesConfig;
use crate::error::CliError;

fn work_with_id(id: &str, title: &str) -> Work {
    Work {
        local_id: LocalId::from(id),
        ..Work::new(WorkDetails::new(title))
    }
}

fn store_with(works: Vec<Work>) -> WorkStore {
    WorkStore::from_snapshot(StoreSnapshot {
        order: works.iter().map(|work| work.local_id.clone()).collect(),
        works,
        last_sync_at: None,
    })
}

fn reconciler(store: WorkStore, remote: Arc<InMemoryRemoteCollection>) -> SyncReconciler {
    SyncReconciler::new(
        Arc::new(store),
        Arc::new(StaticIdentity(Identity::new("user-1"))),
        remote,
    )
}

#[test]
fn format_relative_time_units() {
    let now = 10_000_000;
    assert_eq!(format_relative_time(now - 30_000, now), "just now");
    assert_eq!(format_relative_time(now - 120_000, now), "2m ago");
    assert_eq!(format_relative_time(now - 2 * 60 * 60_000, now), "2h ago");
}

#[test]
fn title_preview_truncates_with_ellipsis() {
    assert_eq!(title_preview("short  title", 20), "short title");
    assert_eq!(title_preview("abcdefghijklmnop", 10), "abcdefg...");
}

#[test]
fn format_sync_timestamp_returns_utc_label() {
    assert_eq!(format_sync_timestamp(0), "1970-01-01 00:00:00 UTC");
}

#[test]
fn normalize_work_identifier_rejects_empty() {
    assert!(matches!(
        normalize_work_identifier("   "),
        Err(CliError::EmptyWorkId)
    ));
    assert_eq!(normalize_work_identifier(" abc ").unwrap(), "abc");
}

#[test]
fn resolve_title_joins_parts_and_rejects_blank() {
    let parts = vec!["Summer".to_string(), "Pockets".to_string()];
    assert_eq!(resolve_title(&parts).unwrap(), "Summer Pockets");
    assert!(matches!(
        resolve_title(&[" ".to_string()]),
        Err(CliError::EmptyTitle)
    ));
}

#[test]
fn details_from_fields_parses_tags_and_urls() {
    let fields = WorkFields {
        platform: Some(Platform::DlSite),
        tags: Some("ASMR、百合, asmr".to_string()),
        product_url: Some("  ".to_string()),
        ..WorkFields::default()
    };
    let details = details_from_fields("Title".to_string(), fields);
    assert_eq!(details.platform, Some(Platform::DlSite));
    assert_eq!(details.tags, vec!["ASMR".to_string(), "百合".to_string()]);
    assert_eq!(details.product_url, None);
}

#[test]
fn patch_from_fields_clears_urls_with_empty_strings() {
    let fields = WorkFields {
        status: Some(WorkStatus::Finished),
        product_url: Some(String::new()),
        ..WorkFields::default()
    };
    let patch = patch_from_fields(None, fields).unwrap();
    assert_eq!(patch.status, Some(Some(WorkStatus::Finished)));
    assert_eq!(patch.product_url, Some(None));
    assert_eq!(patch.cover_image_url, None);

    assert!(patch_from_fields(None, WorkFields::default())
        .unwrap()
        .is_empty());
    assert!(matches!(
        patch_from_fields(Some(" ".to_string()), WorkFields::default()),
        Err(CliError::EmptyTitle)
    ));
}

#[test]
fn resolve_work_supports_exact_prefix_and_remote_id() {
    let mut synced = work_with_id("0190-bbbb", "Second");
    synced.remote_id = Some(RemoteId::new("doc-7"));
    let store = store_with(vec![work_with_id("0190-aaaa", "First"), synced]);

    assert_eq!(
        resolve_work(&store, "0190-aaaa").unwrap().details.title,
        "First"
    );
    assert_eq!(
        resolve_work(&store, "0190-b").unwrap().details.title,
        "Second"
    );
    assert_eq!(resolve_work(&store, "doc-7").unwrap().details.title, "Second");
}

#[test]
fn resolve_work_rejects_ambiguous_and_missing() {
    let store = store_with(vec![
        work_with_id("0190-aaaa", "First"),
        work_with_id("0190-bbbb", "Second"),
    ]);

    assert!(matches!(
        resolve_work(&store, "0190"),
        Err(CliError::AmbiguousWorkId(_))
    ));
    assert!(matches!(
        resolve_work(&store, "ffff"),
        Err(CliError::WorkNotFound(_))
    ));

    store.mark_delete_local("0190-aaaa");
    assert!(matches!(
        resolve_work(&store, "0190-aaaa"),
        Err(CliError::WorkNotFound(_))
    ));
}

#[test]
fn format_work_lines_marks_pending_works() {
    let mut clean = work_with_id("0190-clean-work", "Clean");
    clean.dirty = false;
    clean.sync_state = SyncState::Synced;
    let lines = format_work_lines(&[work_with_id("0190-dirty-work", "Dirty"), clean]);
    assert!(lines[0].starts_with("*0190-dirty-wo"));
    assert!(lines[1].starts_with(" 0190-clean-wo"));
}

#[test]
fn parse_interval_accepts_seconds_and_off() {
    assert_eq!(
        parse_interval("300").unwrap(),
        Some(std::time::Duration::from_secs(300))
    );
    assert_eq!(parse_interval("off").unwrap(), None);
    assert_eq!(parse_interval("0").unwrap(), None);
    assert!(parse_interval("soon").is_err());
}

#[test]
fn interval_bounds_reject_overflowing_values() {
    let max = MAX_INTERVAL_SECS.to_string();
    assert_eq!(
        parse_interval(&max).unwrap(),
        Some(std::time::Duration::from_secs(MAX_INTERVAL_SECS))
    );
    assert!(parse_interval(&(MAX_INTERVAL_SECS + 1).to_string()).is_err());
    assert!(parse_interval(&u64::MAX.to_string()).is_err());

    let huge = u64::MAX.to_string();
    for rejected in [huge.as_str(), "0"] {
        let parsed = Cli::try_parse_from(["vault", "watch", "--interval-secs", rejected]);
        assert!(parsed.is_err(), "accepted --interval-secs {rejected}");
    }
    assert!(Cli::try_parse_from(["vault", "watch", "--interval-secs", max.as_str()]).is_ok());
}

#[test]
fn apply_profile_init_merges_with_existing_profile() {
    let mut config = CliProfilesConfig::default();
    apply_profile_init(
        &mut config,
        "home",
        ProfileInit {
            profile: None,
            api_base_url: Some("https://api.example.com".to_string()),
            collection: Some("catalog".to_string()),
            firebase_api_key: Some("key-1".to_string()),
            identity_toolkit_url: None,
            secure_token_url: None,
            no_activate: false,
        },
    )
    .unwrap();
    apply_profile_init(
        &mut config,
        "home",
        ProfileInit {
            profile: None,
            api_base_url: None,
            collection: None,
            firebase_api_key: Some("key-2".to_string()),
            identity_toolkit_url: None,
            secure_token_url: None,
            no_activate: true,
        },
    )
    .unwrap();

    let profile = config.profile("home").unwrap();
    assert_eq!(profile.collection(), "catalog");
    assert_eq!(profile.firebase_api_key.as_deref(), Some("key-2"));
    assert!(profile.api_base_url().is_some());
    assert_eq!(config.active_profile.as_deref(), Some("home"));
}

#[test]
fn apply_profile_init_rejects_non_http_urls() {
    let mut config = CliProfilesConfig::default();
    let result = apply_profile_init(
        &mut config,
        "home",
        ProfileInit {
            profile: None,
            api_base_url: Some("api.example.com".to_string()),
            collection: None,
            firebase_api_key: None,
            identity_toolkit_url: None,
            secure_token_url: None,
            no_activate: false,
        },
    );
    assert!(matches!(result, Err(CliError::Config(_))));
    assert!(config.profile("home").is_none());
}

#[test]
fn format_report_lines_lists_failures() {
    let report = SyncReport {
        attempted: 3,
        created: 1,
        updated: 1,
        failures: vec![RecordFailure {
            local_id: LocalId::from("0190-failing-work"),
            operation: SyncOperation::Update,
            reason: "Remote API error: boom".to_string(),
        }],
        ..SyncReport::default()
    };
    let lines = format_report_lines(&report);
    assert_eq!(lines[0], "Synced 2/3 (1 created, 1 updated, 0 deleted)");
    assert_eq!(lines[1], "failed update 0190-failing-: Remote API error: boom");
    assert_eq!(
        format_report_lines(&SyncReport::default()),
        vec!["Nothing to sync".to_string()]
    );
}

#[test]
fn format_status_lines_reports_never_synced() {
    let report = StatusReport {
        counts: vault_core::store::SyncCounts {
            listed: 2,
            dirty: 1,
            errored: 0,
            tombstones: 0,
        },
        last_sync_at: None,
        auto_sync_interval_ms: Some(60_000),
    };
    let lines = format_status_lines(&report);
    assert!(lines.contains(&"last sync:     never".to_string()));
    assert!(lines.contains(&"auto-sync:     every 60s".to_string()));
}

#[tokio::test(flavor = "current_thread")]
async fn sync_once_pushes_and_persists_store() {
    let db = Database::open_in_memory().unwrap();
    let store = WorkStore::new();
    let kept = store.add_local(WorkDetails::new("Kept"));
    let dropped = store.add_local(WorkDetails::new("Dropped"));
    store.mark_delete_local(dropped.as_str());
    let remote = Arc::new(InMemoryRemoteCollection::new());
    let reconciler = reconciler(store, remote.clone());

    let report = sync_once(&db, &reconciler, false).await.unwrap();
    assert_eq!(report.created, 1);
    assert_eq!(report.local_tombstones, 1);
    assert_eq!(
        remote.calls(),
        vec![RemoteCall::Create {
            title: "Kept".to_string(),
            owner_id: "user-1".to_string(),
        }]
    );

    let reloaded = load_store(&db).unwrap();
    let work = reloaded.get(&kept).unwrap();
    assert!(!work.dirty);
    assert_eq!(work.sync_state, SyncState::Synced);
    assert!(work.remote_id.is_some());
    assert!(reloaded.get(&dropped).is_none());
    assert!(reloaded.last_sync_at().is_some());
}

#[tokio::test(flavor = "current_thread")]
async fn sync_once_keeps_tombstones_when_asked() {
    let db = Database::open_in_memory().unwrap();
    let store = WorkStore::new();
    let dropped = store.add_local(WorkDetails::new("Dropped"));
    store.mark_delete_local(dropped.as_str());
    let reconciler = reconciler(store, Arc::new(InMemoryRemoteCollection::new()));

    sync_once(&db, &reconciler, true).await.unwrap();

    let snapshot = SqliteWorkRepository::new(db.connection())
        .load_snapshot()
        .unwrap();
    let tombstone = snapshot
        .works
        .iter()
        .find(|work| work.local_id == dropped)
        .unwrap();
    assert!(tombstone.deleted);
    assert!(!tombstone.dirty);
}

#[tokio::test(flavor = "current_thread")]
async fn sync_once_persists_failed_records_as_errored() {
    let db = Database::open_in_memory().unwrap();
    let store = WorkStore::new();
    let failing = store.add_local(WorkDetails::new("Broken"));
    let remote = Arc::new(InMemoryRemoteCollection::new());
    remote.fail_title("Broken");
    let reconciler = reconciler(store, remote);

    let report = sync_once(&db, &reconciler, false).await.unwrap();
    assert_eq!(report.failures.len(), 1);

    let reloaded = load_store(&db).unwrap();
    let work = reloaded.get(&failing).unwrap();
    assert!(work.dirty);
    assert_eq!(work.sync_state, SyncState::Error);
    assert_eq!(reloaded.counts().errored, 1);
}

#[test]
fn add_edit_delete_roundtrip_through_database_file() {
    let tmp = tempfile::tempdir().unwrap();
    let db_path = tmp.path().join("nested").join("vault.db");

    run_add(
        &["My".to_string(), "Work".to_string()],
        WorkFields {
            rating: Some(4),
            ..WorkFields::default()
        },
        &db_path,
    )
    .unwrap();

    let store = load_store(&Database::open(&db_path).unwrap()).unwrap();
    let work = store.list().remove(0);
    assert_eq!(work.details.title, "My Work");
    assert_eq!(work.details.rating, Some(4));

    let prefix = &work.local_id.as_str()[..18];
    run_edit(
        prefix,
        Some("Renamed".to_string()),
        WorkFields::default(),
        &db_path,
    )
    .unwrap();
    let store = load_store(&Database::open(&db_path).unwrap()).unwrap();
    assert_eq!(store.get(&work.local_id).unwrap().details.title, "Renamed");

    run_delete(work.local_id.as_str(), &db_path).unwrap();
    let store = load_store(&Database::open(&db_path).unwrap()).unwrap();
    assert!(store.list().is_empty());
    assert!(store.get(&work.local_id).unwrap().deleted);
}

#[test]
fn run_edit_requires_a_change() {
    let tmp = tempfile::tempdir().unwrap();
    let result = run_edit(
        "anything",
        None,
        WorkFields::default(),
        &tmp.path().join("vault.db"),
    );
    assert!(matches!(result, Err(CliError::NothingToEdit)));
}

#[test]
fn run_completions_writes_bash_script_file() {
    let tmp = tempfile::tempdir().unwrap();
    let output_path = tmp.path().join("vault.bash");

    run_completions(CompletionShell::Bash, Some(&output_path)).unwrap();

    let script = std::fs::read_to_string(&output_path).unwrap();
    assert!(script.contains("vault"));
    assert!(script.contains("sync"));
}

#[test]
fn run_delete_unknown_id_queues_remote_tombstone() {
    let tmp = tempfile::tempdir().unwrap();
    let db_path = tmp.path().join("vault.db");

    run_delete("remote-doc-42", &db_path).unwrap();

    let store = load_store(&Database::open(&db_path).unwrap()).unwrap();
    let tombstone = store.get(&LocalId::from("remote-doc-42")).unwrap();
    assert!(tombstone.deleted && tombstone.dirty);
    assert_eq!(tombstone.remote_id, Some(RemoteId::new("remote-doc-42")));
    assert!(store.list().is_empty());
}

#[test]
fn resolve_any_work_finds_tombstones() {
    let store = store_with(vec![work_with_id("0190-aaaa", "First")]);
    store.mark_delete_local("0190-aaaa");

    let work = resolve_any_work(&store, "0190-a").unwrap().unwrap();
    assert!(work.deleted);
    assert_eq!(resolve_any_work(&store, "ffff").unwrap(), None);
}
