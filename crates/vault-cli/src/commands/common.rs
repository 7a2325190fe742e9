use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use vault_core::db::{Database, SqliteWorkRepository, WorkRepository};
use vault_core::models::{parse_tags, LocalId, SyncState, Work, WorkDetails, WorkPatch};
use vault_core::remote::HttpRemoteCollection;
use vault_core::store::{IdLookup, WorkStore};
use vault_core::util::normalize_text_option;

use crate::auth::IdentityService;
use crate::cli::WorkFields;
use crate::config_profiles::CliProfilesConfig;
use crate::error::CliError;

const SHORT_ID_LEN: usize = 13;

#[derive(Debug, Serialize)]
pub struct WorkListItem {
    pub id: String,
    pub remote_id: Option<String>,
    pub title: String,
    pub platform: Option<String>,
    pub status: Option<String>,
    pub tags: Vec<String>,
    pub rating: Option<u8>,
    pub product_url: Option<String>,
    pub cover_image_url: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub relative_time: String,
    pub sync_state: String,
    pub dirty: bool,
    pub deleted: bool,
}

/// Remote collection and identity for the resolved profile
pub struct RemoteContext {
    pub profile_name: String,
    pub identity: Arc<IdentityService>,
    pub remote: Arc<HttpRemoteCollection>,
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_db_path.or_else(|| env::var_os("VAULT_DB_PATH").map(PathBuf::from)) {
        return Ok(path);
    }
    default_db_path()
}

pub fn default_db_path() -> Result<PathBuf, CliError> {
    dirs::data_dir()
        .map(|dir| dir.join("vault").join("vault.db"))
        .ok_or_else(|| CliError::Config("Failed to resolve CLI data directory".to_string()))
}

pub fn open_database(path: &Path) -> Result<Database, CliError> {
    Ok(Database::open(path)?)
}

pub fn load_store(db: &Database) -> Result<WorkStore, CliError> {
    let snapshot = SqliteWorkRepository::new(db.connection()).load_snapshot()?;
    Ok(WorkStore::from_snapshot(snapshot))
}

pub fn save_store(db: &Database, store: &WorkStore) -> Result<(), CliError> {
    SqliteWorkRepository::new(db.connection()).save_snapshot(&store.snapshot())?;
    Ok(())
}

pub fn normalize_work_identifier(id: &str) -> Result<String, CliError> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        Err(CliError::EmptyWorkId)
    } else {
        Ok(trimmed.to_string())
    }
}

/// Resolve a local id, remote id, or unique prefix to a listed work
pub fn resolve_work(store: &WorkStore, query: &str) -> Result<Work, CliError> {
    resolve_any_work(store, query)?
        .filter(|work| !work.deleted)
        .ok_or_else(|| CliError::WorkNotFound(query.to_string()))
}

/// Like [`resolve_work`], but tombstones resolve too
pub fn resolve_any_work(store: &WorkStore, query: &str) -> Result<Option<Work>, CliError> {
    match store.resolve_id(query) {
        IdLookup::Found(id) => Ok(store.get(&id)),
        IdLookup::NotFound => Ok(None),
        IdLookup::Ambiguous(ids) => Err(ambiguous_id_error(query, &ids)),
    }
}

pub fn ambiguous_id_error(query: &str, ids: &[LocalId]) -> CliError {
    let options = ids
        .iter()
        .take(3)
        .map(|id| short_id(id.as_str()))
        .collect::<Vec<_>>()
        .join(", ");
    CliError::AmbiguousWorkId(format!(
        "ID prefix '{query}' is ambiguous; matches: {options}"
    ))
}

pub fn resolve_title(title_parts: &[String]) -> Result<String, CliError> {
    normalize_text_option(Some(title_parts.join(" "))).ok_or(CliError::EmptyTitle)
}

pub fn details_from_fields(title: String, fields: WorkFields) -> WorkDetails {
    WorkDetails {
        title,
        platform: fields.platform,
        status: fields.status,
        tags: fields.tags.as_deref().map(parse_tags).unwrap_or_default(),
        rating: fields.rating,
        cover_image_url: normalize_text_option(fields.cover_url),
        cover_source_url: None,
        product_url: normalize_text_option(fields.product_url),
    }
}

/// Build an edit patch; empty URL strings clear the field
pub fn patch_from_fields(title: Option<String>, fields: WorkFields) -> Result<WorkPatch, CliError> {
    let title = match title {
        Some(title) => Some(normalize_text_option(Some(title)).ok_or(CliError::EmptyTitle)?),
        None => None,
    };
    Ok(WorkPatch {
        title,
        platform: fields.platform.map(Some),
        status: fields.status.map(Some),
        tags: fields.tags.as_deref().map(parse_tags),
        rating: fields.rating.map(Some),
        cover_image_url: fields.cover_url.map(|url| normalize_text_option(Some(url))),
        cover_source_url: None,
        product_url: fields.product_url.map(|url| normalize_text_option(Some(url))),
    })
}

pub fn short_id(id: &str) -> String {
    id.chars().take(SHORT_ID_LEN).collect()
}

pub fn work_to_list_item(work: &Work) -> WorkListItem {
    let now_ms = Utc::now().timestamp_millis();
    let details = &work.details;
    WorkListItem {
        id: work.local_id.to_string(),
        remote_id: work.remote_id.as_ref().map(ToString::to_string),
        title: details.title.clone(),
        platform: details.platform.map(|platform| platform.as_str().to_string()),
        status: details.status.map(|status| status.as_str().to_string()),
        tags: details.tags.clone(),
        rating: details.rating,
        product_url: details.product_url.clone(),
        cover_image_url: details.cover_image_url.clone(),
        created_at: work.created_at,
        updated_at: work.updated_at,
        relative_time: format_relative_time(work.updated_at, now_ms),
        sync_state: work.sync_state.as_str().to_string(),
        dirty: work.dirty,
        deleted: work.deleted,
    }
}

pub fn title_preview(title: &str, max_chars: usize) -> String {
    let collapsed = title.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn render_tags(tags: &[String]) -> String {
    tags.iter()
        .map(|tag| format!("#{tag}"))
        .collect::<Vec<String>>()
        .join(" ")
}

pub fn sync_marker(work: &Work) -> &'static str {
    if work.dirty {
        match work.sync_state {
            SyncState::Error => "!",
            _ => "*",
        }
    } else {
        " "
    }
}

pub fn format_work_lines(works: &[Work]) -> Vec<String> {
    let now_ms = Utc::now().timestamp_millis();
    works
        .iter()
        .map(|work| {
            let short_id = short_id(work.local_id.as_str());
            let marker = sync_marker(work);
            let title = title_preview(&work.details.title, 40);
            let status = work.details.status.map_or("-", |status| status.as_str());
            let relative_time = format_relative_time(work.updated_at, now_ms);
            let tags = render_tags(&work.details.tags);

            if tags.is_empty() {
                format!("{marker}{short_id:<13}  {title:<40}  {status:<8}  {relative_time}")
            } else {
                format!(
                    "{marker}{short_id:<13}  {title:<40}  {status:<8}  {relative_time:<10}  {tags}"
                )
            }
        })
        .collect()
}

pub fn format_work_detail(work: &Work) -> Vec<String> {
    let details = &work.details;
    let mut lines = vec![
        format!("id:          {}", work.local_id),
        format!("title:       {}", details.title),
    ];
    if let Some(remote_id) = work.remote_id.as_ref() {
        lines.push(format!("remote id:   {remote_id}"));
    }
    if let Some(platform) = details.platform {
        lines.push(format!("platform:    {platform}"));
    }
    if let Some(status) = details.status {
        lines.push(format!("status:      {status}"));
    }
    if !details.tags.is_empty() {
        lines.push(format!("tags:        {}", render_tags(&details.tags)));
    }
    if let Some(rating) = details.rating {
        lines.push(format!("rating:      {rating}/{}", vault_core::models::MAX_RATING));
    }
    if let Some(url) = details.product_url.as_deref() {
        lines.push(format!("product url: {url}"));
    }
    if let Some(url) = details.cover_image_url.as_deref() {
        lines.push(format!("cover url:   {url}"));
    }
    lines.push(format!(
        "updated:     {}",
        format_sync_timestamp(work.updated_at)
    ));
    lines.push(format!(
        "sync:        {}{}",
        work.sync_state.as_str(),
        if work.dirty { " (pending changes)" } else { "" }
    ));
    if work.deleted {
        lines.push("deleted:     yes".to_string());
    }
    lines
}

pub fn format_sync_timestamp(timestamp_ms: i64) -> String {
    chrono::DateTime::from_timestamp_millis(timestamp_ms).map_or_else(
        || timestamp_ms.to_string(),
        |date_time| date_time.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;
    let month = 30 * day;
    let year = 365 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else if diff < month {
        format!("{}w ago", diff / week)
    } else if diff < year {
        format!("{}mo ago", diff / month)
    } else {
        format!("{}y ago", diff / year)
    }
}

/// Build the HTTP remote and identity for the resolved profile
pub fn connect_remote(global_profile: Option<&str>) -> Result<RemoteContext, CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(global_profile);
    let profile = config
        .profile(&profile_name)
        .ok_or(CliError::SyncNotConfigured)?;
    if !profile.missing_sync_fields().is_empty() {
        return Err(CliError::SyncNotConfigured);
    }
    let base_url = profile.api_base_url().ok_or(CliError::SyncNotConfigured)?;

    let identity = Arc::new(IdentityService::new_for_profile(&profile_name, profile)?);
    let remote = Arc::new(HttpRemoteCollection::new(
        &base_url,
        &profile.collection(),
        identity.clone(),
    )?);

    tracing::info!("Using remote collection via profile '{}'", profile_name);
    Ok(RemoteContext {
        profile_name,
        identity,
        remote,
    })
}
