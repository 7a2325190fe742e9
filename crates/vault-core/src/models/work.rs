//! Work (catalog record) model

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;
use uuid::Uuid;

use crate::error::Error;

/// Highest accepted rating value.
pub const MAX_RATING: u8 = 5;

/// Locally generated identifier of a work.
///
/// Generated ids are UUID v7 (time-sortable). Tombstones synthesized for
/// remote-only records reuse the remote identifier verbatim, so the type
/// accepts arbitrary strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalId(String);

impl LocalId {
    /// Create a new unique local ID using UUID v7
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for LocalId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for LocalId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier assigned by the remote store on first successful create.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteId(String);

impl RemoteId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Storefront a work was purchased from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    #[serde(rename = "DLsite")]
    DlSite,
    #[serde(rename = "Fanza")]
    Fanza,
    #[serde(rename = "Other")]
    Other,
}

impl Platform {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::DlSite => "DLsite",
            Self::Fanza => "Fanza",
            Self::Other => "Other",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "dlsite" => Ok(Self::DlSite),
            "fanza" => Ok(Self::Fanza),
            "other" | "その他" => Ok(Self::Other),
            other => Err(Error::InvalidInput(format!("unknown platform '{other}'"))),
        }
    }
}

/// Reading/playing progress of a work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkStatus {
    /// 未読
    Unread,
    /// プレイ中
    Playing,
    /// 読了
    Finished,
    /// 積読
    Backlog,
}

impl WorkStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unread => "unread",
            Self::Playing => "playing",
            Self::Finished => "finished",
            Self::Backlog => "backlog",
        }
    }
}

impl fmt::Display for WorkStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "unread" | "未読" => Ok(Self::Unread),
            "playing" | "in-progress" | "プレイ中" => Ok(Self::Playing),
            "finished" | "読了" => Ok(Self::Finished),
            "backlog" | "積読" => Ok(Self::Backlog),
            other => Err(Error::InvalidInput(format!("unknown status '{other}'"))),
        }
    }
}

/// Observable per-record sync status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SyncState {
    #[default]
    Pending,
    Synced,
    Error,
}

impl SyncState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Synced => "synced",
            Self::Error => "error",
        }
    }
}

impl FromStr for SyncState {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "synced" => Ok(Self::Synced),
            "error" => Ok(Self::Error),
            other => Err(Error::InvalidInput(format!("unknown sync state '{other}'"))),
        }
    }
}

/// Descriptive, user-editable fields of a work.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkDetails {
    pub title: String,
    #[serde(default)]
    pub platform: Option<Platform>,
    #[serde(default)]
    pub status: Option<WorkStatus>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub rating: Option<u8>,
    #[serde(default)]
    pub cover_image_url: Option<String>,
    #[serde(default)]
    pub cover_source_url: Option<String>,
    #[serde(default)]
    pub product_url: Option<String>,
}

impl WorkDetails {
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            ..Self::default()
        }
    }

    /// Trim the title, normalize tags and clamp the rating.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.title = self.title.trim().to_string();
        self.tags = normalize_tags(self.tags);
        self.rating = self.rating.map(|rating| rating.min(MAX_RATING));
        self
    }

    /// Check whether any tag matches `tag`, ignoring case
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|candidate| tag_matches(candidate, tag))
    }
}

/// Partial update for [`WorkDetails`]; `None` leaves the field untouched.
///
/// Optional fields use a nested `Option` so callers can clear a value
/// (`Some(None)`) as well as set it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkPatch {
    pub title: Option<String>,
    pub platform: Option<Option<Platform>>,
    pub status: Option<Option<WorkStatus>>,
    pub tags: Option<Vec<String>>,
    pub rating: Option<Option<u8>>,
    pub cover_image_url: Option<Option<String>>,
    pub cover_source_url: Option<Option<String>>,
    pub product_url: Option<Option<String>>,
}

impl WorkPatch {
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.platform.is_none()
            && self.status.is_none()
            && self.tags.is_none()
            && self.rating.is_none()
            && self.cover_image_url.is_none()
            && self.cover_source_url.is_none()
            && self.product_url.is_none()
    }

    /// Merge this patch onto `details`, returning the normalized result
    #[must_use]
    pub fn apply_to(self, mut details: WorkDetails) -> WorkDetails {
        if let Some(title) = self.title {
            details.title = title;
        }
        if let Some(platform) = self.platform {
            details.platform = platform;
        }
        if let Some(status) = self.status {
            details.status = status;
        }
        if let Some(tags) = self.tags {
            details.tags = tags;
        }
        if let Some(rating) = self.rating {
            details.rating = rating;
        }
        if let Some(url) = self.cover_image_url {
            details.cover_image_url = url;
        }
        if let Some(url) = self.cover_source_url {
            details.cover_source_url = url;
        }
        if let Some(url) = self.product_url {
            details.product_url = url;
        }
        details.normalized()
    }
}

/// A catalog record with its local sync bookkeeping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Work {
    pub local_id: LocalId,
    pub remote_id: Option<RemoteId>,
    pub details: WorkDetails,
    /// Creation timestamp (Unix ms)
    pub created_at: i64,
    /// Last local mutation timestamp (Unix ms)
    pub updated_at: i64,
    /// Local state has changes not yet confirmed remotely
    pub dirty: bool,
    /// Tombstone marker; hidden from listings until purged
    pub deleted: bool,
    pub sync_state: SyncState,
    /// Bumped on every local mutation
    #[serde(default)]
    pub revision: u64,
}

impl Work {
    /// Create a fresh, unsynced work
    #[must_use]
    pub fn new(details: WorkDetails) -> Self {
        let now = crate::util::unix_millis_now();
        Self {
            local_id: LocalId::generate(),
            remote_id: None,
            details: details.normalized(),
            created_at: now,
            updated_at: now,
            dirty: true,
            deleted: false,
            sync_state: SyncState::Pending,
            revision: 0,
        }
    }

    /// Tombstone for a record known only by its remote identifier
    #[must_use]
    pub fn remote_tombstone(id: &str) -> Self {
        let now = crate::util::unix_millis_now();
        Self {
            local_id: LocalId::from(id),
            remote_id: Some(RemoteId::new(id)),
            details: WorkDetails::default(),
            created_at: now,
            updated_at: now,
            dirty: true,
            deleted: true,
            sync_state: SyncState::Pending,
            revision: 0,
        }
    }

    /// Tombstoned without ever reaching the remote store
    pub const fn is_local_only_tombstone(&self) -> bool {
        self.deleted && self.remote_id.is_none()
    }
}

fn tag_separator() -> &'static Regex {
    static SEPARATOR: OnceLock<Regex> = OnceLock::new();
    SEPARATOR.get_or_init(|| Regex::new(r"[,、]").expect("Invalid regex"))
}

/// Split user tag input on `,` or `、` and normalize the result
///
/// # Examples
///
/// ```
/// use vault_core::models::parse_tags;
///
/// let tags = parse_tags("ASMR, 百合、 asmr ,,");
/// assert_eq!(tags, vec!["ASMR".to_string(), "百合".to_string()]);
/// ```
#[must_use]
pub fn parse_tags(input: &str) -> Vec<String> {
    normalize_tags(tag_separator().split(input).map(str::to_string))
}

/// Case-insensitive tag comparison shared by local and remote lookups
#[must_use]
pub fn tag_matches(candidate: &str, query: &str) -> bool {
    candidate.trim().to_lowercase() == query.trim().to_lowercase()
}

/// Trim tags, drop empties and case-insensitive duplicates (first wins)
#[must_use]
pub fn normalize_tags(tags: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.into_iter()
        .map(|tag| tag.trim().to_string())
        .filter(|tag| !tag.is_empty())
        .filter(|tag| seen.insert(tag.to_lowercase()))
        .collect()
}
