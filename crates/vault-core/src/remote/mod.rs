//! Remote document collection contract.
//!
//! The reconciler talks to the cloud exclusively through [`RemoteCollection`].
//! Every write reports a single [`RemoteOutcome`]; adapters decide success or
//! failure once, at this boundary.

mod http;
mod memory;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::auth::AuthError;
use crate::models::{tag_matches, Platform, RemoteId, Work, WorkStatus};

pub use http::HttpRemoteCollection;
pub use memory::{InMemoryRemoteCollection, RemoteCall};

/// Payload stored remotely for a work
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteDocument {
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<Platform>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<WorkStatus>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cover_source_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_url: Option<String>,
    /// Last local mutation (Unix ms)
    #[serde(default)]
    pub updated_at: i64,
}

impl RemoteDocument {
    pub fn from_work(work: &Work) -> Self {
        let details = &work.details;
        Self {
            title: details.title.clone(),
            platform: details.platform,
            status: details.status,
            tags: details.tags.clone(),
            rating: details.rating,
            cover_image_url: details.cover_image_url.clone(),
            cover_source_url: details.cover_source_url.clone(),
            product_url: details.product_url.clone(),
            updated_at: work.updated_at,
        }
    }
}

/// Outcome of a single remote write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteOutcome {
    Created { remote_id: RemoteId },
    Updated,
    Deleted,
    Failed { reason: String },
}

impl RemoteOutcome {
    pub fn failed(reason: impl ToString) -> Self {
        Self::Failed {
            reason: reason.to_string(),
        }
    }
}

/// Server-side narrowing for [`RemoteCollection::list`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteListFilter {
    pub owner_id: Option<String>,
    pub platform: Option<Platform>,
    pub status: Option<WorkStatus>,
    pub tag: Option<String>,
}

impl RemoteListFilter {
    pub fn matches(&self, owner_id: &str, document: &RemoteDocument) -> bool {
        if self.owner_id.as_deref().is_some_and(|owner| owner != owner_id) {
            return false;
        }
        if self.platform.is_some() && document.platform != self.platform {
            return false;
        }
        if self.status.is_some() && document.status != self.status {
            return false;
        }
        self.tag.as_deref().is_none_or(|tag| {
            document
                .tags
                .iter()
                .any(|candidate| tag_matches(candidate, tag))
        })
    }
}

/// Cursor pagination request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageRequest {
    pub limit: usize,
    pub cursor: Option<String>,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            limit: 50,
            cursor: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteItem {
    pub id: RemoteId,
    #[serde(default)]
    pub uid: Option<String>,
    #[serde(flatten)]
    pub document: RemoteDocument,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePage {
    pub items: Vec<RemoteItem>,
    #[serde(default)]
    pub next_cursor: Option<String>,
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Invalid remote configuration: {0}")]
    InvalidConfiguration(String),
    #[error("Remote HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Remote API error: {0}")]
    Api(String),
    #[error("Invalid remote payload: {0}")]
    InvalidPayload(String),
    #[error("Remote authentication failed: {0}")]
    Auth(#[from] AuthError),
    #[error("Remote unavailable: {0}")]
    Unavailable(String),
}

pub type RemoteResult<T> = Result<T, RemoteError>;

/// A remote document collection keyed by remote identity.
#[async_trait]
pub trait RemoteCollection: Send + Sync {
    /// Create a document owned by `owner_id`; returns `Created` with its id
    async fn create(&self, document: &RemoteDocument, owner_id: &str) -> RemoteOutcome;

    /// Overwrite the descriptive fields of an existing document
    async fn update(&self, remote_id: &RemoteId, document: &RemoteDocument) -> RemoteOutcome;

    async fn delete(&self, remote_id: &RemoteId) -> RemoteOutcome;

    /// Read path used outside reconciliation
    async fn list(&self, filter: &RemoteListFilter, page: &PageRequest)
        -> RemoteResult<RemotePage>;
}
