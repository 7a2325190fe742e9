//! Data models for the vault

mod settings;
mod work;

pub use settings::SyncSettings;
pub use work::{
    normalize_tags, parse_tags, tag_matches, LocalId, Platform, RemoteId, SyncState, Work,
    WorkDetails, WorkPatch, WorkStatus, MAX_RATING,
};
