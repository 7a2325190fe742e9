use std::path::Path;

use vault_core::store::IdLookup;

use crate::commands::common::{
    ambiguous_id_error, load_store, normalize_work_identifier, open_database, save_store,
};
use crate::error::CliError;

/// Tombstone a work; an unknown id is treated as a remote-only document.
pub fn run_delete(id: &str, db_path: &Path) -> Result<(), CliError> {
    let normalized_id = normalize_work_identifier(id)?;
    let db = open_database(db_path)?;
    let store = load_store(&db)?;

    let target = match store.resolve_id(&normalized_id) {
        IdLookup::Found(local_id) => {
            if store.get(&local_id).is_some_and(|work| work.deleted) {
                return Err(CliError::WorkNotFound(normalized_id));
            }
            local_id.to_string()
        }
        IdLookup::NotFound => {
            tracing::info!(
                "No local work '{}'; queueing remote delete by id",
                normalized_id
            );
            normalized_id
        }
        IdLookup::Ambiguous(ids) => return Err(ambiguous_id_error(&normalized_id, &ids)),
    };

    store.mark_delete_local(&target);
    save_store(&db, &store)?;
    println!("{target}");
    Ok(())
}
