use std::path::Path;

use crate::cli::WorkFields;
use crate::commands::common::{
    load_store, normalize_work_identifier, open_database, patch_from_fields, resolve_work,
    save_store,
};
use crate::error::CliError;

pub fn run_edit(
    id: &str,
    title: Option<String>,
    fields: WorkFields,
    db_path: &Path,
) -> Result<(), CliError> {
    let normalized_id = normalize_work_identifier(id)?;
    let patch = patch_from_fields(title, fields)?;
    if patch.is_empty() {
        return Err(CliError::NothingToEdit);
    }

    let db = open_database(db_path)?;
    let store = load_store(&db)?;
    let work = resolve_work(&store, &normalized_id)?;
    if !store.update_local(&work.local_id, patch) {
        return Err(CliError::WorkNotFound(normalized_id));
    }
    save_store(&db, &store)?;

    println!("{}", work.local_id);
    Ok(())
}
