use std::path::Path;

use crate::cli::WorkFields;
use crate::commands::common::{
    details_from_fields, load_store, open_database, resolve_title, save_store,
};
use crate::error::CliError;

pub fn run_add(title_parts: &[String], fields: WorkFields, db_path: &Path) -> Result<(), CliError> {
    let title = resolve_title(title_parts)?;

    let db = open_database(db_path)?;
    let store = load_store(&db)?;
    let id = store.add_local(details_from_fields(title, fields));
    save_store(&db, &store)?;

    println!("{id}");
    Ok(())
}
