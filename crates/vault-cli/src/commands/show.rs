use std::path::Path;

use crate::commands::common::{
    format_work_detail, load_store, normalize_work_identifier, open_database, resolve_any_work,
    work_to_list_item,
};
use crate::error::CliError;

pub fn run_show(id: &str, as_json: bool, db_path: &Path) -> Result<(), CliError> {
    let normalized_id = normalize_work_identifier(id)?;
    let db = open_database(db_path)?;
    let store = load_store(&db)?;
    let work = resolve_any_work(&store, &normalized_id)?
        .ok_or_else(|| CliError::WorkNotFound(normalized_id.clone()))?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&work_to_list_item(&work))?);
    } else {
        for line in format_work_detail(&work) {
            println!("{line}");
        }
    }
    Ok(())
}
