use std::path::Path;

use vault_core::models::{Platform, WorkStatus};
use vault_core::store::WorkFilter;

use crate::commands::common::{
    format_work_lines, load_store, open_database, work_to_list_item, WorkListItem,
};
use crate::error::CliError;

pub struct ListOptions {
    pub platform: Option<Platform>,
    pub status: Option<WorkStatus>,
    pub tag: Option<String>,
    pub query: Option<String>,
    pub limit: usize,
    pub as_json: bool,
}

pub fn run_list(options: ListOptions, db_path: &Path) -> Result<(), CliError> {
    let db = open_database(db_path)?;
    let store = load_store(&db)?;
    let filter = WorkFilter {
        platform: options.platform,
        status: options.status,
        tag: options.tag,
        query: options.query,
    };
    let works = store
        .list_filtered(&filter)
        .into_iter()
        .take(options.limit)
        .collect::<Vec<_>>();

    if options.as_json {
        let json_items = works
            .iter()
            .map(work_to_list_item)
            .collect::<Vec<WorkListItem>>();
        println!("{}", serde_json::to_string_pretty(&json_items)?);
    } else if works.is_empty() {
        println!("No works found.");
    } else {
        for line in format_work_lines(&works) {
            println!("{line}");
        }
    }

    Ok(())
}
