use vault_core::auth::IdentityProvider;
use vault_core::remote::{PageRequest, RemoteCollection, RemoteItem, RemoteListFilter};

use crate::cli::CloudCommands;
use crate::commands::common::{connect_remote, title_preview};
use crate::error::CliError;

pub async fn run_cloud(command: CloudCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    match command {
        CloudCommands::List {
            limit,
            cursor,
            json,
        } => run_cloud_list(limit, cursor, json, global_profile).await,
    }
}

async fn run_cloud_list(
    limit: usize,
    cursor: Option<String>,
    as_json: bool,
    global_profile: Option<&str>,
) -> Result<(), CliError> {
    let context = connect_remote(global_profile)?;
    let identity = context.identity.ensure_signed_in().await?;
    let filter = RemoteListFilter {
        owner_id: Some(identity.id),
        ..RemoteListFilter::default()
    };
    let page = context
        .remote
        .list(&filter, &PageRequest { limit, cursor })
        .await?;

    if as_json {
        println!("{}", serde_json::to_string_pretty(&page)?);
        return Ok(());
    }

    if page.items.is_empty() {
        println!("No works stored in the cloud.");
    }
    for line in format_remote_lines(&page.items) {
        println!("{line}");
    }
    if let Some(cursor) = page.next_cursor {
        println!("More results: vault cloud list --cursor {cursor}");
    }
    Ok(())
}

pub fn format_remote_lines(items: &[RemoteItem]) -> Vec<String> {
    items
        .iter()
        .map(|item| {
            let title = title_preview(&item.document.title, 40);
            let platform = item
                .document
                .platform
                .map_or("-", |platform| platform.as_str());
            let status = item.document.status.map_or("-", |status| status.as_str());
            format!("{:<24}  {title:<40}  {platform:<6}  {status}", item.id)
        })
        .collect()
}
