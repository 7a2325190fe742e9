//! Vault CLI - catalog purchased doujin works from the terminal
//!
//! Works are stored locally first and pushed to the cloud on `vault sync`.

mod auth;
mod cli;
mod commands;
mod config_profiles;
mod error;

#[cfg(test)]
mod tests;

use clap::Parser;

use crate::cli::{Cli, Commands};
use crate::commands::add::run_add;
use crate::commands::auth_cmd::run_auth;
use crate::commands::cloud::run_cloud;
use crate::commands::common::resolve_db_path;
use crate::commands::completions::run_completions;
use crate::commands::config::run_config;
use crate::commands::delete::run_delete;
use crate::commands::edit::run_edit;
use crate::commands::list::{run_list, ListOptions};
use crate::commands::show::run_show;
use crate::commands::status::run_status;
use crate::commands::sync::{run_sync, run_watch};
use crate::error::CliError;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), CliError> {
    dotenvy::dotenv().ok();

    let directive = "vault=info"
        .parse()
        .map_err(|error| CliError::Config(format!("invalid log directive: {error}")))?;
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(directive))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let profile = cli.profile.as_deref();
    let db_path = || resolve_db_path(cli.db_path.clone());

    match cli.command {
        Commands::Add { title, fields } => run_add(&title, fields, &db_path()?),
        Commands::List {
            platform,
            status,
            tag,
            query,
            limit,
            json,
        } => {
            let options = ListOptions {
                platform,
                status,
                tag,
                query,
                limit,
                as_json: json,
            };
            run_list(options, &db_path()?)
        }
        Commands::Show { id, json } => run_show(&id, json, &db_path()?),
        Commands::Edit { id, title, fields } => run_edit(&id, title, fields, &db_path()?),
        Commands::Delete { id } => run_delete(&id, &db_path()?),
        Commands::Status { json } => run_status(json, &db_path()?),
        Commands::Sync { keep_tombstones } => run_sync(keep_tombstones, &db_path()?, profile).await,
        Commands::Watch { interval_secs } => run_watch(interval_secs, &db_path()?, profile).await,
        Commands::Cloud { command } => run_cloud(command, profile).await,
        Commands::Config { command } => run_config(command, profile, &db_path()?),
        Commands::Auth { command } => run_auth(command, profile).await,
        Commands::Completions { shell, output } => run_completions(shell, output.as_deref()),
    }
}
