use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use vault_core::models::{Platform, WorkStatus, MAX_RATING};

use crate::commands::config::MAX_INTERVAL_SECS;

#[derive(Parser)]
#[command(name = "vault")]
#[command(about = "Catalog purchased doujin works locally and sync them to the cloud")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Optional path to local database file
    #[arg(long, global = true, value_name = "PATH")]
    pub db_path: Option<PathBuf>,

    /// CLI profile name for auth/sync configuration
    #[arg(long, global = true, value_name = "NAME")]
    pub profile: Option<String>,
}

#[derive(clap::Args, Debug, Default)]
pub struct WorkFields {
    /// Storefront (DLsite, Fanza, Other)
    #[arg(long)]
    pub platform: Option<Platform>,
    /// Progress (unread, playing, finished, backlog)
    #[arg(long)]
    pub status: Option<WorkStatus>,
    /// Tags separated by `,` or `、`
    #[arg(long)]
    pub tags: Option<String>,
    /// Rating from 0 to 5
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=i64::from(MAX_RATING)))]
    pub rating: Option<u8>,
    /// Store page URL (empty string clears it)
    #[arg(long, value_name = "URL")]
    pub product_url: Option<String>,
    /// Cover image URL (empty string clears it)
    #[arg(long, value_name = "URL")]
    pub cover_url: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Add a work to the catalog
    #[command(alias = "new")]
    Add {
        /// Work title
        #[arg(required = true)]
        title: Vec<String>,
        #[command(flatten)]
        fields: WorkFields,
    },
    /// List catalogued works
    #[command(alias = "ls")]
    List {
        /// Filter by storefront
        #[arg(long)]
        platform: Option<Platform>,
        /// Filter by progress
        #[arg(long)]
        status: Option<WorkStatus>,
        /// Filter by tag
        #[arg(long)]
        tag: Option<String>,
        /// Filter by title substring
        #[arg(short, long)]
        query: Option<String>,
        /// Number of works to show
        #[arg(short, long, default_value = "50")]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show one work, including sync bookkeeping
    Show {
        /// Local ID, remote ID, or unique ID prefix
        id: String,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Edit an existing work
    Edit {
        /// Local ID, remote ID, or unique ID prefix
        id: String,
        /// New title
        #[arg(long)]
        title: Option<String>,
        #[command(flatten)]
        fields: WorkFields,
    },
    /// Delete a work (synced to the cloud on the next sync)
    #[command(alias = "rm")]
    Delete {
        /// Local ID, remote ID, or unique ID prefix
        id: String,
    },
    /// Show pending changes and last sync time
    Status {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Push local changes to the cloud once
    Sync {
        /// Keep confirmed tombstones instead of purging them
        #[arg(long)]
        keep_tombstones: bool,
    },
    /// Sync on a timer until interrupted
    Watch {
        /// Seconds between passes (defaults to the stored interval)
        #[arg(
            long,
            value_name = "SECS",
            value_parser = clap::value_parser!(u64).range(1..=MAX_INTERVAL_SECS)
        )]
        interval_secs: Option<u64>,
    },
    /// Read works stored in the cloud
    Cloud {
        #[command(subcommand)]
        command: CloudCommands,
    },
    /// Configure CLI profiles and sync settings
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
    /// Manage the signed-in identity for a profile
    Auth {
        #[command(subcommand)]
        command: AuthCommands,
    },
    /// Generate shell completion scripts
    Completions {
        /// Target shell
        #[arg(value_enum)]
        shell: CompletionShell,
        /// Optional output path (stdout when omitted)
        #[arg(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, ValueEnum)]
pub enum CompletionShell {
    Bash,
    Zsh,
    Fish,
}

#[derive(Subcommand)]
pub enum CloudCommands {
    /// List works owned by the signed-in identity
    List {
        /// Page size
        #[arg(short, long, default_value = "50")]
        limit: usize,
        /// Continue from a cursor printed by a previous page
        #[arg(long)]
        cursor: Option<String>,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Initialize or update profile config
    Init {
        /// Document API base URL
        #[arg(long, value_name = "URL")]
        api_base_url: Option<String>,
        /// Remote collection name
        #[arg(long, value_name = "NAME")]
        collection: Option<String>,
        /// Firebase web API key used for sign-in
        #[arg(long, value_name = "KEY")]
        firebase_api_key: Option<String>,
        /// Identity Toolkit endpoint override (e.g. emulator)
        #[arg(long, value_name = "URL")]
        identity_toolkit_url: Option<String>,
        /// Secure Token endpoint override (e.g. emulator)
        #[arg(long, value_name = "URL")]
        secure_token_url: Option<String>,
        /// Keep current active profile instead of activating this one
        #[arg(long)]
        no_activate: bool,
    },
    /// Print the active profile and stored sync settings
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Set the auto-sync interval used by `vault watch`
    SetInterval {
        /// Seconds between passes, or `off`
        value: String,
    },
}

#[derive(Subcommand)]
pub enum AuthCommands {
    /// Show the stored identity for the profile
    Status,
    /// Sign in anonymously and store the session in the keychain
    Anonymous,
    /// Sign in with a Google OAuth id token
    Google {
        /// Google id token obtained from an OAuth flow
        #[arg(long, value_name = "TOKEN")]
        id_token: String,
    },
    /// Clear the stored session
    Logout,
}
