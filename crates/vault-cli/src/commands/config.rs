use std::env;
use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use vault_core::db::{SettingsRepository, SqliteSettingsRepository};
use vault_core::sync::MAX_AUTO_SYNC_INTERVAL;
use vault_core::util::is_http_url;

use crate::cli::ConfigCommands;
use crate::commands::common::open_database;
use crate::config_profiles::{normalize_text_option, CliProfile, CliProfilesConfig};
use crate::error::CliError;

/// Upper bound for interval arguments, in seconds
pub const MAX_INTERVAL_SECS: u64 = MAX_AUTO_SYNC_INTERVAL.as_secs();

pub struct ProfileInit {
    pub profile: Option<String>,
    pub api_base_url: Option<String>,
    pub collection: Option<String>,
    pub firebase_api_key: Option<String>,
    pub identity_toolkit_url: Option<String>,
    pub secure_token_url: Option<String>,
    pub no_activate: bool,
}

pub fn run_config(
    command: ConfigCommands,
    global_profile: Option<&str>,
    db_path: &Path,
) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init {
            api_base_url,
            collection,
            firebase_api_key,
            identity_toolkit_url,
            secure_token_url,
            no_activate,
        } => {
            let init = ProfileInit {
                profile: global_profile.map(str::to_string),
                api_base_url,
                collection,
                firebase_api_key,
                identity_toolkit_url,
                secure_token_url,
                no_activate,
            };
            run_config_init(init)
        }
        ConfigCommands::Show { json } => run_config_show(json, global_profile, db_path),
        ConfigCommands::SetInterval { value } => run_set_interval(&value, db_path),
    }
}

pub fn run_config_init(init: ProfileInit) -> Result<(), CliError> {
    let mut config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(init.profile.as_deref());
    apply_profile_init(&mut config, &profile_name, init)?;
    let path = config.save().map_err(CliError::Config)?;
    println!(
        "Profile '{}' initialized at {}",
        profile_name,
        path.display()
    );

    let missing_fields = config
        .profile(&profile_name)
        .map(CliProfile::missing_sync_fields)
        .unwrap_or_default();
    if missing_fields.is_empty() {
        println!("Profile '{profile_name}' is ready. Run `vault sync` to push local works.");
    } else {
        println!(
            "Profile '{}' is missing: {}",
            profile_name,
            missing_fields.join(", ")
        );
    }
    Ok(())
}

/// Merge explicit values, then environment, then existing profile values
pub fn apply_profile_init(
    config: &mut CliProfilesConfig,
    profile_name: &str,
    init: ProfileInit,
) -> Result<(), CliError> {
    let existing = config.profile(profile_name).cloned().unwrap_or_default();

    let merged = CliProfile {
        api_base_url: normalize_text_option(init.api_base_url)
            .or_else(|| normalize_text_option(env::var("VAULT_API_BASE_URL").ok()))
            .or_else(|| existing.api_base_url()),
        collection: normalize_text_option(init.collection)
            .or_else(|| normalize_text_option(existing.collection.clone())),
        firebase_api_key: normalize_text_option(init.firebase_api_key)
            .or_else(|| normalize_text_option(env::var("FIREBASE_API_KEY").ok()))
            .or_else(|| normalize_text_option(existing.firebase_api_key.clone())),
        identity_toolkit_url: normalize_text_option(init.identity_toolkit_url)
            .or_else(|| normalize_text_option(existing.identity_toolkit_url.clone())),
        secure_token_url: normalize_text_option(init.secure_token_url)
            .or_else(|| normalize_text_option(existing.secure_token_url.clone())),
    };
    validate_profile_urls(&merged)?;

    *config.profile_mut_or_default(profile_name) = merged;
    if !init.no_activate {
        config.active_profile = Some(profile_name.to_string());
    }
    Ok(())
}

fn validate_profile_urls(profile: &CliProfile) -> Result<(), CliError> {
    let urls = [
        ("api_base_url", profile.api_base_url.as_deref()),
        ("identity_toolkit_url", profile.identity_toolkit_url.as_deref()),
        ("secure_token_url", profile.secure_token_url.as_deref()),
    ];
    for (field, url) in urls {
        if let Some(url) = url {
            if !is_http_url(url) {
                return Err(CliError::Config(format!(
                    "{field} must include http:// or https://"
                )));
            }
        }
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct ConfigView {
    profile: String,
    api_base_url: Option<String>,
    collection: String,
    firebase_api_key_set: bool,
    identity_toolkit_url: Option<String>,
    secure_token_url: Option<String>,
    auto_sync_interval_ms: Option<u64>,
}

fn run_config_show(
    as_json: bool,
    global_profile: Option<&str>,
    db_path: &Path,
) -> Result<(), CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(global_profile);
    let profile = config.profile(&profile_name).cloned().unwrap_or_default();
    let db = open_database(db_path)?;
    let settings = SqliteSettingsRepository::new(db.connection()).load()?;

    let view = ConfigView {
        api_base_url: profile.api_base_url(),
        collection: profile.collection(),
        firebase_api_key_set: profile.identity_config().is_some(),
        identity_toolkit_url: profile.identity_toolkit_url.clone(),
        secure_token_url: profile.secure_token_url.clone(),
        auto_sync_interval_ms: settings.auto_sync_interval_ms,
        profile: profile_name,
    };

    if as_json {
        println!("{}", serde_json::to_string_pretty(&view)?);
        return Ok(());
    }

    println!("profile:          {}", view.profile);
    println!(
        "api base url:     {}",
        view.api_base_url.as_deref().unwrap_or("(not set)")
    );
    println!("collection:       {}", view.collection);
    println!(
        "firebase api key: {}",
        if view.firebase_api_key_set { "set" } else { "(not set)" }
    );
    println!(
        "auto-sync:        {}",
        view.auto_sync_interval_ms
            .map_or_else(|| "off".to_string(), |millis| format!("every {}s", millis / 1000))
    );
    Ok(())
}

/// Parse `off`, `0`, or a number of seconds
pub fn parse_interval(value: &str) -> Result<Option<Duration>, CliError> {
    let value = value.trim();
    if value.eq_ignore_ascii_case("off") {
        return Ok(None);
    }
    let secs = value
        .parse::<u64>()
        .map_err(|_| CliError::Config(format!("invalid interval '{value}'; use seconds or `off`")))?;
    if secs > MAX_INTERVAL_SECS {
        return Err(CliError::Config(format!(
            "interval {secs}s is longer than the {MAX_INTERVAL_SECS}s maximum"
        )));
    }
    Ok(Some(Duration::from_secs(secs)).filter(|interval| !interval.is_zero()))
}

fn run_set_interval(value: &str, db_path: &Path) -> Result<(), CliError> {
    let interval = parse_interval(value)?;
    let db = open_database(db_path)?;
    let repo = SqliteSettingsRepository::new(db.connection());
    let mut settings = repo.load()?;
    settings.set_auto_sync_interval(interval);
    repo.save(&settings)?;

    match settings.auto_sync_interval() {
        Some(interval) => println!("Auto-sync every {}s", interval.as_secs()),
        None => println!("Auto-sync disabled"),
    }
    Ok(())
}
