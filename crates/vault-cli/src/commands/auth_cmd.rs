use vault_core::auth::{AuthSession, SignInProvider};

use crate::auth::{clear_stored_session, load_stored_session, IdentityService};
use crate::cli::AuthCommands;
use crate::config_profiles::CliProfilesConfig;
use crate::error::CliError;

pub async fn run_auth(command: AuthCommands, global_profile: Option<&str>) -> Result<(), CliError> {
    let config = CliProfilesConfig::load().map_err(CliError::Config)?;
    let profile_name = config.resolve_profile_name(global_profile);

    match command {
        AuthCommands::Status => {
            let session = match config.profile(&profile_name) {
                Some(profile) if profile.identity_config().is_some() => {
                    IdentityService::new_for_profile(&profile_name, profile)?
                        .restore_session()
                        .await?
                }
                _ => load_stored_session(&profile_name)?,
            };

            if let Some(session) = session {
                println!(
                    "Profile '{}' is signed in as {}",
                    profile_name,
                    describe_session(&session)
                );
            } else {
                println!("Profile '{profile_name}' is not signed in.");
            }
            Ok(())
        }
        AuthCommands::Anonymous => {
            let service = identity_service(&config, &profile_name)?;
            let session = service.sign_in_anonymously().await?;
            println!(
                "Signed in profile '{}' as {}",
                profile_name,
                describe_session(&session)
            );
            Ok(())
        }
        AuthCommands::Google { id_token } => {
            let service = identity_service(&config, &profile_name)?;
            let session = service.sign_in_with_google(&id_token).await?;
            println!(
                "Signed in profile '{}' as {}",
                profile_name,
                describe_session(&session)
            );
            Ok(())
        }
        AuthCommands::Logout => {
            clear_stored_session(&profile_name)?;
            println!("Signed out profile '{profile_name}'");
            Ok(())
        }
    }
}

fn identity_service(
    config: &CliProfilesConfig,
    profile_name: &str,
) -> Result<IdentityService, CliError> {
    let profile = config.profile(profile_name).ok_or_else(|| {
        CliError::Config(format!(
            "Profile '{profile_name}' is not configured. Run `vault config init --profile {profile_name}` first."
        ))
    })?;
    Ok(IdentityService::new_for_profile(profile_name, profile)?)
}

pub fn describe_session(session: &AuthSession) -> String {
    match session.user.provider {
        SignInProvider::Anonymous => format!("anonymous user {}", session.user.id),
        SignInProvider::Google => format!(
            "{} ({})",
            session.user.email.as_deref().unwrap_or("(no email)"),
            session.user.id
        ),
    }
}
