//! Identity provider backed by the Google Identity Toolkit REST API.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::util::{normalize_base_url, parse_api_error, unix_timestamp_now};

const EXPIRY_SKEW_SECONDS: i64 = 60;
const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

pub const DEFAULT_IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1";
pub const DEFAULT_SECURE_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1";

/// The signed-in user as seen by the reconciler
#[derive(Clone, PartialEq, Eq)]
pub struct Identity {
    pub id: String,
    pub token: Option<String>,
}

impl Identity {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            token: None,
        }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Identity")
            .field("id", &self.id)
            .field("token", &self.token.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignInProvider {
    Anonymous,
    Google,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    pub email: Option<String>,
    pub provider: SignInProvider,
}

#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub id_token: String,
    pub refresh_token: String,
    pub expires_at: i64,
    pub user: AuthUser,
}

impl AuthSession {
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at <= unix_timestamp_now() + EXPIRY_SKEW_SECONDS
    }

    pub fn identity(&self) -> Identity {
        Identity {
            id: self.user.id.clone(),
            token: Some(self.id_token.clone()),
        }
    }
}

impl fmt::Debug for AuthSession {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("AuthSession")
            .field("id_token", &"[REDACTED]")
            .field("refresh_token", &"[REDACTED]")
            .field("expires_at", &self.expires_at)
            .field("user", &self.user)
            .finish()
    }
}

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Sign-in is not configured; set firebase_api_key in the active profile.")]
    NotConfigured,
    #[error("Invalid auth configuration: {0}")]
    InvalidConfiguration(String),
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Failed to parse JSON payload: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Auth API error: {0}")]
    Api(String),
    #[error("Secure storage error: {0}")]
    SecureStorage(String),
}

pub type AuthResult<T> = Result<T, AuthError>;

/// Supplies an identity for a sync pass, signing in when needed.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn ensure_signed_in(&self) -> AuthResult<Identity>;
}

/// Fixed identity for backends that trust the caller.
#[derive(Debug, Clone)]
pub struct StaticIdentity(pub Identity);

#[async_trait]
impl IdentityProvider for StaticIdentity {
    async fn ensure_signed_in(&self) -> AuthResult<Identity> {
        Ok(self.0.clone())
    }
}

pub trait SessionPersistence: Clone + Send + Sync + 'static {
    fn load_session(&self) -> AuthResult<Option<AuthSession>>;
    fn save_session(&self, session: &AuthSession) -> AuthResult<()>;
    fn clear_session(&self) -> AuthResult<()>;
}

/// Process-local session storage; nothing survives a restart.
#[derive(Debug, Clone, Default)]
pub struct MemorySessionStore {
    session: Arc<Mutex<Option<AuthSession>>>,
}

impl SessionPersistence for MemorySessionStore {
    fn load_session(&self) -> AuthResult<Option<AuthSession>> {
        Ok(self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save_session(&self, session: &AuthSession) -> AuthResult<()> {
        *self.session.lock().unwrap_or_else(PoisonError::into_inner) = Some(session.clone());
        Ok(())
    }

    fn clear_session(&self) -> AuthResult<()> {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityToolkitConfig {
    pub api_key: String,
    pub identity_toolkit_url: String,
    pub secure_token_url: String,
}

impl IdentityToolkitConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            identity_toolkit_url: DEFAULT_IDENTITY_TOOLKIT_URL.to_string(),
            secure_token_url: DEFAULT_SECURE_TOKEN_URL.to_string(),
        }
    }

    #[must_use]
    pub fn with_endpoints(
        mut self,
        identity_toolkit_url: Option<String>,
        secure_token_url: Option<String>,
    ) -> Self {
        if let Some(url) = identity_toolkit_url {
            self.identity_toolkit_url = url;
        }
        if let Some(url) = secure_token_url {
            self.secure_token_url = url;
        }
        self
    }
}

#[derive(Clone)]
pub struct IdentityToolkitClient<S: SessionPersistence> {
    api_key: String,
    identity_toolkit_url: String,
    secure_token_url: String,
    client: Client,
    store: S,
}

impl<S: SessionPersistence> IdentityToolkitClient<S> {
    pub fn new(config: IdentityToolkitConfig, store: S) -> AuthResult<Self> {
        let api_key = config.api_key.trim().to_string();
        if api_key.is_empty() {
            return Err(AuthError::InvalidConfiguration(
                "API key must not be empty".to_string(),
            ));
        }
        let identity_toolkit_url =
            normalize_base_url(&config.identity_toolkit_url, "identity_toolkit_url")
                .map_err(AuthError::InvalidConfiguration)?;
        let secure_token_url = normalize_base_url(&config.secure_token_url, "secure_token_url")
            .map_err(AuthError::InvalidConfiguration)?;

        Ok(Self {
            api_key,
            identity_toolkit_url,
            secure_token_url,
            client: Client::builder().timeout(REQUEST_TIMEOUT).build()?,
            store,
        })
    }

    /// Load the persisted session, refreshing it when expired.
    ///
    /// A refresh token the server rejects clears the stored session. Network
    /// failures propagate so an offline client keeps its identity.
    pub async fn restore_session(&self) -> AuthResult<Option<AuthSession>> {
        let Some(stored_session) = self.store.load_session()? else {
            return Ok(None);
        };

        if !stored_session.is_expired() {
            return Ok(Some(stored_session));
        }

        match self.refresh_session(&stored_session).await {
            Ok(refreshed) => Ok(Some(refreshed)),
            Err(AuthError::Api(message)) => {
                tracing::warn!("Failed to refresh persisted session: {}", message);
                self.store.clear_session()?;
                Ok(None)
            }
            Err(error) => Err(error),
        }
    }

    pub async fn sign_in_anonymously(&self) -> AuthResult<AuthSession> {
        let payload = serde_json::json!({ "returnSecureToken": true });
        let request = self
            .client
            .post(self.identity_toolkit_endpoint("accounts:signUp"))
            .json(&payload);
        let response: IdentityToolkitResponse = self.send(request).await?;
        let session = response.into_session(SignInProvider::Anonymous)?;

        self.store.save_session(&session)?;
        tracing::info!("Signed in anonymously as {}", session.user.id);
        Ok(session)
    }

    /// Exchange a Google OAuth id token for a session.
    pub async fn sign_in_with_google(&self, google_id_token: &str) -> AuthResult<AuthSession> {
        let google_id_token = google_id_token.trim();
        if google_id_token.is_empty() {
            return Err(AuthError::Api("Google id token is required".to_string()));
        }

        let payload = serde_json::json!({
            "postBody": format!(
                "id_token={}&providerId=google.com",
                urlencoding::encode(google_id_token)
            ),
            "requestUri": "http://localhost",
            "returnSecureToken": true,
            "returnIdpCredential": true,
        });
        let request = self
            .client
            .post(self.identity_toolkit_endpoint("accounts:signInWithIdp"))
            .json(&payload);
        let response: IdentityToolkitResponse = self.send(request).await?;
        let session = response.into_session(SignInProvider::Google)?;

        self.store.save_session(&session)?;
        tracing::info!("Signed in with Google as {}", session.user.id);
        Ok(session)
    }

    pub async fn refresh_session(&self, session: &AuthSession) -> AuthResult<AuthSession> {
        if session.refresh_token.trim().is_empty() {
            return Err(AuthError::InvalidConfiguration(
                "Refresh token must not be empty".to_string(),
            ));
        }

        let request = self
            .client
            .post(format!(
                "{}/token?key={}",
                self.secure_token_url,
                urlencoding::encode(&self.api_key)
            ))
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", session.refresh_token.as_str()),
            ]);
        let response: SecureTokenResponse = self.send(request).await?;
        let refreshed = response.into_session(&session.user)?;

        self.store.save_session(&refreshed)?;
        Ok(refreshed)
    }

    /// Forget the local session. Firebase has no server-side sign-out.
    pub fn sign_out(&self) -> AuthResult<()> {
        self.store.clear_session()
    }

    pub fn stored_session(&self) -> AuthResult<Option<AuthSession>> {
        self.store.load_session()
    }

    fn identity_toolkit_endpoint(&self, method: &str) -> String {
        format!(
            "{}/{method}?key={}",
            self.identity_toolkit_url,
            urlencoding::encode(&self.api_key)
        )
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> AuthResult<T> {
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Api(parse_api_error(status, &body)));
        }
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl<S: SessionPersistence> IdentityProvider for IdentityToolkitClient<S> {
    async fn ensure_signed_in(&self) -> AuthResult<Identity> {
        if let Some(session) = self.restore_session().await? {
            return Ok(session.identity());
        }
        Ok(self.sign_in_anonymously().await?.identity())
    }
}

fn parse_expires_in(raw: Option<&str>) -> AuthResult<i64> {
    let raw = raw.ok_or_else(|| AuthError::Api("Auth response missing expiresIn".to_string()))?;
    let seconds = raw
        .trim()
        .parse::<i64>()
        .map_err(|_| AuthError::Api(format!("Invalid expiresIn value `{raw}`")))?;
    Ok(unix_timestamp_now().saturating_add(seconds))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityToolkitResponse {
    id_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<String>,
    local_id: Option<String>,
    email: Option<String>,
}

impl IdentityToolkitResponse {
    fn into_session(self, provider: SignInProvider) -> AuthResult<AuthSession> {
        let expires_at = parse_expires_in(self.expires_in.as_deref())?;
        match (self.id_token, self.refresh_token, self.local_id) {
            (Some(id_token), Some(refresh_token), Some(id)) => Ok(AuthSession {
                id_token,
                refresh_token,
                expires_at,
                user: AuthUser {
                    id,
                    email: self.email,
                    provider,
                },
            }),
            _ => Err(AuthError::Api(
                "Auth response did not include enough session fields".to_string(),
            )),
        }
    }
}

#[derive(Debug, Deserialize)]
struct SecureTokenResponse {
    id_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<String>,
    user_id: Option<String>,
}

impl SecureTokenResponse {
    fn into_session(self, previous_user: &AuthUser) -> AuthResult<AuthSession> {
        let expires_at = parse_expires_in(self.expires_in.as_deref())?;
        let (Some(id_token), Some(refresh_token)) = (self.id_token, self.refresh_token) else {
            return Err(AuthError::Api(
                "Refresh response did not include an active session".to_string(),
            ));
        };
        let mut user = previous_user.clone();
        if let Some(user_id) = self.user_id {
            user.id = user_id;
        }
        Ok(AuthSession {
            id_token,
            refresh_token,
            expires_at,
            user,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(expires_at: i64) -> AuthSession {
        AuthSession {
            id_token: "secret-id-token".to_string(),
            refresh_token: "secret-refresh-token".to_string(),
            expires_at,
            user: AuthUser {
                id: "user".to_string(),
                email: None,
                provider: SignInProvider::Anonymous,
            },
        }
    }

    #[test]
    fn sign_up_response_builds_session() {
        let response: IdentityToolkitResponse = serde_json::from_str(
            r#"{"kind":"identitytoolkit#SignupNewUserResponse","idToken":"id","refreshToken":"rt","expiresIn":"3600","localId":"uid-1"}"#,
        )
        .unwrap();
        let session = response.into_session(SignInProvider::Anonymous).unwrap();
        assert_eq!(session.user.id, "uid-1");
        assert_eq!(session.user.provider, SignInProvider::Anonymous);
        assert!(!session.is_expired());
    }

    #[test]
    fn incomplete_sign_in_response_is_rejected() {
        let response: IdentityToolkitResponse =
            serde_json::from_str(r#"{"idToken":"id","expiresIn":"3600"}"#).unwrap();
        assert!(matches!(
            response.into_session(SignInProvider::Google),
            Err(AuthError::Api(_))
        ));
    }

    #[test]
    fn refresh_response_keeps_user_details() {
        let mut previous = session(0).user;
        previous.email = Some("reader@example.com".to_string());
        previous.provider = SignInProvider::Google;
        let response: SecureTokenResponse = serde_json::from_str(
            r#"{"id_token":"new","refresh_token":"rt2","expires_in":"3600","user_id":"user"}"#,
        )
        .unwrap();

        let refreshed = response.into_session(&previous).unwrap();
        assert_eq!(refreshed.id_token, "new");
        assert_eq!(refreshed.user, previous);
    }

    #[test]
    fn invalid_expires_in_is_an_api_error() {
        assert!(matches!(
            parse_expires_in(Some("soon")),
            Err(AuthError::Api(_))
        ));
        assert!(parse_expires_in(None).is_err());
    }

    #[test]
    fn session_expiry_uses_skew() {
        let now = unix_timestamp_now();
        assert!(session(now + 30).is_expired());
        assert!(!session(now + 3_600).is_expired());
    }

    #[test]
    fn debug_output_redacts_tokens() {
        let rendered = format!("{:?}", session(1_700_000_000));
        assert!(!rendered.contains("secret-id-token"));
        assert!(!rendered.contains("secret-refresh-token"));
        assert!(rendered.contains("[REDACTED]"));

        let identity = format!("{:?}", session(0).identity());
        assert!(!identity.contains("secret-id-token"));
    }

    #[test]
    fn client_rejects_blank_api_key_and_bad_urls() {
        let store = MemorySessionStore::default();
        assert!(IdentityToolkitClient::new(IdentityToolkitConfig::new("  "), store.clone()).is_err());

        let config = IdentityToolkitConfig::new("key")
            .with_endpoints(Some("identity.local".to_string()), None);
        assert!(matches!(
            IdentityToolkitClient::new(config, store),
            Err(AuthError::InvalidConfiguration(_))
        ));
    }

    #[tokio::test]
    async fn restore_returns_fresh_session_without_network() {
        let store = MemorySessionStore::default();
        let stored = session(unix_timestamp_now() + 3_600);
        store.save_session(&stored).unwrap();
        let client = IdentityToolkitClient::new(IdentityToolkitConfig::new("key"), store).unwrap();

        let identity = client.ensure_signed_in().await.unwrap();
        assert_eq!(identity.id, "user");
        assert_eq!(identity.token.as_deref(), Some("secret-id-token"));
    }

    #[test]
    fn sign_out_clears_stored_session() {
        let store = MemorySessionStore::default();
        store.save_session(&session(0)).unwrap();
        let client =
            IdentityToolkitClient::new(IdentityToolkitConfig::new("key"), store.clone()).unwrap();

        client.sign_out().unwrap();
        assert!(store.load_session().unwrap().is_none());
    }
}
