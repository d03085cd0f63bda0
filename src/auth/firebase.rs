//! Firebase Authentication over its REST API.
//!
//! DESIGN
//! ======
//! Email/password sign-up and sign-in go to the Identity Toolkit API; token
//! refresh goes to the Secure Token API. The resulting session (identity plus
//! tokens) is persisted in the shared key-value store under the same key the
//! Firebase web SDK uses, so a restart resumes the signed-in user.
//!
//! Auth state lives in a [`Reactive`], which gives `on_auth_state_changed`
//! its delivery rules for free: immediate delivery on subscribe, then every
//! change in emission order. [`FirebaseAuth::initialize`] is the "initial
//! state resolution" notification.
//!
//! ERROR HANDLING
//! ==============
//! API errors carry Firebase's error code (`INVALID_PASSWORD`,
//! `EMAIL_EXISTS`, ...). Nothing is retried. A session is only emitted after
//! it has been persisted.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{AuthError, AuthService, Identity};
use crate::config::AppConfig;
use crate::reactive::{Listener, Reactive, Subscription};
use crate::storage::{KeyValueStore, StoreError};

/// Refresh the ID token this long before it actually expires.
const EXPIRY_MARGIN_SECS: u64 = 30;

/// Persisted sign-in state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user: Identity,
    pub id_token: String,
    pub refresh_token: String,
    /// Unix seconds at which `id_token` expires.
    pub expires_at: u64,
}

impl Session {
    #[must_use]
    pub fn is_expired(&self, now: u64) -> bool {
        self.expires_at <= now.saturating_add(EXPIRY_MARGIN_SECS)
    }
}

/// Storage key for the persisted session of the app using `api_key`.
#[must_use]
pub fn session_key(api_key: &str) -> String {
    format!("firebase:authUser:{api_key}:[DEFAULT]")
}

// =============================================================================
// CLIENT
// =============================================================================

pub struct FirebaseAuth {
    http: reqwest::Client,
    api_key: String,
    identity_url: String,
    token_url: String,
    storage: Arc<dyn KeyValueStore>,
    session: Mutex<Option<Session>>,
    state: Reactive<Option<Identity>>,
}

impl FirebaseAuth {
    /// Build a client for the project in `config`. Starts signed out until
    /// [`FirebaseAuth::initialize`] resolves the persisted session.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(config: &AppConfig, storage: Arc<dyn KeyValueStore>) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeouts.request())
            .connect_timeout(config.timeouts.connect())
            .build()
            .map_err(|e| AuthError::HttpClientBuild(e.to_string()))?;
        Ok(Self {
            http,
            api_key: config.firebase.api_key.clone(),
            identity_url: config.identity_toolkit_url(),
            token_url: config.secure_token_url(),
            storage,
            session: Mutex::new(None),
            state: Reactive::new(None),
        })
    }

    /// Load the persisted session, if any, and announce the resulting state.
    ///
    /// # Errors
    ///
    /// Fails if the stored session does not decode, storage is unavailable,
    /// or a state listener fails.
    pub fn initialize(&self) -> Result<Option<Identity>, AuthError> {
        let key = session_key(&self.api_key);
        let session = match self.storage.get(&key)? {
            Some(raw) if !raw.is_empty() => Some(
                serde_json::from_str::<Session>(&raw).map_err(|source| StoreError::Deserialization { key, source })?,
            ),
            _ => None,
        };

        let user = session.as_ref().map(|s| s.user.clone());
        *self.lock_session() = session;
        info!(uid = user.as_ref().map(|u| u.uid.as_str()), "auth state resolved");
        self.state.set(user.clone())?;
        Ok(user)
    }

    /// The signed-in user, if any.
    #[must_use]
    pub fn current_user(&self) -> Option<Identity> {
        self.state.get()
    }

    /// The current session, if any.
    #[must_use]
    pub fn session(&self) -> Option<Session> {
        self.lock_session().clone()
    }

    /// Create an email/password account and sign it in.
    ///
    /// # Errors
    ///
    /// Returns `Api` with Firebase's code (e.g. `EMAIL_EXISTS`) on rejection.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let url = format!("{}/accounts:signUp?key={}", self.identity_url, self.api_key);
        let resp: PasswordResponse =
            self.post_json(&url, &PasswordRequest { email, password, return_secure_token: true }).await?;
        self.establish(resp.into_session(unix_now())?)
    }

    /// Sign in with email and password.
    ///
    /// # Errors
    ///
    /// Returns `Api` with Firebase's code (e.g. `INVALID_PASSWORD`) on rejection.
    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> Result<Identity, AuthError> {
        let url = format!("{}/accounts:signInWithPassword?key={}", self.identity_url, self.api_key);
        let resp: PasswordResponse =
            self.post_json(&url, &PasswordRequest { email, password, return_secure_token: true }).await?;
        self.establish(resp.into_session(unix_now())?)
    }

    /// Exchange the refresh token for a new ID token. Listeners are notified
    /// again with the (unchanged) identity.
    ///
    /// # Errors
    ///
    /// Returns `NotSignedIn` without a session, or the API failure.
    pub async fn refresh(&self) -> Result<Identity, AuthError> {
        let current = self.session().ok_or(AuthError::NotSignedIn)?;
        let url = format!("{}/token?key={}", self.token_url, self.api_key);

        let response = self
            .http
            .post(&url)
            .form(&[("grant_type", "refresh_token"), ("refresh_token", current.refresh_token.as_str())])
            .send()
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;
        let resp: RefreshResponse = read_response(response).await?;

        let session = Session {
            user: current.user,
            id_token: resp.id_token,
            refresh_token: resp.refresh_token,
            expires_at: unix_now().saturating_add(parse_expires_in(&resp.expires_in)?),
        };
        debug!(uid = %session.user.uid, "refreshed id token");
        self.establish(session)
    }

    /// A currently valid ID token, refreshing first if it is about to expire.
    ///
    /// # Errors
    ///
    /// Returns `NotSignedIn` without a session, or the refresh failure.
    pub async fn id_token(&self) -> Result<String, AuthError> {
        let session = self.session().ok_or(AuthError::NotSignedIn)?;
        if !session.is_expired(unix_now()) {
            return Ok(session.id_token);
        }
        self.refresh().await?;
        self.session().map(|s| s.id_token).ok_or(AuthError::NotSignedIn)
    }

    /// Forget the session and announce the signed-out state.
    ///
    /// # Errors
    ///
    /// Fails if the persisted session cannot be removed or a listener fails.
    pub fn sign_out(&self) -> Result<(), AuthError> {
        self.storage.remove(&session_key(&self.api_key))?;
        *self.lock_session() = None;
        info!("signed out");
        self.state.set(None)?;
        Ok(())
    }

    fn establish(&self, session: Session) -> Result<Identity, AuthError> {
        let key = session_key(&self.api_key);
        let raw = serde_json::to_string(&session)
            .map_err(|source| StoreError::Serialization { key: key.clone(), source })?;
        self.storage.set(&key, &raw)?;

        let user = session.user.clone();
        *self.lock_session() = Some(session);
        info!(uid = %user.uid, "signed in");
        self.state.set(Some(user.clone()))?;
        Ok(user)
    }

    async fn post_json<B, R>(&self, url: &str, body: &B) -> Result<R, AuthError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .http
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| AuthError::Request(e.to_string()))?;
        read_response(response).await
    }

    fn lock_session(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl AuthService for FirebaseAuth {
    fn on_auth_state_changed(&self, listener: Listener<Option<Identity>>) -> Result<Subscription, AuthError> {
        Ok(self.state.subscribe_listener(listener)?)
    }
}

impl std::fmt::Debug for FirebaseAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebaseAuth")
            .field("identity_url", &self.identity_url)
            .field("token_url", &self.token_url)
            .field("current_user", &self.state.get())
            .finish_non_exhaustive()
    }
}

// =============================================================================
// WIRE TYPES
// =============================================================================

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

/// Shared shape of `accounts:signUp` and `accounts:signInWithPassword`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    profile_picture: Option<String>,
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

impl PasswordResponse {
    fn into_session(self, now: u64) -> Result<Session, AuthError> {
        let expires_in = parse_expires_in(&self.expires_in)?;
        Ok(Session {
            user: Identity {
                uid: self.local_id,
                email: non_empty(self.email),
                display_name: non_empty(self.display_name),
                photo_url: non_empty(self.profile_picture),
                email_verified: false,
            },
            id_token: self.id_token,
            refresh_token: self.refresh_token,
            expires_at: now.saturating_add(expires_in),
        })
    }
}

/// Secure Token API answers in snake case.
#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

async fn read_response<R: DeserializeOwned>(response: reqwest::Response) -> Result<R, AuthError> {
    let status = response.status().as_u16();
    let text = response
        .text()
        .await
        .map_err(|e| AuthError::Request(e.to_string()))?;

    if !(200..300).contains(&status) {
        return Err(AuthError::Api { status, message: parse_error_message(&text) });
    }
    serde_json::from_str(&text).map_err(|e| AuthError::Parse(e.to_string()))
}

/// Firebase error code from an error body, or the raw body if it has none.
fn parse_error_message(body: &str) -> String {
    serde_json::from_str::<ErrorEnvelope>(body).map_or_else(|_| body.trim().to_owned(), |e| e.error.message)
}

fn parse_expires_in(raw: &str) -> Result<u64, AuthError> {
    raw.trim()
        .parse()
        .map_err(|_| AuthError::Parse(format!("invalid expiresIn: {raw:?}")))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}

#[cfg(test)]
#[path = "firebase_test.rs"]
mod tests;
