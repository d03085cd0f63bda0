//! Signed-in identity and the mirror that tracks it.
//!
//! SYSTEM CONTEXT
//! ==============
//! Anything identity-aware (sync commands, `whoami`) reads the user from an
//! [`AuthMirror`] instead of asking the auth backend directly. The backend
//! sits behind [`AuthService`]; [`firebase::FirebaseAuth`] is the production
//! implementation.
//!
//! DESIGN
//! ======
//! The mirror subscribes once and copies each notification into its own
//! reactive value as-is: no filtering, no coalescing, no teardown. Errors
//! raised while a notification is delivered are not handled here; they
//! return to whatever call made the service emit.

pub mod firebase;

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::reactive::{Listener, Reactive, Subscription};
use crate::storage::StoreError;

/// A signed-in principal as reported by the auth service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub uid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub email_verified: bool,
}

impl Identity {
    #[must_use]
    pub fn new(uid: impl Into<String>) -> Self {
        Self { uid: uid.into(), email: None, display_name: None, photo_url: None, email_verified: false }
    }
}

/// Errors produced by auth operations.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The HTTP request to the auth API failed.
    #[error("auth request failed: {0}")]
    Request(String),

    /// The auth API answered with an error.
    #[error("auth API error: status {status}: {message}")]
    Api { status: u16, message: String },

    /// The auth API response body could not be decoded.
    #[error("auth response parse failed: {0}")]
    Parse(String),

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),

    /// The operation needs a signed-in user and there is none.
    #[error("no user is signed in")]
    NotSignedIn,

    /// Session persistence or a state listener failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Source of auth-state notifications.
pub trait AuthService: Send + Sync {
    /// Register `listener`. It is called at least once with the current
    /// state, then again on every sign-in, sign-out and token refresh.
    ///
    /// # Errors
    ///
    /// Returns the listener's failure on the initial delivery.
    fn on_auth_state_changed(&self, listener: Listener<Option<Identity>>) -> Result<Subscription, AuthError>;
}

// =============================================================================
// MIRROR
// =============================================================================

/// Reactive copy of the auth service's current user.
#[derive(Debug, Clone)]
pub struct AuthMirror {
    current_user: Reactive<Option<Identity>>,
}

impl AuthMirror {
    /// Start mirroring `service`. The mirror begins at `None` and then takes
    /// whatever the service delivers on subscription.
    ///
    /// # Errors
    ///
    /// Propagates a failure of the service's initial delivery.
    pub fn attach(service: &dyn AuthService) -> Result<Self, AuthError> {
        let current_user = Reactive::new(None);
        let target = current_user.clone();
        let _subscription = service.on_auth_state_changed(Arc::new(move |identity: &Option<Identity>| {
            debug!(uid = identity.as_ref().map(|i| i.uid.as_str()), "auth state changed");
            target.set(identity.clone())
        }))?;
        Ok(Self { current_user })
    }

    /// The shared reactive value. Subscribe to observe identity changes.
    #[must_use]
    pub fn current_user(&self) -> &Reactive<Option<Identity>> {
        &self.current_user
    }

    /// The identity right now.
    #[must_use]
    pub fn snapshot(&self) -> Option<Identity> {
        self.current_user.get()
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================


#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
