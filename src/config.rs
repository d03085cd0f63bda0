//! Application configuration parsed from environment variables.

use std::path::PathBuf;
use std::time::Duration;

use crate::storage::DEFAULT_QUOTA_BYTES;

pub const DEFAULT_DATA_DIR: &str = ".readahead";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

const IDENTITY_TOOLKIT_HOST: &str = "identitytoolkit.googleapis.com";
const SECURE_TOKEN_HOST: &str = "securetoken.googleapis.com";
const FIRESTORE_HOST: &str = "firestore.googleapis.com";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required config: env var {var} not set")]
    Missing { var: &'static str },

    #[error("invalid value for {var}: {value:?}")]
    Invalid { var: &'static str, value: String },
}

/// Firebase web-app project settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirebaseConfig {
    pub api_key: String,
    pub auth_domain: String,
    pub project_id: String,
    pub storage_bucket: String,
    pub messaging_sender_id: String,
    pub app_id: String,
    pub measurement_id: Option<String>,
}

impl FirebaseConfig {
    /// Minimal config for a project; derived fields follow Firebase defaults.
    #[must_use]
    pub fn new(api_key: impl Into<String>, project_id: impl Into<String>) -> Self {
        let project_id = project_id.into();
        Self {
            api_key: api_key.into(),
            auth_domain: format!("{project_id}.firebaseapp.com"),
            storage_bucket: format!("{project_id}.appspot.com"),
            messaging_sender_id: String::new(),
            app_id: String::new(),
            measurement_id: None,
            project_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub request_secs: u64,
    pub connect_secs: u64,
}

impl HttpTimeouts {
    #[must_use]
    pub fn request(self) -> Duration {
        Duration::from_secs(self.request_secs)
    }

    #[must_use]
    pub fn connect(self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self { request_secs: DEFAULT_REQUEST_TIMEOUT_SECS, connect_secs: DEFAULT_CONNECT_TIMEOUT_SECS }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub firebase: FirebaseConfig,
    pub data_dir: PathBuf,
    pub storage_quota_bytes: usize,
    pub timeouts: HttpTimeouts,
    /// `host:port` of a local Auth emulator, replacing the Google endpoints.
    pub auth_emulator_host: Option<String>,
    /// `host:port` of a local Firestore emulator.
    pub firestore_emulator_host: Option<String>,
}

impl AppConfig {
    /// Build typed config from environment variables.
    ///
    /// Required:
    /// - `FIREBASE_API_KEY`
    /// - `FIREBASE_PROJECT_ID`
    ///
    /// Optional:
    /// - `FIREBASE_AUTH_DOMAIN`, `FIREBASE_STORAGE_BUCKET`: derived from the project id
    /// - `FIREBASE_MESSAGING_SENDER_ID`, `FIREBASE_APP_ID`, `FIREBASE_MEASUREMENT_ID`
    /// - `FIREBASE_AUTH_EMULATOR_HOST`, `FIRESTORE_EMULATOR_HOST`
    /// - `READAHEAD_DATA_DIR`: default `.readahead`
    /// - `READAHEAD_STORAGE_QUOTA_BYTES`: default 5 MiB
    /// - `READAHEAD_REQUEST_TIMEOUT_SECS`: default 30
    /// - `READAHEAD_CONNECT_TIMEOUT_SECS`: default 10
    ///
    /// # Errors
    ///
    /// Returns an error if a required variable is missing or a numeric one
    /// does not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`AppConfig::from_env`] with an explicit variable source.
    ///
    /// # Errors
    ///
    /// See [`AppConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |var: &str| lookup(var).filter(|v| !v.trim().is_empty());
        let required = |var: &'static str| get(var).ok_or(ConfigError::Missing { var });

        let mut firebase = FirebaseConfig::new(required("FIREBASE_API_KEY")?, required("FIREBASE_PROJECT_ID")?);
        if let Some(domain) = get("FIREBASE_AUTH_DOMAIN") {
            firebase.auth_domain = domain;
        }
        if let Some(bucket) = get("FIREBASE_STORAGE_BUCKET") {
            firebase.storage_bucket = bucket;
        }
        firebase.messaging_sender_id = get("FIREBASE_MESSAGING_SENDER_ID").unwrap_or_default();
        firebase.app_id = get("FIREBASE_APP_ID").unwrap_or_default();
        firebase.measurement_id = get("FIREBASE_MEASUREMENT_ID");

        let parse = |var: &'static str, default: u64| -> Result<u64, ConfigError> {
            match get(var) {
                None => Ok(default),
                Some(raw) => raw.trim().parse().map_err(|_| ConfigError::Invalid { var, value: raw }),
            }
        };

        let quota = parse("READAHEAD_STORAGE_QUOTA_BYTES", DEFAULT_QUOTA_BYTES as u64)?;
        let storage_quota_bytes = usize::try_from(quota)
            .map_err(|_| ConfigError::Invalid { var: "READAHEAD_STORAGE_QUOTA_BYTES", value: quota.to_string() })?;

        Ok(Self {
            firebase,
            data_dir: get("READAHEAD_DATA_DIR").map_or_else(|| PathBuf::from(DEFAULT_DATA_DIR), PathBuf::from),
            storage_quota_bytes,
            timeouts: HttpTimeouts {
                request_secs: parse("READAHEAD_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS)?,
                connect_secs: parse("READAHEAD_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS)?,
            },
            auth_emulator_host: get("FIREBASE_AUTH_EMULATOR_HOST"),
            firestore_emulator_host: get("FIRESTORE_EMULATOR_HOST"),
        })
    }

    /// Base URL of the Identity Toolkit API (`.../v1`).
    #[must_use]
    pub fn identity_toolkit_url(&self) -> String {
        match &self.auth_emulator_host {
            Some(host) => format!("{}/{IDENTITY_TOOLKIT_HOST}/v1", emulator_origin(host)),
            None => format!("https://{IDENTITY_TOOLKIT_HOST}/v1"),
        }
    }

    /// Base URL of the Secure Token API (`.../v1`).
    #[must_use]
    pub fn secure_token_url(&self) -> String {
        match &self.auth_emulator_host {
            Some(host) => format!("{}/{SECURE_TOKEN_HOST}/v1", emulator_origin(host)),
            None => format!("https://{SECURE_TOKEN_HOST}/v1"),
        }
    }

    /// Root of the project's default Firestore database documents.
    #[must_use]
    pub fn firestore_documents_url(&self) -> String {
        let origin = match &self.firestore_emulator_host {
            Some(host) => emulator_origin(host),
            None => format!("https://{FIRESTORE_HOST}"),
        };
        format!("{origin}/v1/projects/{}/databases/(default)/documents", self.firebase.project_id)
    }
}

/// Emulator hosts are given as `host:port`; accept a full origin too.
fn emulator_origin(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_owned()
    } else {
        format!("http://{host}")
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
pub mod test_helpers {
    use super::*;

    /// Config pointing every REST client at `origin` (an in-process server).
    #[must_use]
    pub fn config_for(origin: &str, data_dir: &std::path::Path) -> AppConfig {
        AppConfig {
            firebase: FirebaseConfig::new("test-key", "demo-readahead"),
            data_dir: data_dir.to_path_buf(),
            storage_quota_bytes: DEFAULT_QUOTA_BYTES,
            timeouts: HttpTimeouts { request_secs: 5, connect_secs: 2 },
            auth_emulator_host: Some(origin.to_owned()),
            firestore_emulator_host: Some(origin.to_owned()),
        }
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;
