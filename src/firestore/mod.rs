//! Firestore document access over the REST API.
//!
//! DESIGN
//! ======
//! Documents are read and written as plain JSON objects; [`value`] converts
//! to and from Firestore's typed encoding at the edge. Writes replace the
//! whole document (a `PATCH` without an update mask). Requests carry the
//! caller's ID token as a bearer token when one is given.

pub mod value;

use reqwest::StatusCode;
use serde_json::{Value, json};
use tracing::debug;

use crate::config::AppConfig;

/// Errors produced by Firestore operations.
#[derive(Debug, thiserror::Error)]
pub enum FirestoreError {
    /// The HTTP request to Firestore failed.
    #[error("firestore request failed: {0}")]
    Request(String),

    /// Firestore returned a non-success HTTP status.
    #[error("firestore API error: status {status}: {body}")]
    Api { status: u16, body: String },

    /// A response body was not the expected JSON.
    #[error("firestore response parse failed: {0}")]
    Parse(String),

    /// A plain JSON value has no lossless typed encoding.
    #[error("firestore value encode failed: {0}")]
    Encode(String),

    /// A typed value could not be converted to plain JSON.
    #[error("firestore value decode failed: {0}")]
    Decode(String),

    /// Documents must be JSON objects.
    #[error("document data must be a JSON object")]
    NotAnObject,

    /// The underlying HTTP client could not be constructed.
    #[error("HTTP client build failed: {0}")]
    HttpClientBuild(String),
}

pub struct Firestore {
    http: reqwest::Client,
    documents_url: String,
}

impl Firestore {
    /// Build a client for the default database of the configured project.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client fails to build.
    pub fn new(config: &AppConfig) -> Result<Self, FirestoreError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeouts.request())
            .connect_timeout(config.timeouts.connect())
            .build()
            .map_err(|e| FirestoreError::HttpClientBuild(e.to_string()))?;
        Ok(Self { http, documents_url: config.firestore_documents_url() })
    }

    /// Fetch the document at `path` (e.g. `users/u1`). `None` if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns request, API, or decode failures.
    pub async fn get_document(&self, path: &str, id_token: Option<&str>) -> Result<Option<Value>, FirestoreError> {
        let response = authorized(self.http.get(self.document_url(path)), id_token)
            .send()
            .await
            .map_err(|e| FirestoreError::Request(e.to_string()))?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!(path, "document not found");
            return Ok(None);
        }
        let body = read_body(response).await?;
        let fields = body.get("fields").cloned().unwrap_or_else(|| json!({}));
        value::decode_fields(&fields).map(Some)
    }

    /// Create or fully replace the document at `path` with `data`.
    ///
    /// # Errors
    ///
    /// Returns `NotAnObject` if `data` is not an object, `Encode` if a value
    /// has no lossless encoding, or request/API failures.
    pub async fn set_document(&self, path: &str, data: &Value, id_token: Option<&str>) -> Result<(), FirestoreError> {
        let fields = data.as_object().ok_or(FirestoreError::NotAnObject)?;
        let body = json!({ "fields": value::encode_fields(fields)? });

        let response = authorized(self.http.patch(self.document_url(path)), id_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| FirestoreError::Request(e.to_string()))?;
        read_body(response).await?;
        debug!(path, fields = fields.len(), "document written");
        Ok(())
    }

    /// Delete the document at `path`. Deleting a missing document succeeds.
    ///
    /// # Errors
    ///
    /// Returns request or API failures.
    pub async fn delete_document(&self, path: &str, id_token: Option<&str>) -> Result<(), FirestoreError> {
        let response = authorized(self.http.delete(self.document_url(path)), id_token)
            .send()
            .await
            .map_err(|e| FirestoreError::Request(e.to_string()))?;
        read_body(response).await?;
        debug!(path, "document deleted");
        Ok(())
    }

    fn document_url(&self, path: &str) -> String {
        format!("{}/{}", self.documents_url, path.trim_matches('/'))
    }
}

impl std::fmt::Debug for Firestore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Firestore")
            .field("documents_url", &self.documents_url)
            .finish_non_exhaustive()
    }
}

fn authorized(request: reqwest::RequestBuilder, id_token: Option<&str>) -> reqwest::RequestBuilder {
    match id_token {
        Some(token) => request.bearer_auth(token),
        None => request,
    }
}

async fn read_body(response: reqwest::Response) -> Result<Value, FirestoreError> {
    let status = response.status().as_u16();
    let text = response
        .text()
        .await
        .map_err(|e| FirestoreError::Request(e.to_string()))?;

    if !(200..300).contains(&status) {
        return Err(FirestoreError::Api { status, body: text });
    }
    if text.trim().is_empty() {
        return Ok(json!({}));
    }
    serde_json::from_str(&text).map_err(|e| FirestoreError::Parse(e.to_string()))
}

#[cfg(test)]
#[path = "mod_test.rs"]
mod tests;
