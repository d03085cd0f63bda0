//! Application context built once at startup.
//!
//! DESIGN
//! ======
//! `AppContext` owns every long-lived piece: the durable store, the auth
//! client and its mirror, the book lists and the document database client.
//! Construction order matters: the mirror attaches before the auth client
//! resolves its persisted session, so the mirror sees that resolution as an
//! ordinary notification.
//!
//! Push and pull copy both lists to and from the signed-in user's document
//! (`users/<uid>`). Pull replaces each local list that the document holds.

use std::sync::Arc;

use serde_json::{Value, json};
use tracing::info;

use crate::auth::firebase::FirebaseAuth;
use crate::auth::{AuthError, AuthMirror, Identity};
use crate::config::AppConfig;
use crate::firestore::{Firestore, FirestoreError};
use crate::library::{Book, LIKED_BOOKS_KEY, Library, READLIST_BOOKS_KEY};
use crate::storage::{FileStorage, KeyValueStore, StoreError};

#[derive(Debug, thiserror::Error)]
pub enum ContextError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Firestore(#[from] FirestoreError),

    #[error("sign in first")]
    NotSignedIn,

    #[error("remote document field `{field}` is not a book list: {source}")]
    InvalidDocument {
        field: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// What a pull changed locally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PullSummary {
    pub found: bool,
    pub liked: usize,
    pub readlist: usize,
}

pub struct AppContext {
    config: AppConfig,
    storage: Arc<dyn KeyValueStore>,
    auth: FirebaseAuth,
    mirror: AuthMirror,
    library: Library,
    firestore: Firestore,
}

impl AppContext {
    /// Build the context over file storage in `config.data_dir`.
    ///
    /// # Errors
    ///
    /// Fails if storage cannot be opened, a persisted value does not decode,
    /// or an HTTP client cannot be built.
    pub fn init(config: AppConfig) -> Result<Self, ContextError> {
        let storage: Arc<dyn KeyValueStore> =
            Arc::new(FileStorage::open(&config.data_dir, Some(config.storage_quota_bytes))?);
        Self::with_storage(config, storage)
    }

    /// Build the context over an explicit storage backend.
    ///
    /// # Errors
    ///
    /// See [`AppContext::init`].
    pub fn with_storage(config: AppConfig, storage: Arc<dyn KeyValueStore>) -> Result<Self, ContextError> {
        let auth = FirebaseAuth::new(&config, Arc::clone(&storage))?;
        let mirror = AuthMirror::attach(&auth)?;
        auth.initialize()?;
        let library = Library::open(&storage)?;
        let firestore = Firestore::new(&config)?;

        info!(
            project_id = %config.firebase.project_id,
            data_dir = %config.data_dir.display(),
            signed_in = mirror.snapshot().is_some(),
            "context ready"
        );
        Ok(Self { config, storage, auth, mirror, library, firestore })
    }

    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    #[must_use]
    pub fn storage(&self) -> &Arc<dyn KeyValueStore> {
        &self.storage
    }

    #[must_use]
    pub fn auth(&self) -> &FirebaseAuth {
        &self.auth
    }

    #[must_use]
    pub fn mirror(&self) -> &AuthMirror {
        &self.mirror
    }

    #[must_use]
    pub fn library(&self) -> &Library {
        &self.library
    }

    #[must_use]
    pub fn firestore(&self) -> &Firestore {
        &self.firestore
    }

    /// Upload both lists to the signed-in user's document.
    ///
    /// # Errors
    ///
    /// Returns `NotSignedIn` without a user, or the token/write failure.
    pub async fn push(&self) -> Result<(), ContextError> {
        let user = self.signed_in()?;
        let token = self.auth.id_token().await?;
        let liked = self.library.liked().get();
        let readlist = self.library.readlist().get();

        let data = json!({ LIKED_BOOKS_KEY: liked, READLIST_BOOKS_KEY: readlist });
        self.firestore.set_document(&user_document(&user), &data, Some(&token)).await?;
        info!(uid = %user.uid, liked = liked.len(), readlist = readlist.len(), "pushed book lists");
        Ok(())
    }

    /// Replace local lists with the ones stored in the user's document.
    ///
    /// # Errors
    ///
    /// Returns `NotSignedIn` without a user, `InvalidDocument` if a list field
    /// does not decode, or the token/read/write-back failure.
    pub async fn pull(&self) -> Result<PullSummary, ContextError> {
        let user = self.signed_in()?;
        let token = self.auth.id_token().await?;
        let Some(document) = self.firestore.get_document(&user_document(&user), Some(&token)).await? else {
            info!(uid = %user.uid, "no remote document to pull");
            return Ok(PullSummary::default());
        };

        // Decode both before touching either list.
        let liked = book_list(&document, LIKED_BOOKS_KEY)?;
        let readlist = book_list(&document, READLIST_BOOKS_KEY)?;

        let mut summary = PullSummary { found: true, ..PullSummary::default() };
        if let Some(books) = liked {
            summary.liked = books.len();
            self.library.liked().set(books)?;
        }
        if let Some(books) = readlist {
            summary.readlist = books.len();
            self.library.readlist().set(books)?;
        }
        info!(uid = %user.uid, liked = summary.liked, readlist = summary.readlist, "pulled book lists");
        Ok(summary)
    }

    fn signed_in(&self) -> Result<Identity, ContextError> {
        self.mirror.snapshot().ok_or(ContextError::NotSignedIn)
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("config", &self.config)
            .field("mirror", &self.mirror)
            .field("library", &self.library)
            .finish_non_exhaustive()
    }
}

fn user_document(user: &Identity) -> String {
    format!("users/{}", user.uid)
}

fn book_list(document: &Value, field: &'static str) -> Result<Option<Vec<Book>>, ContextError> {
    document
        .get(field)
        .map(|raw| serde_json::from_value(raw.clone()).map_err(|source| ContextError::InvalidDocument { field, source }))
        .transpose()
}

#[cfg(test)]
#[path = "context_test.rs"]
mod tests;
