//! The user's book lists: liked books and the reading list.
//!
//! SYSTEM CONTEXT
//! ==============
//! Each list is a local store over a fixed key. The stores impose no
//! uniqueness or ordering rules; [`add_book`] and [`remove_book`] are the
//! application-level helpers that keep a list free of duplicate ids.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::local_store::create_local_store;
use crate::reactive::Reactive;
use crate::storage::{KeyValueStore, StoreError};

pub const LIKED_BOOKS_KEY: &str = "likedBooks";
pub const READLIST_BOOKS_KEY: &str = "readlistBooks";

/// A book as the app stores it. Fields it does not know about are kept in
/// `extra` so they survive a round trip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_date: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Book {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: None,
            authors: Vec::new(),
            thumbnail: None,
            published_date: None,
            extra: serde_json::Map::new(),
        }
    }

    #[must_use]
    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn with_authors(mut self, authors: Vec<String>) -> Self {
        self.authors = authors;
        self
    }
}

impl fmt::Display for Book {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)?;
        if let Some(title) = &self.title {
            write!(f, "  {title}")?;
        }
        if !self.authors.is_empty() {
            write!(f, " ({})", self.authors.join(", "))?;
        }
        Ok(())
    }
}

// =============================================================================
// LIST KIND
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Liked,
    Readlist,
}

impl ListKind {
    /// Storage key backing this list.
    #[must_use]
    pub fn key(self) -> &'static str {
        match self {
            Self::Liked => LIKED_BOOKS_KEY,
            Self::Readlist => READLIST_BOOKS_KEY,
        }
    }
}

impl fmt::Display for ListKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Liked => "liked",
            Self::Readlist => "readlist",
        })
    }
}

impl FromStr for ListKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "liked" => Ok(Self::Liked),
            "readlist" => Ok(Self::Readlist),
            other => Err(format!("unknown list `{other}` (expected `liked` or `readlist`)")),
        }
    }
}

// =============================================================================
// LIBRARY
// =============================================================================

/// Both book lists, each mirrored into durable storage.
#[derive(Debug, Clone)]
pub struct Library {
    liked: Reactive<Vec<Book>>,
    readlist: Reactive<Vec<Book>>,
}

impl Library {
    /// Open both lists over `storage`, starting empty when nothing is stored.
    ///
    /// # Errors
    ///
    /// Fails if either stored list does not decode or storage is unavailable.
    pub fn open(storage: &Arc<dyn KeyValueStore>) -> Result<Self, StoreError> {
        let liked = create_local_store(Arc::clone(storage), LIKED_BOOKS_KEY, Vec::new())?;
        let readlist = create_local_store(Arc::clone(storage), READLIST_BOOKS_KEY, Vec::new())?;
        Ok(Self { liked, readlist })
    }

    #[must_use]
    pub fn liked(&self) -> &Reactive<Vec<Book>> {
        &self.liked
    }

    #[must_use]
    pub fn readlist(&self) -> &Reactive<Vec<Book>> {
        &self.readlist
    }

    #[must_use]
    pub fn list(&self, kind: ListKind) -> &Reactive<Vec<Book>> {
        match kind {
            ListKind::Liked => &self.liked,
            ListKind::Readlist => &self.readlist,
        }
    }
}

/// Append `book` unless a book with the same id is already in `list`.
/// Returns whether the list changed.
///
/// # Errors
///
/// Propagates write-back failures.
pub fn add_book(list: &Reactive<Vec<Book>>, book: Book) -> Result<bool, StoreError> {
    let current = list.get();
    if current.iter().any(|b| b.id == book.id) {
        return Ok(false);
    }
    let mut next = current;
    next.push(book);
    list.set(next)?;
    Ok(true)
}

/// Remove every book with `id` from `list`. Returns whether the list changed.
///
/// # Errors
///
/// Propagates write-back failures.
pub fn remove_book(list: &Reactive<Vec<Book>>, id: &str) -> Result<bool, StoreError> {
    let current = list.get();
    let next: Vec<Book> = current.iter().filter(|b| b.id != id).cloned().collect();
    if next.len() == current.len() {
        return Ok(false);
    }
    list.set(next)?;
    Ok(true)
}

#[cfg(test)]
#[path = "library_test.rs"]
mod tests;
