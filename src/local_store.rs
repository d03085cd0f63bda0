//! Reactive values mirrored into durable storage.
//!
//! DESIGN
//! ======
//! The slot is read exactly once, when the store is created. From then on
//! data flows one way: every value the reactive container takes on is
//! encoded as JSON and written back under the same key. The write-back
//! listener never reads the slot, so a write can not feed the seed again.
//!
//! Two stores created over the same key each keep their own in-memory
//! value and overwrite each other's slot; there is no cross-instance
//! coordination.
//!
//! ERROR HANDLING
//! ==============
//! [`create_local_store`] fails on a slot that does not decode. Callers that
//! would rather start over use [`create_local_store_or_initial`].

use std::sync::Arc;

use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::reactive::Reactive;
use crate::storage::{KeyValueStore, StoreError};

/// Build a reactive value seeded from `key` (or `initial` when the slot is
/// empty) that writes every value back to `key`.
///
/// The seed itself is written back as part of construction.
///
/// # Errors
///
/// Returns `Deserialization` if the slot holds text that does not decode
/// into `T`, and any storage error raised by the read or the first write.
pub fn create_local_store<T>(storage: Arc<dyn KeyValueStore>, key: &str, initial: T) -> Result<Reactive<T>, StoreError>
where
    T: Serialize + DeserializeOwned + Clone + Send + 'static,
{
    let seed = read_slot(storage.as_ref(), key)?.unwrap_or(initial);
    attach(storage, key, seed)
}

/// Like [`create_local_store`], but a slot that does not decode is logged,
/// removed, and replaced by `initial`.
///
/// # Errors
///
/// Returns storage errors from the read, the removal, or the first write.
pub fn create_local_store_or_initial<T>(
    storage: Arc<dyn KeyValueStore>,
    key: &str,
    initial: T,
) -> Result<Reactive<T>, StoreError>
where
    T: Serialize + DeserializeOwned + Clone + Send + 'static,
{
    let seed = match read_slot(storage.as_ref(), key) {
        Ok(stored) => stored.unwrap_or(initial),
        Err(StoreError::Deserialization { source, .. }) => {
            warn!(key, error = %source, "discarding undecodable local store value");
            storage.remove(key)?;
            initial
        }
        Err(e) => return Err(e),
    };
    attach(storage, key, seed)
}

fn read_slot<T: DeserializeOwned>(storage: &dyn KeyValueStore, key: &str) -> Result<Option<T>, StoreError> {
    let Some(raw) = storage.get(key)? else {
        return Ok(None);
    };
    // An empty slot counts as absent.
    if raw.is_empty() {
        return Ok(None);
    }
    serde_json::from_str(&raw)
        .map(Some)
        .map_err(|source| StoreError::Deserialization { key: key.to_owned(), source })
}

fn write_slot<T: Serialize>(storage: &dyn KeyValueStore, key: &str, value: &T) -> Result<(), StoreError> {
    let raw =
        serde_json::to_string(value).map_err(|source| StoreError::Serialization { key: key.to_owned(), source })?;
    storage.set(key, &raw)?;
    debug!(key, bytes = raw.len(), "wrote local store value");
    Ok(())
}

fn attach<T>(storage: Arc<dyn KeyValueStore>, key: &str, seed: T) -> Result<Reactive<T>, StoreError>
where
    T: Serialize + Clone + Send + 'static,
{
    let store = Reactive::new(seed);
    let key = key.to_owned();
    // Write-back stays attached for the life of the store.
    let _write_back = store.subscribe(move |value: &T| write_slot(storage.as_ref(), &key, value))?;
    Ok(store)
}

#[cfg(test)]
#[path = "local_store_test.rs"]
mod tests;
