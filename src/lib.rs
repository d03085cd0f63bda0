//! Data-access layer for the readahead book tracker.
//!
//! ARCHITECTURE
//! ============
//! Everything the application reads or mutates is a [`reactive::Reactive`]
//! value kept in lockstep with an outside source of truth:
//!
//! - [`auth::AuthMirror`] mirrors the auth service's signed-in identity.
//! - [`local_store::create_local_store`] mirrors a value into a durable
//!   key-value slot ([`storage::KeyValueStore`]).
//!
//! [`context::AppContext`] builds these once at startup and owns them, along
//! with the REST clients for Firebase Auth and Firestore.

pub mod auth;
pub mod config;
pub mod context;
pub mod firestore;
pub mod library;
pub mod local_store;
pub mod reactive;
pub mod storage;

#[cfg(test)]
pub(crate) mod test_server;
