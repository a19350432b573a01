//! Durable key-value storage for authentication state.
//!
//! This module provides the `AuthStorage` for persisting the three blobs a
//! page reload needs to resume a session:
//! - the signed token string
//! - the resolved `User`
//! - the session activity state (`PersistedSession`)
//!
//! Each entry is a JSON file in the storage directory. Writes go through a
//! temporary file and a rename so a reader never sees a partial blob.

pub mod manager;

pub use manager::{AuthStorage, PersistedSession};
