//! Ember Store is an embedded, file-backed Key-Value (KV) data store.
//!
//! A single process opens one data file, holds the whole dataset in memory as a
//! nested JSON tree, and rewrites the full dataset to disk on every mutation.
//! Values are addressed with dot paths (`"users.42.coins"`).
//!
//! ## Core Components
//! - [`engine`]: The storage engine (codec, schema, persistence, store).
//! - [`config`]: Construction-time configuration.
//!
//! ## Persisted format
//! The file holds a versioned envelope `{"version": 1, "data": {...}}`, either as
//! plain JSON or, when an encryption key is configured, as a hex string that
//! decrypts (AES-256-GCM) to that JSON.

pub mod config;
pub mod engine;

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

pub use config::StoreConfig;
pub use engine::{
    Envelope, FieldSpec, LoggingObserver, QueryEntry, Schema, SharedStore, Store, StoreObserver,
};

/// Errors returned by the Ember Store.
#[derive(Error, Debug)]
pub enum Error {
    /// The store configuration is invalid (empty path, empty encryption key, bad schema).
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    /// An I/O error occurred while reading or writing a store file.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// The payload does not decode to a `{version, data}` envelope.
    #[error("corrupt payload: {0}")]
    CorruptPayload(String),
    /// The configured key could not decrypt the payload.
    #[error("decryption failed (wrong key, truncated or tampered data)")]
    DecryptionFailure,
    /// A schema field marked required is absent from the loaded data.
    #[error("required key missing: {0}")]
    RequiredKeyMissing(String),
    /// A dot path cannot be applied to the existing tree (e.g. a non-index segment on an array).
    #[error("invalid path: {0}")]
    InvalidPath(String),
    /// Envelope versions start at 1.
    #[error("invalid version: {0}")]
    InvalidVersion(u64),
    /// Error during JSON serialization.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// An internal error occurred.
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for Ember Store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Defines basic read operations for the store.
#[async_trait]
pub trait KVReader: Send + Sync {
    /// Retrieves the value at a dot path, or `None` when any segment is missing.
    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>>;
    /// Checks whether a top-level key exists. Does not traverse dot paths.
    async fn has(&self, key: &str) -> Result<bool>;
}

/// Defines basic write and delete operations for the store.
#[async_trait]
pub trait KVWriter: Send + Sync {
    /// Stores a value at a dot path and persists the dataset.
    async fn set(&self, key: &str, value: serde_json::Value) -> Result<()>;
    /// Deletes the entry at a dot path, if present, and persists the dataset.
    async fn delete(&self, key: &str) -> Result<()>;
}

/// Copies the store to and from snapshot files.
#[async_trait]
pub trait Snapshotter: Send + Sync {
    /// Writes the current encoded envelope to `path`.
    async fn backup(&self, path: &Path) -> Result<()>;
    /// Replaces the live dataset with the envelope stored at `path`.
    async fn restore(&self, path: &Path) -> Result<()>;
}
