use std::path::{Path, PathBuf};
use crate::engine::Schema;
use crate::{Error, Result};

/// Everything needed to open a [`Store`](crate::Store).
#[derive(Clone)]
pub struct StoreConfig {
    /// The data file. Created on first open.
    pub path: PathBuf,
    /// Keys filled in (or demanded) when the store opens.
    pub schema: Schema,
    /// Passphrase for encryption at rest. `None` stores plain JSON.
    pub encryption_key: Option<String>,
}

impl StoreConfig {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            schema: Schema::default(),
            encryption_key: None,
        }
    }

    #[must_use]
    pub fn with_schema(mut self, schema: Schema) -> Self {
        self.schema = schema;
        self
    }

    #[must_use]
    pub fn with_encryption_key(mut self, key: impl Into<String>) -> Self {
        self.encryption_key = Some(key.into());
        self
    }

    /// Checks the configuration without touching the filesystem.
    pub fn validate(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(Error::InvalidConfiguration("path must not be empty".to_string()));
        }
        if let Some(key) = &self.encryption_key {
            if key.trim().is_empty() {
                return Err(Error::InvalidConfiguration(
                    "encryption key must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

impl std::fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StoreConfig")
            .field("path", &self.path)
            .field("schema", &self.schema)
            .field("encryption_key", &self.encryption_key.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}
