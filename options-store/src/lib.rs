//! Key-value store for site options.
//!
//! Every option is a single JSON value that is read and replaced as a whole.
//! There are no partial updates and no compare-and-swap: callers that need a
//! read-modify-write cycle serialize it themselves.

pub mod config;
mod filesystem;
mod memory;

use async_trait::async_trait;
use serde_json::Value;
use std::io;
use std::sync::Arc;

pub use filesystem::FilesystemOptionsStore;
pub use memory::InMemoryOptionsStore;

#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("invalid option key: {0:?}")]
    InvalidKey(String),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("could not encode or decode option value: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("storage task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

#[async_trait]
pub trait OptionsStore: Send + Sync {
    /// Returns the stored value, or `None` if the option was never set.
    async fn get(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Replaces the whole value of `key`.
    async fn set(&self, key: &str, value: Value) -> Result<(), StoreError>;

    /// Removes `key`. Removing a missing key is not an error.
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
}

/// Builds the store selected in the configuration.
pub fn from_config(
    store_config: &config::OptionsStoreConfig,
) -> Result<Arc<dyn OptionsStore>, StoreError> {
    match store_config {
        config::OptionsStoreConfig::Memory => {
            tracing::warn!("options are kept in memory and will be lost on restart");
            Ok(Arc::new(InMemoryOptionsStore::new()))
        }
        config::OptionsStoreConfig::Filesystem { path } => {
            Ok(Arc::new(FilesystemOptionsStore::new(path)?))
        }
    }
}

/// Option keys are used as file names by some backends.
pub(crate) fn validate_key(key: &str) -> Result<(), StoreError> {
    let valid = !key.is_empty()
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}
