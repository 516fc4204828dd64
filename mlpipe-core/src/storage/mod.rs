//! Blob storage: the `BlobStore` backends and the `StorageGateway` facade.
//!
//! A store is scoped to one bucket. Keys are `/`-separated; a key ending in
//! `/` is a folder marker with an empty body.

pub mod fs;
pub mod gateway;
pub mod http;
pub mod memory;

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::{StorageBackend, StorageCredentials, StorageSettings};
use crate::error::{ConfigError, StorageError};

pub use fs::FsBlobStore;
pub use gateway::{BlobHandle, StorageGateway};
pub use http::HttpBlobStore;
pub use memory::MemoryBlobStore;

/// Key and size of a stored object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMeta {
    pub key: String,
    pub size: u64,
}

/// Minimal object-store operations the gateway is built on.
pub trait BlobStore: Send + Sync {
    /// Metadata of `key`, or `None` when absent.
    fn head(&self, key: &str) -> Result<Option<ObjectMeta>, StorageError>;

    /// Every object whose key starts with `prefix`, sorted by key.
    fn list_prefix(&self, prefix: &str) -> Result<Vec<ObjectMeta>, StorageError>;

    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError>;

    fn put(&self, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Short backend name for logs.
    fn backend_name(&self) -> &'static str;
}

/// Reject keys that are empty, absolute or escape the bucket.
pub(crate) fn check_key(key: &str) -> Result<(), StorageError> {
    let invalid = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|part| part == ".." || part == ".");
    if invalid {
        Err(StorageError::InvalidKey {
            key: key.to_string(),
        })
    } else {
        Ok(())
    }
}

/// Build the configured backend and wrap it in a gateway.
///
/// The `http` backend reads its credentials from the environment.
pub fn connect(settings: &StorageSettings) -> Result<StorageGateway, ConfigError> {
    let store: Arc<dyn BlobStore> = match settings.backend {
        StorageBackend::Fs => Arc::new(FsBlobStore::new(settings.root.join(&settings.bucket_name))),
        StorageBackend::Http => {
            let endpoint = settings.endpoint.as_deref().ok_or_else(|| {
                ConfigError::invalid("storage.endpoint is required for the http backend")
            })?;
            let credentials = StorageCredentials::from_env()?;
            Arc::new(
                HttpBlobStore::new(
                    endpoint,
                    &settings.bucket_name,
                    credentials,
                    std::time::Duration::from_secs(settings.timeout_secs),
                )
                .map_err(|e| ConfigError::invalid(format!("http blob store: {e}")))?,
            )
        }
    };
    tracing::debug!(
        backend = store.backend_name(),
        bucket = %settings.bucket_name,
        "Blob store connected"
    );
    Ok(StorageGateway::new(store, settings.bucket_name.clone()))
}
