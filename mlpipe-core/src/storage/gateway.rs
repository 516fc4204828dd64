//! `StorageGateway`: the blob operations the pipeline and predictor use.
//!
//! Remote stores may be eventually consistent: an object written by `put_file`
//! is not guaranteed to be visible to an immediately following `exists`.

use std::path::Path;
use std::sync::Arc;

use sha2::{Digest, Sha256};

use crate::data::table::Table;
use crate::error::{PipelineError, StorageError};
use crate::storage::BlobStore;
use crate::training::model::TrainedModel;

/// A located object in the gateway's bucket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobHandle {
    pub bucket: String,
    pub key: String,
    pub size: u64,
}

/// Bucket-scoped facade over an injected [`BlobStore`].
#[derive(Clone)]
pub struct StorageGateway {
    store: Arc<dyn BlobStore>,
    bucket_name: String,
}

impl StorageGateway {
    pub fn new(store: Arc<dyn BlobStore>, bucket_name: impl Into<String>) -> Self {
        Self {
            store,
            bucket_name: bucket_name.into(),
        }
    }

    pub fn bucket_name(&self) -> &str {
        &self.bucket_name
    }

    /// Whether any object's key starts with `key`.
    pub fn exists(&self, key: &str) -> Result<bool, StorageError> {
        Ok(!self.store.list_prefix(key)?.is_empty())
    }

    /// Locate an object; fails with `NotFound` when absent.
    pub fn get_object(&self, key: &str) -> Result<BlobHandle, StorageError> {
        let meta = self
            .store
            .head(key)?
            .ok_or_else(|| StorageError::NotFound {
                key: key.to_string(),
            })?;
        Ok(BlobHandle {
            bucket: self.bucket_name.clone(),
            key: meta.key,
            size: meta.size,
        })
    }

    pub fn read_as_bytes(&self, handle: &BlobHandle) -> Result<Vec<u8>, StorageError> {
        self.store.get(&handle.key)
    }

    /// Parse an object as a CSV table.
    pub fn read_as_table(&self, handle: &BlobHandle) -> Result<Table, StorageError> {
        let bytes = self.read_as_bytes(handle)?;
        Table::from_reader(bytes.as_slice()).map_err(|source| StorageError::Table {
            key: handle.key.clone(),
            source,
        })
    }

    /// Upload a local file under `key`, deleting the local copy when `remove_local` is set.
    pub fn put_file(
        &self,
        local: &Path,
        key: &str,
        remove_local: bool,
    ) -> Result<BlobHandle, StorageError> {
        let data = std::fs::read(local).map_err(|e| StorageError::io(key, e))?;
        self.store.put(key, &data)?;
        tracing::info!(
            bucket = %self.bucket_name,
            key,
            bytes = data.len(),
            sha256 = %format!("{:x}", Sha256::digest(&data)),
            "Uploaded file to blob store"
        );
        if remove_local {
            std::fs::remove_file(local).map_err(|e| StorageError::io(key, e))?;
        }
        Ok(BlobHandle {
            bucket: self.bucket_name.clone(),
            key: key.to_string(),
            size: data.len() as u64,
        })
    }

    /// Upload a table as CSV under `key`.
    pub fn put_table(&self, table: &Table, key: &str) -> Result<BlobHandle, StorageError> {
        let data = table.to_csv_bytes().map_err(|source| StorageError::Table {
            key: key.to_string(),
            source,
        })?;
        self.store.put(key, &data)?;
        Ok(BlobHandle {
            bucket: self.bucket_name.clone(),
            key: key.to_string(),
            size: data.len() as u64,
        })
    }

    /// Create a zero-byte `<name>/` folder marker unless one already exists.
    pub fn create_folder(&self, name: &str) -> Result<(), StorageError> {
        let marker = format!("{}/", name.trim_end_matches('/'));
        if self.store.head(&marker)?.is_some() {
            tracing::debug!(folder = %marker, "Folder already exists");
            return Ok(());
        }
        self.store.put(&marker, &[])
    }

    /// Download and deserialize a model envelope.
    pub fn load_model(&self, key: &str) -> Result<TrainedModel, PipelineError> {
        let handle = self.get_object(key)?;
        let bytes = self.read_as_bytes(&handle)?;
        let model = TrainedModel::from_bytes(&bytes)?;
        tracing::debug!(key, model = %model, "Loaded model from blob store");
        Ok(model)
    }
}
