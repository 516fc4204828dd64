//! In-memory blob store, used by tests.

use std::collections::BTreeMap;
use std::sync::Mutex;

use crate::error::StorageError;
use crate::storage::{BlobStore, ObjectMeta, check_key};

/// In-memory blob store.
#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        self.objects.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl BlobStore for MemoryBlobStore {
    fn head(&self, key: &str) -> Result<Option<ObjectMeta>, StorageError> {
        check_key(key)?;
        Ok(self.lock().get(key).map(|data| ObjectMeta {
            key: key.to_string(),
            size: data.len() as u64,
        }))
    }

    fn list_prefix(&self, prefix: &str) -> Result<Vec<ObjectMeta>, StorageError> {
        Ok(self
            .lock()
            .range(prefix.to_string()..)
            .take_while(|(k, _)| k.starts_with(prefix))
            .map(|(k, v)| ObjectMeta {
                key: k.clone(),
                size: v.len() as u64,
            })
            .collect())
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        check_key(key)?;
        self.lock()
            .get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                key: key.to_string(),
            })
    }

    fn put(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        check_key(key)?;
        self.lock().insert(key.to_string(), data.to_vec());
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
