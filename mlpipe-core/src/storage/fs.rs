//! Directory-backed blob store. One directory per bucket.

use std::io;
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::error::StorageError;
use crate::persistence;
use crate::storage::{BlobStore, ObjectMeta, check_key};

/// File holding a folder marker's (empty) body.
const FOLDER_MARKER: &str = ".folder";

pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn object_path(&self, key: &str) -> Result<PathBuf, StorageError> {
        check_key(key)?;
        Ok(match key.strip_suffix('/') {
            Some(folder) => self.root.join(folder).join(FOLDER_MARKER),
            None => self.root.join(key),
        })
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let rel = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        let (last, dirs) = parts.split_last()?;
        if last == FOLDER_MARKER {
            Some(format!("{}/", dirs.join("/")))
        } else if last.ends_with(".tmp") {
            None
        } else {
            Some(parts.join("/"))
        }
    }
}

impl BlobStore for FsBlobStore {
    fn head(&self, key: &str) -> Result<Option<ObjectMeta>, StorageError> {
        let path = self.object_path(key)?;
        match std::fs::metadata(&path) {
            Ok(meta) if meta.is_file() => Ok(Some(ObjectMeta {
                key: key.to_string(),
                size: meta.len(),
            })),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::io(key, e)),
        }
    }

    fn list_prefix(&self, prefix: &str) -> Result<Vec<ObjectMeta>, StorageError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut objects = Vec::new();
        for entry in WalkDir::new(&self.root) {
            let entry = entry.map_err(|e| StorageError::io(prefix, io::Error::other(e)))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(key) = self.key_for(entry.path()) else {
                continue;
            };
            if key.starts_with(prefix) {
                let size = entry
                    .metadata()
                    .map(|m| m.len())
                    .map_err(|e| StorageError::io(&key, io::Error::other(e)))?;
                objects.push(ObjectMeta { key, size });
            }
        }
        objects.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(objects)
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        let path = self.object_path(key)?;
        std::fs::read(&path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                StorageError::NotFound {
                    key: key.to_string(),
                }
            } else {
                StorageError::io(key, e)
            }
        })
    }

    fn put(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        let path = self.object_path(key)?;
        persistence::atomic_write(&path, data).map_err(|e| StorageError::io(key, e))
    }

    fn backend_name(&self) -> &'static str {
        "fs"
    }
}
