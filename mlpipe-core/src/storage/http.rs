//! Remote blob store reached over plain HTTP(S).
//!
//! Objects live at `{endpoint}/{bucket}/{key}`; `HEAD`, `GET` and `PUT` map
//! directly onto the store operations. Requests carry the access key pair as
//! basic-auth credentials and are never retried.

use std::time::Duration;

use reqwest::StatusCode;
use reqwest::blocking::{Client, RequestBuilder, Response};

use crate::config::StorageCredentials;
use crate::error::StorageError;
use crate::storage::{BlobStore, ObjectMeta, check_key};

pub struct HttpBlobStore {
    client: Client,
    base_url: String,
    credentials: StorageCredentials,
}

impl HttpBlobStore {
    pub fn new(
        endpoint: &str,
        bucket: &str,
        credentials: StorageCredentials,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: format!("{}/{}", endpoint.trim_end_matches('/'), bucket),
            credentials,
        })
    }

    fn url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }

    fn send(&self, key: &str, request: RequestBuilder) -> Result<Response, StorageError> {
        request
            .basic_auth(
                &self.credentials.access_key_id,
                Some(&self.credentials.secret_access_key),
            )
            .send()
            .map_err(|source| StorageError::Http {
                key: key.to_string(),
                source,
            })
    }
}

fn status_error(key: &str, status: StatusCode) -> StorageError {
    if status == StatusCode::NOT_FOUND {
        StorageError::NotFound {
            key: key.to_string(),
        }
    } else {
        StorageError::Status {
            key: key.to_string(),
            status: status.as_u16(),
        }
    }
}

impl BlobStore for HttpBlobStore {
    fn head(&self, key: &str) -> Result<Option<ObjectMeta>, StorageError> {
        check_key(key)?;
        let response = self.send(key, self.client.head(self.url(key)))?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            s if s.is_success() => Ok(Some(ObjectMeta {
                key: key.to_string(),
                size: response.content_length().unwrap_or(0),
            })),
            s => Err(status_error(key, s)),
        }
    }

    /// Plain HTTP has no listing call, so a prefix matches when either the
    /// exact key or its folder marker exists.
    fn list_prefix(&self, prefix: &str) -> Result<Vec<ObjectMeta>, StorageError> {
        let exact = prefix.to_string();
        let folder = format!("{}/", prefix.trim_end_matches('/'));
        let mut found = Vec::new();
        for candidate in [exact, folder] {
            if found.iter().any(|m: &ObjectMeta| m.key == candidate) || check_key(&candidate).is_err()
            {
                continue;
            }
            if let Some(meta) = self.head(&candidate)? {
                found.push(meta);
            }
        }
        found.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(found)
    }

    fn get(&self, key: &str) -> Result<Vec<u8>, StorageError> {
        check_key(key)?;
        let response = self.send(key, self.client.get(self.url(key)))?;
        if !response.status().is_success() {
            return Err(status_error(key, response.status()));
        }
        response
            .bytes()
            .map(|b| b.to_vec())
            .map_err(|source| StorageError::Http {
                key: key.to_string(),
                source,
            })
    }

    fn put(&self, key: &str, data: &[u8]) -> Result<(), StorageError> {
        check_key(key)?;
        let response = self.send(key, self.client.put(self.url(key)).body(data.to_vec()))?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(status_error(key, response.status()))
        }
    }

    fn backend_name(&self) -> &'static str {
        "http"
    }
}
