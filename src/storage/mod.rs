//! Object storage for run artifacts (visualization JPEGs, history JSON).
//! A filesystem store is the default; a GCS-backed store uploads to a bucket
//! through the JSON media endpoint.

mod gcs;

pub use gcs::GcsObjectStore;

use std::fs;
use std::path::PathBuf;

use crate::error::StorageError;

/// Destination for run artifacts, keyed by bucket-style object names like
/// `exp/images/epoch_3.jpg`.
pub trait ObjectStore {
    fn put_bytes(&self, key: &str, bytes: &[u8], content_type: &str) -> Result<(), StorageError>;
}

/// Which store the drivers write to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Fs,
    Gcs,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    /// GCS bucket name (gcs backend only).
    pub bucket: String,
    /// Root directory mirroring the bucket layout (fs backend only).
    pub local_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        StorageConfig {
            backend: StorageBackend::Fs,
            bucket: String::new(),
            local_dir: PathBuf::from("./artifacts"),
        }
    }
}

impl StorageConfig {
    pub fn build(&self) -> Result<Box<dyn ObjectStore>, StorageError> {
        match self.backend {
            StorageBackend::Fs => Ok(Box::new(FsObjectStore::new(self.local_dir.clone()))),
            StorageBackend::Gcs => Ok(Box::new(GcsObjectStore::from_env(self.bucket.clone())?)),
        }
    }
}

/// Writes objects under a local root, creating parent directories as needed.
pub struct FsObjectStore {
    root: PathBuf,
}

impl FsObjectStore {
    pub fn new(root: PathBuf) -> Self {
        FsObjectStore { root }
    }
}

impl ObjectStore for FsObjectStore {
    fn put_bytes(&self, key: &str, bytes: &[u8], _content_type: &str) -> Result<(), StorageError> {
        let path = self.root.join(key);
        let write = || -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, bytes)
        };
        write().map_err(|e| StorageError::Write {
            key: key.to_string(),
            source: e,
        })
    }
}
