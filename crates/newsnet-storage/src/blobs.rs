//! Content-addressed media files
//!
//! Sideloaded images land here under their BLAKE3 hash, so the same image
//! distributed twice occupies one file.

use std::fmt;
use std::io::ErrorKind;
use std::path::PathBuf;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument, warn};

use newsnet_core::StorageError;

use crate::error::io;

/// Address of a stored media file: its BLAKE3 digest and length
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContentRef {
    pub digest: [u8; 32],
    pub size: u64,
}

impl ContentRef {
    pub fn from_data(data: &[u8]) -> Self {
        Self {
            digest: *blake3::hash(data).as_bytes(),
            size: data.len() as u64,
        }
    }

    pub fn digest_hex(&self) -> String {
        hex::encode(self.digest)
    }

    /// Eight hex digits, enough to tell files apart in logs
    pub fn short(&self) -> String {
        hex::encode(&self.digest[..4])
    }
}

impl fmt::Display for ContentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.short(), self.size)
    }
}

/// Layout and limits of the media directory
#[derive(Debug, Clone)]
pub struct BlobStoreConfig {
    /// Base directory for media files
    pub base_dir: PathBuf,
    /// Number of two-char shard directories above each file
    pub shard_depth: u8,
    /// Largest accepted file (bytes)
    pub max_blob_size: u64,
}

impl Default for BlobStoreConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("./data/uploads"),
            shard_depth: 2,
            max_blob_size: 32 * 1024 * 1024, // 32MB
        }
    }
}

impl BlobStoreConfig {
    pub fn in_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: data_dir.into().join("uploads"),
            ..Default::default()
        }
    }

    pub fn with_max_blob_size(mut self, bytes: u64) -> Self {
        self.max_blob_size = bytes;
        self
    }
}

/// Content-addressed file store
pub struct BlobStore {
    config: BlobStoreConfig,
}

impl BlobStore {
    pub async fn new(config: BlobStoreConfig) -> Result<Self, StorageError> {
        fs::create_dir_all(&config.base_dir).await.map_err(io)?;
        debug!(dir = %config.base_dir.display(), "Media directory ready");
        Ok(Self { config })
    }

    /// Write `data` unless an identical file is already present
    #[instrument(skip(self, data), fields(bytes = data.len()))]
    pub async fn put(&self, data: &[u8]) -> Result<ContentRef, StorageError> {
        if data.len() as u64 > self.config.max_blob_size {
            return Err(StorageError::io(format!(
                "media of {} bytes exceeds the {} byte limit",
                data.len(),
                self.config.max_blob_size
            )));
        }

        let content_ref = ContentRef::from_data(data);
        let path = self.path_of(&content_ref);
        if fs::try_exists(&path).await.map_err(io)? {
            debug!(digest = %content_ref.short(), "Media already stored");
            return Ok(content_ref);
        }

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.map_err(io)?;
        }

        let partial = path.with_extension("part");
        let mut file = File::create(&partial).await.map_err(io)?;
        file.write_all(data).await.map_err(io)?;
        file.sync_all().await.map_err(io)?;
        fs::rename(&partial, &path).await.map_err(io)?;

        debug!(digest = %content_ref.short(), "Media stored");
        Ok(content_ref)
    }

    /// Read a file back, checking it against its digest
    pub async fn read(&self, content_ref: &ContentRef) -> Result<Bytes, StorageError> {
        let data = fs::read(self.path_of(content_ref)).await.map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                StorageError::not_found(content_ref.digest_hex())
            } else {
                io(e)
            }
        })?;

        let actual = ContentRef::from_data(&data);
        if actual.digest != content_ref.digest {
            warn!(
                expected = %content_ref.digest_hex(),
                actual = %actual.digest_hex(),
                "Stored media is corrupt"
            );
            return Err(StorageError::Deserialization("media digest mismatch".into()));
        }
        Ok(Bytes::from(data))
    }

    /// Path of a file relative to the base directory, e.g. `ab/cd/abcd...`
    pub fn relative_path(&self, content_ref: &ContentRef) -> String {
        let hex = content_ref.digest_hex();
        let mut parts: Vec<&str> = (0..self.config.shard_depth as usize)
            .map(|i| &hex[i * 2..i * 2 + 2])
            .collect();
        parts.push(&hex);
        parts.join("/")
    }

    fn path_of(&self, content_ref: &ContentRef) -> PathBuf {
        self.config.base_dir.join(self.relative_path(content_ref))
    }
}
