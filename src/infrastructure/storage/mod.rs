use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use time::OffsetDateTime;

pub mod local;
#[cfg(test)]
pub mod memory;
pub mod s3;

/// Metadata of an object that already exists in storage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredArtifact {
    pub cache_control: String,
    pub created_at: OffsetDateTime,
}

/// Metadata attached to an object when it is written.
#[derive(Debug, Clone, Default)]
pub struct WriteInfo {
    pub cache_control: String,
    pub content_type: String,
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("object '{0}' not found")]
    NotFound(String),

    #[error("storage operation on '{key}' failed: {message}")]
    Backend { key: String, message: String },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn backend(key: &str, err: impl std::fmt::Display) -> Self {
        Self::Backend {
            key: key.to_string(),
            message: err.to_string(),
        }
    }
}

#[async_trait]
pub trait Storage: Send + Sync {
    /// Metadata for `key`, or `None` when nothing is stored there.
    async fn info(&self, key: &str) -> Result<Option<StoredArtifact>, StorageError>;

    async fn read(&self, key: &str) -> Result<Bytes, StorageError>;

    /// Overwrites whatever is stored at `key`.
    async fn write(&self, key: &str, data: Bytes, info: &WriteInfo) -> Result<(), StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Public URL clients are redirected to.
    fn object_url(&self, key: &str) -> String;
}

/// Joins a public host and a key with exactly one slash between them.
pub fn join_url(host: &str, key: &str) -> String {
    format!("{}/{}", host.trim().trim_end_matches('/'), key.trim_start_matches('/'))
}
