//! Object storage boundary. Documents are never served by public URL; callers mint a
//! time-limited signed URL on demand.

pub mod s3;

#[cfg(test)]
pub mod memory;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BlobError {
    #[error("upload of {path} failed: {message}")]
    Upload { path: String, message: String },

    #[error("upload timed out after {0:?}")]
    Timeout(Duration),

    #[error("removing {path} failed: {message}")]
    Remove { path: String, message: String },

    #[error("signing {path} failed: {message}")]
    Sign { path: String, message: String },
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `bytes` under `path` and returns the stored path.
    async fn upload(&self, path: &str, bytes: Bytes, content_type: &str)
        -> Result<String, BlobError>;

    async fn remove(&self, paths: &[String]) -> Result<(), BlobError>;

    async fn signed_url(&self, path: &str, ttl: Duration) -> Result<String, BlobError>;
}
