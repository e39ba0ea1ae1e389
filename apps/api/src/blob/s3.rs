use std::time::Duration;

use async_trait::async_trait;
use aws_sdk_s3::presigning::PresigningConfig;
use aws_sdk_s3::primitives::ByteStream;
use bytes::Bytes;
use tracing::info;

use super::{BlobError, BlobStore};

/// S3 / MinIO backed blob store.
#[derive(Clone)]
pub struct S3BlobStore {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3BlobStore {
    pub fn new(client: aws_sdk_s3::Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn upload(
        &self,
        path: &str,
        bytes: Bytes,
        content_type: &str,
    ) -> Result<String, BlobError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(path)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| BlobError::Upload {
                path: path.to_string(),
                message: e.to_string(),
            })?;

        info!("Uploaded s3://{}/{}", self.bucket, path);
        Ok(path.to_string())
    }

    async fn remove(&self, paths: &[String]) -> Result<(), BlobError> {
        for path in paths {
            self.client
                .delete_object()
                .bucket(&self.bucket)
                .key(path)
                .send()
                .await
                .map_err(|e| BlobError::Remove {
                    path: path.clone(),
                    message: e.to_string(),
                })?;
            info!("Removed s3://{}/{}", self.bucket, path);
        }
        Ok(())
    }

    async fn signed_url(&self, path: &str, ttl: Duration) -> Result<String, BlobError> {
        let sign_error = |message: String| BlobError::Sign {
            path: path.to_string(),
            message,
        };

        let config = PresigningConfig::expires_in(ttl).map_err(|e| sign_error(e.to_string()))?;
        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(path)
            .presigned(config)
            .await
            .map_err(|e| sign_error(e.to_string()))?;

        Ok(request.uri().to_string())
    }
}
