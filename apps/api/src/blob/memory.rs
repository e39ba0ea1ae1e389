//! In-memory `BlobStore` used by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::{BlobError, BlobStore};

#[derive(Default)]
pub struct MemoryBlobStore {
    objects: Mutex<HashMap<String, Bytes>>,
    /// Uploads whose path contains this fragment fail.
    pub reject_paths_containing: Mutex<Option<String>>,
    /// Uploads never complete.
    pub hang_uploads: AtomicBool,
}

impl MemoryBlobStore {
    pub fn paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.objects().keys().cloned().collect();
        paths.sort();
        paths
    }

    pub fn reject_uploads_matching(&self, fragment: &str) {
        *self
            .reject_paths_containing
            .lock()
            .expect("blob mutex poisoned") = Some(fragment.to_string());
    }

    fn objects(&self) -> std::sync::MutexGuard<'_, HashMap<String, Bytes>> {
        self.objects.lock().expect("blob mutex poisoned")
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload(
        &self,
        path: &str,
        bytes: Bytes,
        _content_type: &str,
    ) -> Result<String, BlobError> {
        if self.hang_uploads.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        let rejected = self
            .reject_paths_containing
            .lock()
            .expect("blob mutex poisoned")
            .as_deref()
            .is_some_and(|fragment| path.contains(fragment));
        if rejected {
            return Err(BlobError::Upload {
                path: path.to_string(),
                message: "bucket rejected object".to_string(),
            });
        }
        self.objects().insert(path.to_string(), bytes);
        Ok(path.to_string())
    }

    async fn remove(&self, paths: &[String]) -> Result<(), BlobError> {
        let mut objects = self.objects();
        for path in paths {
            objects.remove(path);
        }
        Ok(())
    }

    async fn signed_url(&self, path: &str, ttl: Duration) -> Result<String, BlobError> {
        if !self.objects().contains_key(path) {
            return Err(BlobError::Sign {
                path: path.to_string(),
                message: "object not found".to_string(),
            });
        }
        Ok(format!(
            "https://blobs.test/{path}?expires_in={}",
            ttl.as_secs()
        ))
    }
}
