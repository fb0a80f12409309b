//! In-process blob store with failure injection.

use super::{content_address, BlobError, BlobResult, BlobStore};
use crate::model::catalog::ContentRef;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Content-addressed store kept in memory.
///
/// Uploads of file names registered via [`MemoryBlobStore::fail_uploads_of`]
/// fail, which lets callers exercise per-item upload failures.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    blobs: Mutex<HashMap<ContentRef, Vec<u8>>>,
    failing_uploads: Mutex<HashSet<String>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every future upload of `file_name` fail.
    pub fn fail_uploads_of(&self, file_name: impl Into<String>) {
        if let Ok(mut failing) = self.failing_uploads.lock() {
            failing.insert(file_name.into());
        }
    }

    /// Drops stored content so later downloads of `content_ref` fail.
    pub fn evict(&self, content_ref: &ContentRef) -> bool {
        match self.blobs.lock() {
            Ok(mut blobs) => blobs.remove(content_ref).is_some(),
            Err(_) => false,
        }
    }

    pub fn len(&self) -> usize {
        self.blobs.lock().map(|blobs| blobs.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl BlobStore for MemoryBlobStore {
    fn put(&self, file_name: &str, bytes: &[u8]) -> BlobResult<ContentRef> {
        let upload_failed = |reason: &str| BlobError::UploadFailed {
            file_name: file_name.to_string(),
            reason: reason.to_string(),
        };

        let failing = self
            .failing_uploads
            .lock()
            .map_err(|_| upload_failed("store lock poisoned"))?;
        if failing.contains(file_name) {
            return Err(upload_failed("upload rejected by store"));
        }
        drop(failing);

        let content_ref = content_address(bytes);
        self.blobs
            .lock()
            .map_err(|_| upload_failed("store lock poisoned"))?
            .insert(content_ref.clone(), bytes.to_vec());
        Ok(content_ref)
    }

    fn get(&self, content_ref: &ContentRef) -> BlobResult<Vec<u8>> {
        let download_failed = |reason: &str| BlobError::DownloadFailed {
            content_ref: content_ref.clone(),
            reason: reason.to_string(),
        };

        self.blobs
            .lock()
            .map_err(|_| download_failed("store lock poisoned"))?
            .get(content_ref)
            .cloned()
            .ok_or_else(|| download_failed("content not found"))
    }
}
