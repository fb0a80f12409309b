//! Directory-backed content-addressed blob store.
//!
//! Content is written to `<root>/<sha256-hex>` through a uniquely named staging
//! file in the same directory. Refs are validated before any path is built from
//! them, so a foreign ref can never escape `root`.

use super::{content_address, BlobError, BlobResult, BlobStore};
use crate::model::catalog::ContentRef;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

static CONTENT_REF_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9a-f]{64}$").expect("valid content ref regex"));

#[derive(Debug, Clone)]
pub struct DirBlobStore {
    root: PathBuf,
}

impl DirBlobStore {
    /// Creates the store, creating `root` when missing.
    pub fn open(root: impl AsRef<Path>) -> std::io::Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn blob_path(&self, content_ref: &ContentRef) -> Option<PathBuf> {
        if !CONTENT_REF_RE.is_match(content_ref.as_str()) {
            return None;
        }
        Some(self.root.join(content_ref.as_str()))
    }
}

impl BlobStore for DirBlobStore {
    fn put(&self, file_name: &str, bytes: &[u8]) -> BlobResult<ContentRef> {
        let content_ref = content_address(bytes);
        let final_path = self.root.join(content_ref.as_str());
        if final_path.exists() {
            return Ok(content_ref);
        }

        // Staging name is unique per call; `persist` is an atomic rename.
        let write = || -> std::io::Result<()> {
            let mut staged = NamedTempFile::new_in(&self.root)?;
            staged.write_all(bytes)?;
            staged.as_file().sync_all()?;
            staged.persist(&final_path).map_err(|err| err.error)?;
            Ok(())
        };

        write().map_err(|err| BlobError::UploadFailed {
            file_name: file_name.to_string(),
            reason: err.to_string(),
        })?;
        Ok(content_ref)
    }

    fn get(&self, content_ref: &ContentRef) -> BlobResult<Vec<u8>> {
        let path = self
            .blob_path(content_ref)
            .ok_or_else(|| BlobError::DownloadFailed {
                content_ref: content_ref.clone(),
                reason: "malformed content ref".to_string(),
            })?;

        fs::read(path).map_err(|err| BlobError::DownloadFailed {
            content_ref: content_ref.clone(),
            reason: err.to_string(),
        })
    }
}
