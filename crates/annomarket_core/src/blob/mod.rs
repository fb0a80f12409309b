//! Blob store seam for raw dataset content.
//!
//! # Responsibility
//! - Define the `put`/`get` contract the settlement engine consumes.
//! - Provide an in-memory store and a directory-backed content-addressed store.
//!
//! # Invariants
//! - The core persists only the `ContentRef` returned by `put`.
//! - Blob calls are made outside any database transaction.

use crate::model::catalog::ContentRef;
use sha2::{Digest, Sha256};
use std::error::Error;
use std::fmt::{Display, Formatter};

mod dir;
mod memory;

pub use dir::DirBlobStore;
pub use memory::MemoryBlobStore;

pub type BlobResult<T> = Result<T, BlobError>;

/// Blob transfer failure.
#[derive(Debug)]
pub enum BlobError {
    UploadFailed { file_name: String, reason: String },
    DownloadFailed { content_ref: ContentRef, reason: String },
}

impl Display for BlobError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UploadFailed { file_name, reason } => {
                write!(f, "failed to upload `{file_name}`: {reason}")
            }
            Self::DownloadFailed {
                content_ref,
                reason,
            } => write!(f, "failed to download `{content_ref}`: {reason}"),
        }
    }
}

impl Error for BlobError {}

/// Content store consumed by ingestion (upload) and annotation (download).
pub trait BlobStore {
    fn put(&self, file_name: &str, bytes: &[u8]) -> BlobResult<ContentRef>;
    fn get(&self, content_ref: &ContentRef) -> BlobResult<Vec<u8>>;
}

impl<T: BlobStore + ?Sized> BlobStore for &T {
    fn put(&self, file_name: &str, bytes: &[u8]) -> BlobResult<ContentRef> {
        (**self).put(file_name, bytes)
    }

    fn get(&self, content_ref: &ContentRef) -> BlobResult<Vec<u8>> {
        (**self).get(content_ref)
    }
}

/// SHA-256 hex digest used as content address by the bundled stores.
pub fn content_address(bytes: &[u8]) -> ContentRef {
    ContentRef::new(format!("{:x}", Sha256::digest(bytes)))
}
