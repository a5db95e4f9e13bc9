//! Document repository collaborator.
//!
//! The lock engine never persists documents itself. It reaches the
//! repository through [`DocumentRepository`]: document lookup, blob I/O,
//! the repository's own exclusive document lock, write permission and
//! version snapshots.
//!
//! Two implementations ship with the crate:
//! - [`MemoryRepository`]: process-local, used by tests and embedders
//! - [`FsRepository`]: one directory per document under `.wopilock/docs/`

mod fs;
mod memory;
mod record;

pub use fs::FsRepository;
pub use memory::{DocumentSpec, MemoryRepository, SeedBlob};

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reference to one document of one repository.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct DocumentRef {
    /// Repository name.
    pub repository: String,

    /// Document id, unique within the repository.
    pub doc_id: String,
}

impl DocumentRef {
    pub fn new(repository: impl Into<String>, doc_id: impl Into<String>) -> Self {
        Self {
            repository: repository.into(),
            doc_id: doc_id.into(),
        }
    }
}

impl fmt::Display for DocumentRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.repository, self.doc_id)
    }
}

/// Metadata of a stored blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlobInfo {
    /// File name presented to editors.
    pub filename: String,

    /// MIME type, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,

    /// Content length in bytes.
    pub length: u64,
}

/// Document-level metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentInfo {
    pub doc_ref: DocumentRef,
    pub title: String,
    pub creator: String,
    /// Title of the containing folder, if any.
    pub parent_title: Option<String>,
    /// Version label such as `0.1` or `0.1+` (modified since the snapshot).
    pub version_label: String,
}

/// Access level granted to a principal on a document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    Read,
    ReadWrite,
}

impl Permission {
    pub fn can_write(self) -> bool {
        matches!(self, Permission::ReadWrite)
    }
}

impl FromStr for Permission {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "read" => Ok(Self::Read),
            "read_write" | "write" => Ok(Self::ReadWrite),
            other => Err(format!(
                "unknown permission '{}' (expected read or write)",
                other
            )),
        }
    }
}

/// Interface to the document store backing the WOPI host.
///
/// Every method is a single atomic step from the caller's point of view;
/// multi-step coordination (lock store + native lock) is the engine's job.
pub trait DocumentRepository: Send + Sync {
    /// Name of this repository, embedded in file ids.
    fn name(&self) -> &str;

    /// Look up a document. `Ok(None)` when it does not exist.
    fn document(&self, doc_id: &str) -> Result<Option<DocumentInfo>>;

    /// Content-field paths of `doc` that currently hold a blob.
    fn blob_fields(&self, doc: &DocumentRef) -> Result<Vec<String>>;

    /// Blob metadata of a content field, `Ok(None)` when the field is empty.
    fn blob(&self, doc: &DocumentRef, xpath: &str) -> Result<Option<BlobInfo>>;

    /// Read a blob's bytes.
    fn read_blob(&self, doc: &DocumentRef, xpath: &str) -> Result<Vec<u8>>;

    /// Replace a blob's bytes and file name.
    fn write_blob(
        &self,
        doc: &DocumentRef,
        xpath: &str,
        filename: &str,
        mime_type: Option<&str>,
        content: &[u8],
    ) -> Result<BlobInfo>;

    /// Change a blob's file name, keeping its bytes.
    fn rename_blob(&self, doc: &DocumentRef, xpath: &str, filename: &str) -> Result<BlobInfo>;

    /// Create a new document next to `source` (same folder and permissions)
    /// whose `xpath` field holds `content` named `filename`.
    fn create_document(
        &self,
        source: &DocumentRef,
        xpath: &str,
        filename: &str,
        content: &[u8],
    ) -> Result<DocumentRef>;

    /// Current holder of the document's native lock.
    fn native_lock(&self, doc: &DocumentRef) -> Result<Option<String>>;

    /// Set the native lock to `owner` if the document is unlocked.
    ///
    /// Returns the previous holder: `None` when the lock was just taken,
    /// `Some(holder)` when it was already held (possibly by `owner`).
    fn acquire_native_lock(&self, doc: &DocumentRef, owner: &str) -> Result<Option<String>>;

    /// Clear the native lock if held by `owner`. Returns whether it was cleared.
    fn release_native_lock(&self, doc: &DocumentRef, owner: &str) -> Result<bool>;

    /// Whether `principal` may modify the document.
    fn can_write(&self, doc: &DocumentRef, principal: &str) -> Result<bool>;

    /// Record a version of the document before it is overwritten.
    /// Returns the label of the snapshot.
    fn snapshot_before_write(&self, doc: &DocumentRef) -> Result<String>;
}

/// Formats a `major.minor` label, with `+` when modified since the snapshot.
pub(crate) fn version_label(major: u32, minor: u32, modified: bool) -> String {
    format!("{}.{}{}", major, minor, if modified { "+" } else { "" })
}
