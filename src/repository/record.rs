//! Persisted per-document state shared by the repository implementations.

use super::{BlobInfo, DocumentInfo, DocumentRef, Permission, version_label};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Everything a repository knows about a document except blob bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct DocumentRecord {
    pub title: String,

    pub creator: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_title: Option<String>,

    /// Principal -> permission.
    #[serde(default)]
    pub grants: BTreeMap<String, Permission>,

    /// Holder of the repository's own document lock.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub native_lock: Option<String>,

    #[serde(default)]
    pub major: u32,

    #[serde(default)]
    pub minor: u32,

    /// Modified since the last snapshot.
    #[serde(default)]
    pub modified: bool,

    /// Labels of recorded snapshots, oldest first.
    #[serde(default)]
    pub versions: Vec<String>,

    /// Content field -> blob metadata.
    #[serde(default)]
    pub blobs: BTreeMap<String, BlobInfo>,
}

impl DocumentRecord {
    pub fn new(title: impl Into<String>, creator: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            creator: creator.into(),
            parent_title: None,
            grants: BTreeMap::new(),
            native_lock: None,
            major: 0,
            minor: 0,
            modified: false,
            versions: Vec::new(),
            blobs: BTreeMap::new(),
        }
    }

    pub fn info(&self, doc_ref: DocumentRef) -> DocumentInfo {
        DocumentInfo {
            doc_ref,
            title: self.title.clone(),
            creator: self.creator.clone(),
            parent_title: self.parent_title.clone(),
            version_label: version_label(self.major, self.minor, self.modified),
        }
    }

    /// A fresh document in the same folder with the same grants.
    pub fn sibling(&self, title: &str, creator: &str) -> Self {
        let mut record = Self::new(title, creator);
        record.parent_title = self.parent_title.clone();
        record.grants = self.grants.clone();
        record
    }

    pub fn acquire_native_lock(&mut self, owner: &str) -> Option<String> {
        match &self.native_lock {
            Some(holder) => Some(holder.clone()),
            None => {
                self.native_lock = Some(owner.to_string());
                None
            }
        }
    }

    pub fn release_native_lock(&mut self, owner: &str) -> bool {
        if self.native_lock.as_deref() == Some(owner) {
            self.native_lock = None;
            true
        } else {
            false
        }
    }

    pub fn can_write(&self, principal: &str) -> bool {
        self.grants
            .get(principal)
            .is_some_and(|permission| permission.can_write())
    }

    /// Record a minor version of the current state.
    pub fn snapshot(&mut self) -> String {
        self.minor += 1;
        self.modified = false;
        let label = version_label(self.major, self.minor, false);
        self.versions.push(label.clone());
        label
    }

    pub fn set_blob(&mut self, xpath: &str, blob: BlobInfo) {
        self.blobs.insert(xpath.to_string(), blob);
        self.modified = true;
    }
}
