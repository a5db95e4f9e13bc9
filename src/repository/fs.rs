//! Filesystem-backed document repository.
//!
//! Layout under the repository root:
//!
//! ```text
//! <root>/<doc_id>/document.json      # DocumentRecord
//! <root>/<doc_id>/blobs/<field-key>  # blob bytes, key = base64url(xpath)
//! ```
//!
//! Manifest and blob writes go through [`atomic_write`]. Read-modify-write
//! cycles are serialized by an in-process mutex; concurrent processes
//! sharing a root are not coordinated.

use super::memory::DocumentSpec;
use super::record::DocumentRecord;
use super::{BlobInfo, DocumentInfo, DocumentRef, DocumentRepository};
use crate::error::{Result, WopiError};
use crate::fs::atomic_write;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

const MANIFEST_FILE: &str = "document.json";
const BLOBS_DIR: &str = "blobs";

/// Repository persisting each document as a directory.
pub struct FsRepository {
    name: String,
    root: PathBuf,
    guard: Mutex<()>,
}

impl FsRepository {
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            root: root.into(),
            guard: Mutex::new(()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Persist a new document and its blobs.
    ///
    /// Fails with `Config` when `doc_id` is not a safe directory name or
    /// already exists.
    pub fn add_document(&self, spec: DocumentSpec) -> Result<DocumentRef> {
        let doc_id = spec
            .doc_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
        if !is_valid_doc_id(&doc_id) {
            return Err(WopiError::Config(format!(
                "invalid document id '{}': use letters, digits, '-', '_' or '.'",
                doc_id
            )));
        }

        let _guard = self.lock();
        if self.doc_dir(&doc_id).exists() {
            return Err(WopiError::Config(format!(
                "document '{}' already exists",
                doc_id
            )));
        }

        let (record, contents) = spec.into_record();
        for (xpath, content) in &contents {
            atomic_write(self.blob_path(&doc_id, xpath), content)?;
        }
        self.save(&doc_id, &record)?;
        Ok(DocumentRef::new(&self.name, doc_id))
    }

    /// Ids of all stored documents, sorted.
    pub fn document_ids(&self) -> Result<Vec<String>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(&self.root).map_err(|e| {
            WopiError::Storage(format!(
                "failed to read documents directory '{}': {}",
                self.root.display(),
                e
            ))
        })?;

        let mut ids: Vec<String> = entries
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.path().join(MANIFEST_FILE).is_file())
            .filter_map(|entry| entry.file_name().to_str().map(str::to_string))
            .collect();
        ids.sort();
        Ok(ids)
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.guard.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn doc_dir(&self, doc_id: &str) -> PathBuf {
        self.root.join(doc_id)
    }

    fn blob_path(&self, doc_id: &str, xpath: &str) -> PathBuf {
        self.doc_dir(doc_id)
            .join(BLOBS_DIR)
            .join(URL_SAFE_NO_PAD.encode(xpath.as_bytes()))
    }

    fn load(&self, doc_id: &str) -> Result<Option<DocumentRecord>> {
        if !is_valid_doc_id(doc_id) {
            return Ok(None);
        }
        let path = self.doc_dir(doc_id).join(MANIFEST_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&path).map_err(|e| {
            WopiError::Storage(format!("failed to read '{}': {}", path.display(), e))
        })?;
        let record = serde_json::from_str(&content).map_err(|e| {
            WopiError::Storage(format!("corrupt document '{}': {}", path.display(), e))
        })?;
        Ok(Some(record))
    }

    fn save(&self, doc_id: &str, record: &DocumentRecord) -> Result<()> {
        let json = serde_json::to_string_pretty(record).map_err(|e| {
            WopiError::Storage(format!("failed to serialize document '{}': {}", doc_id, e))
        })?;
        atomic_write(self.doc_dir(doc_id).join(MANIFEST_FILE), json.as_bytes())
    }

    fn load_existing(&self, doc: &DocumentRef) -> Result<DocumentRecord> {
        if doc.repository != self.name {
            return Err(WopiError::NotFound(format!("repository '{}'", doc.repository)));
        }
        self.load(&doc.doc_id)?
            .ok_or_else(|| WopiError::NotFound(format!("document '{}'", doc.doc_id)))
    }

    /// Load, mutate and save a document under the write guard.
    fn update<T>(
        &self,
        doc: &DocumentRef,
        f: impl FnOnce(&mut DocumentRecord) -> Result<T>,
    ) -> Result<T> {
        let _guard = self.lock();
        let mut record = self.load_existing(doc)?;
        let out = f(&mut record)?;
        self.save(&doc.doc_id, &record)?;
        Ok(out)
    }
}

fn is_valid_doc_id(doc_id: &str) -> bool {
    !doc_id.is_empty()
        && !doc_id.starts_with('.')
        && doc_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

fn missing_blob(doc: &DocumentRef, xpath: &str) -> WopiError {
    WopiError::NotFound(format!("no blob at '{}' in document '{}'", xpath, doc.doc_id))
}

impl DocumentRepository for FsRepository {
    fn name(&self) -> &str {
        &self.name
    }

    fn document(&self, doc_id: &str) -> Result<Option<DocumentInfo>> {
        Ok(self
            .load(doc_id)?
            .map(|record| record.info(DocumentRef::new(&self.name, doc_id))))
    }

    fn blob_fields(&self, doc: &DocumentRef) -> Result<Vec<String>> {
        Ok(self.load_existing(doc)?.blobs.into_keys().collect())
    }

    fn blob(&self, doc: &DocumentRef, xpath: &str) -> Result<Option<BlobInfo>> {
        Ok(self.load_existing(doc)?.blobs.remove(xpath))
    }

    fn read_blob(&self, doc: &DocumentRef, xpath: &str) -> Result<Vec<u8>> {
        let record = self.load_existing(doc)?;
        if !record.blobs.contains_key(xpath) {
            return Err(missing_blob(doc, xpath));
        }
        let path = self.blob_path(&doc.doc_id, xpath);
        fs::read(&path).map_err(|e| {
            WopiError::Storage(format!("failed to read blob '{}': {}", path.display(), e))
        })
    }

    fn write_blob(
        &self,
        doc: &DocumentRef,
        xpath: &str,
        filename: &str,
        mime_type: Option<&str>,
        content: &[u8],
    ) -> Result<BlobInfo> {
        self.update(doc, |record| {
            atomic_write(self.blob_path(&doc.doc_id, xpath), content)?;
            let mime_type = mime_type
                .map(str::to_string)
                .or_else(|| record.blobs.get(xpath).and_then(|b| b.mime_type.clone()));
            let blob = BlobInfo {
                filename: filename.to_string(),
                mime_type,
                length: content.len() as u64,
            };
            record.set_blob(xpath, blob.clone());
            Ok(blob)
        })
    }

    fn rename_blob(&self, doc: &DocumentRef, xpath: &str, filename: &str) -> Result<BlobInfo> {
        self.update(doc, |record| {
            let mut blob = record
                .blobs
                .get(xpath)
                .cloned()
                .ok_or_else(|| missing_blob(doc, xpath))?;
            blob.filename = filename.to_string();
            record.set_blob(xpath, blob.clone());
            Ok(blob)
        })
    }

    fn create_document(
        &self,
        source: &DocumentRef,
        xpath: &str,
        filename: &str,
        content: &[u8],
    ) -> Result<DocumentRef> {
        let _guard = self.lock();
        let source_record = self.load_existing(source)?;
        let mut record = source_record.sibling(filename, &source_record.creator);
        record.blobs.insert(
            xpath.to_string(),
            BlobInfo {
                filename: filename.to_string(),
                mime_type: None,
                length: content.len() as u64,
            },
        );

        let doc_id = uuid::Uuid::new_v4().simple().to_string();
        atomic_write(self.blob_path(&doc_id, xpath), content)?;
        self.save(&doc_id, &record)?;
        Ok(DocumentRef::new(&self.name, doc_id))
    }

    fn native_lock(&self, doc: &DocumentRef) -> Result<Option<String>> {
        Ok(self.load_existing(doc)?.native_lock)
    }

    fn acquire_native_lock(&self, doc: &DocumentRef, owner: &str) -> Result<Option<String>> {
        self.update(doc, |record| Ok(record.acquire_native_lock(owner)))
    }

    fn release_native_lock(&self, doc: &DocumentRef, owner: &str) -> Result<bool> {
        self.update(doc, |record| Ok(record.release_native_lock(owner)))
    }

    fn can_write(&self, doc: &DocumentRef, principal: &str) -> Result<bool> {
        Ok(self.load_existing(doc)?.can_write(principal))
    }

    fn snapshot_before_write(&self, doc: &DocumentRef) -> Result<String> {
        self.update(doc, |record| Ok(record.snapshot()))
    }
}
