//! In-memory document repository.

use super::record::DocumentRecord;
use super::{BlobInfo, DocumentInfo, DocumentRef, DocumentRepository, Permission};
use crate::error::{Result, WopiError};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};

/// Description of a document to seed into a repository.
#[derive(Debug, Clone, Default)]
pub struct DocumentSpec {
    pub doc_id: Option<String>,
    pub title: String,
    pub creator: String,
    pub parent_title: Option<String>,
    pub grants: Vec<(String, Permission)>,
    pub blobs: Vec<SeedBlob>,
}

/// A blob to seed into a content field.
#[derive(Debug, Clone)]
pub struct SeedBlob {
    pub xpath: String,
    pub filename: String,
    pub mime_type: Option<String>,
    pub content: Vec<u8>,
}

impl DocumentSpec {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            creator: "system".to_string(),
            ..Default::default()
        }
    }

    pub fn with_id(mut self, doc_id: impl Into<String>) -> Self {
        self.doc_id = Some(doc_id.into());
        self
    }

    pub fn with_creator(mut self, creator: impl Into<String>) -> Self {
        self.creator = creator.into();
        self
    }

    pub fn in_folder(mut self, title: impl Into<String>) -> Self {
        self.parent_title = Some(title.into());
        self
    }

    pub fn grant(mut self, principal: impl Into<String>, permission: Permission) -> Self {
        self.grants.push((principal.into(), permission));
        self
    }

    pub fn blob(
        mut self,
        xpath: impl Into<String>,
        filename: impl Into<String>,
        content: impl Into<Vec<u8>>,
    ) -> Self {
        self.blobs.push(SeedBlob {
            xpath: xpath.into(),
            filename: filename.into(),
            mime_type: None,
            content: content.into(),
        });
        self
    }

    pub(crate) fn into_record(self) -> (DocumentRecord, HashMap<String, Vec<u8>>) {
        let mut record = DocumentRecord::new(self.title, self.creator);
        record.parent_title = self.parent_title;
        record.grants = self.grants.into_iter().collect();
        let mut contents = HashMap::new();
        for blob in self.blobs {
            record.blobs.insert(
                blob.xpath.clone(),
                BlobInfo {
                    filename: blob.filename,
                    mime_type: blob.mime_type,
                    length: blob.content.len() as u64,
                },
            );
            contents.insert(blob.xpath, blob.content);
        }
        (record, contents)
    }
}

struct MemoryDocument {
    record: DocumentRecord,
    contents: HashMap<String, Vec<u8>>,
}

/// Process-local repository. All state lives behind one mutex.
pub struct MemoryRepository {
    name: String,
    docs: Mutex<BTreeMap<String, MemoryDocument>>,
}

impl MemoryRepository {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            docs: Mutex::new(BTreeMap::new()),
        }
    }

    /// Insert a document and return its reference.
    pub fn add_document(&self, spec: DocumentSpec) -> DocumentRef {
        let doc_id = spec
            .doc_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().simple().to_string());
        let (record, contents) = spec.into_record();
        self.docs()
            .insert(doc_id.clone(), MemoryDocument { record, contents });
        DocumentRef::new(&self.name, doc_id)
    }

    /// Labels of the snapshots recorded for a document.
    pub fn versions(&self, doc: &DocumentRef) -> Vec<String> {
        self.docs()
            .get(&doc.doc_id)
            .map(|d| d.record.versions.clone())
            .unwrap_or_default()
    }

    fn docs(&self) -> MutexGuard<'_, BTreeMap<String, MemoryDocument>> {
        self.docs.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn with_doc<T>(
        &self,
        doc: &DocumentRef,
        f: impl FnOnce(&mut MemoryDocument) -> Result<T>,
    ) -> Result<T> {
        if doc.repository != self.name {
            return Err(WopiError::NotFound(format!("repository '{}'", doc.repository)));
        }
        let mut docs = self.docs();
        let entry = docs
            .get_mut(&doc.doc_id)
            .ok_or_else(|| WopiError::NotFound(format!("document '{}'", doc.doc_id)))?;
        f(entry)
    }
}

fn missing_blob(doc: &DocumentRef, xpath: &str) -> WopiError {
    WopiError::NotFound(format!("no blob at '{}' in document '{}'", xpath, doc.doc_id))
}

impl DocumentRepository for MemoryRepository {
    fn name(&self) -> &str {
        &self.name
    }

    fn document(&self, doc_id: &str) -> Result<Option<DocumentInfo>> {
        Ok(self
            .docs()
            .get(doc_id)
            .map(|d| d.record.info(DocumentRef::new(&self.name, doc_id))))
    }

    fn blob_fields(&self, doc: &DocumentRef) -> Result<Vec<String>> {
        self.with_doc(doc, |d| Ok(d.record.blobs.keys().cloned().collect()))
    }

    fn blob(&self, doc: &DocumentRef, xpath: &str) -> Result<Option<BlobInfo>> {
        self.with_doc(doc, |d| Ok(d.record.blobs.get(xpath).cloned()))
    }

    fn read_blob(&self, doc: &DocumentRef, xpath: &str) -> Result<Vec<u8>> {
        self.with_doc(doc, |d| {
            d.contents
                .get(xpath)
                .cloned()
                .ok_or_else(|| missing_blob(doc, xpath))
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
        self.with_doc(doc, |d| {
            let mime_type = mime_type
                .map(str::to_string)
                .or_else(|| d.record.blobs.get(xpath).and_then(|b| b.mime_type.clone()));
            let blob = BlobInfo {
                filename: filename.to_string(),
                mime_type,
                length: content.len() as u64,
            };
            d.record.set_blob(xpath, blob.clone());
            d.contents.insert(xpath.to_string(), content.to_vec());
            Ok(blob)
        })
    }

    fn rename_blob(&self, doc: &DocumentRef, xpath: &str, filename: &str) -> Result<BlobInfo> {
        self.with_doc(doc, |d| {
            let mut blob = d
                .record
                .blobs
                .get(xpath)
                .cloned()
                .ok_or_else(|| missing_blob(doc, xpath))?;
            blob.filename = filename.to_string();
            d.record.set_blob(xpath, blob.clone());
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
        let mut record =
            self.with_doc(source, |d| Ok(d.record.sibling(filename, &d.record.creator)))?;
        record.blobs.insert(
            xpath.to_string(),
            BlobInfo {
                filename: filename.to_string(),
                mime_type: None,
                length: content.len() as u64,
            },
        );
        let doc_id = uuid::Uuid::new_v4().simple().to_string();
        let mut contents = HashMap::new();
        contents.insert(xpath.to_string(), content.to_vec());
        self.docs().insert(
            doc_id.clone(),
            MemoryDocument { record, contents },
        );
        Ok(DocumentRef::new(&self.name, doc_id))
    }

    fn native_lock(&self, doc: &DocumentRef) -> Result<Option<String>> {
        self.with_doc(doc, |d| Ok(d.record.native_lock.clone()))
    }

    fn acquire_native_lock(&self, doc: &DocumentRef, owner: &str) -> Result<Option<String>> {
        self.with_doc(doc, |d| Ok(d.record.acquire_native_lock(owner)))
    }

    fn release_native_lock(&self, doc: &DocumentRef, owner: &str) -> Result<bool> {
        self.with_doc(doc, |d| Ok(d.record.release_native_lock(owner)))
    }

    fn can_write(&self, doc: &DocumentRef, principal: &str) -> Result<bool> {
        self.with_doc(doc, |d| Ok(d.record.can_write(principal)))
    }

    fn snapshot_before_write(&self, doc: &DocumentRef) -> Result<String> {
        self.with_doc(doc, |d| Ok(d.record.snapshot()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn repo_with_doc() -> (MemoryRepository, DocumentRef) {
        let repo = MemoryRepository::new("default");
        let doc = repo.add_document(
            DocumentSpec::new("Report")
                .with_id("doc-1")
                .with_creator("john")
                .in_folder("Workspace")
                .grant("john", Permission::ReadWrite)
                .grant("joe", Permission::Read)
                .blob("file:content", "report.docx", b"hello".to_vec()),
        );
        (repo, doc)
    }

    #[test]
    fn lookup_document_and_blob() {
        let (repo, doc) = repo_with_doc();
        let info = repo.document("doc-1").unwrap().unwrap();
        assert_eq!(info.title, "Report");
        assert_eq!(info.parent_title.as_deref(), Some("Workspace"));
        assert_eq!(info.version_label, "0.0");
        assert!(repo.document("missing").unwrap().is_none());

        let blob = repo.blob(&doc, "file:content").unwrap().unwrap();
        assert_eq!(blob.filename, "report.docx");
        assert_eq!(blob.length, 5);
        assert!(repo.blob(&doc, "files:files/0/file").unwrap().is_none());
        assert_eq!(repo.blob_fields(&doc).unwrap(), vec!["file:content"]);
    }

    #[test]
    fn write_and_rename_blob() {
        let (repo, doc) = repo_with_doc();
        repo.write_blob(&doc, "file:content", "report.docx", None, b"new content")
            .unwrap();
        assert_eq!(repo.read_blob(&doc, "file:content").unwrap(), b"new content");

        let renamed = repo.rename_blob(&doc, "file:content", "final.docx").unwrap();
        assert_eq!(renamed.filename, "final.docx");
        assert_eq!(renamed.length, 11);
        assert_eq!(repo.read_blob(&doc, "file:content").unwrap(), b"new content");
    }

    #[test]
    fn rename_missing_blob_is_not_found() {
        let (repo, doc) = repo_with_doc();
        let err = repo.rename_blob(&doc, "files:files/0/file", "x.txt").unwrap_err();
        assert!(matches!(err, WopiError::NotFound(_)));
    }

    #[test]
    fn create_document_copies_folder_and_grants() {
        let (repo, doc) = repo_with_doc();
        let created = repo
            .create_document(&doc, "file:content", "copy.docx", b"copy")
            .unwrap();
        assert_ne!(created, doc);
        let info = repo.document(&created.doc_id).unwrap().unwrap();
        assert_eq!(info.title, "copy.docx");
        assert_eq!(info.parent_title.as_deref(), Some("Workspace"));
        assert!(repo.can_write(&created, "john").unwrap());
        assert!(!repo.can_write(&created, "joe").unwrap());
        assert_eq!(repo.read_blob(&created, "file:content").unwrap(), b"copy");
    }

    #[test]
    fn native_lock_round_trip() {
        let (repo, doc) = repo_with_doc();
        assert_eq!(repo.acquire_native_lock(&doc, "wopi").unwrap(), None);
        assert_eq!(repo.native_lock(&doc).unwrap().as_deref(), Some("wopi"));
        assert_eq!(
            repo.acquire_native_lock(&doc, "Administrator").unwrap().as_deref(),
            Some("wopi")
        );
        assert!(repo.release_native_lock(&doc, "wopi").unwrap());
        assert_eq!(repo.native_lock(&doc).unwrap(), None);
    }

    #[test]
    fn snapshot_records_versions() {
        let (repo, doc) = repo_with_doc();
        assert_eq!(repo.snapshot_before_write(&doc).unwrap(), "0.1");
        repo.write_blob(&doc, "file:content", "report.pdf", None, b"pdf")
            .unwrap();
        assert_eq!(repo.document("doc-1").unwrap().unwrap().version_label, "0.1+");
        assert_eq!(repo.versions(&doc), vec!["0.1".to_string()]);
    }

    #[test]
    fn foreign_repository_is_not_found() {
        let (repo, _) = repo_with_doc();
        let other = DocumentRef::new("other", "doc-1");
        assert!(matches!(
            repo.blob_fields(&other).unwrap_err(),
            WopiError::NotFound(_)
        ));
    }
}
