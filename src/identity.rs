//! File identity: stable file ids and resolution to repository blobs.
//!
//! A [`FileId`] names one content field of one document. It is the
//! URL-safe, unpadded base64 of `repository:doc_id:xpath`, so it survives
//! URLs and file names, and decodes back to its components without a
//! lookup table. Repository names and document ids never contain `:`;
//! the xpath may.

use crate::error::{Result, WopiError};
use crate::repository::{BlobInfo, DocumentInfo, DocumentRef, DocumentRepository};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Opaque identifier of a (repository, document, content field) triple.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(String);

impl FileId {
    /// Compute the id of a content field. Deterministic.
    pub fn compute(repository: &str, doc_id: &str, xpath: &str) -> Self {
        let raw = format!("{}:{}:{}", repository, doc_id, xpath);
        FileId(URL_SAFE_NO_PAD.encode(raw.as_bytes()))
    }

    /// Id of a field of an already-resolved document.
    pub fn for_field(doc: &DocumentRef, xpath: &str) -> Self {
        Self::compute(&doc.repository, &doc.doc_id, xpath)
    }

    /// Wrap a string received from a client without validating it.
    pub fn from_raw(raw: impl Into<String>) -> Self {
        FileId(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decode into its components. Anything undecodable is `NotFound`.
    pub fn decode(&self) -> Result<FileRef> {
        let not_found = || WopiError::NotFound(format!("file '{}'", self.0));

        let bytes = URL_SAFE_NO_PAD.decode(self.0.as_bytes()).map_err(|_| not_found())?;
        let raw = String::from_utf8(bytes).map_err(|_| not_found())?;
        let mut parts = raw.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(repository), Some(doc_id), Some(xpath))
                if !repository.is_empty() && !doc_id.is_empty() && !xpath.is_empty() =>
            {
                Ok(FileRef {
                    document: DocumentRef::new(repository, doc_id),
                    xpath: xpath.to_string(),
                })
            }
            _ => Err(not_found()),
        }
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Decoded components of a [`FileId`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRef {
    pub document: DocumentRef,
    pub xpath: String,
}

/// A file id resolved against the repository.
#[derive(Debug, Clone)]
pub struct ResolvedFile {
    pub file_id: FileId,
    pub document: DocumentInfo,
    pub xpath: String,
    pub blob: BlobInfo,
}

impl ResolvedFile {
    pub fn doc_ref(&self) -> &DocumentRef {
        &self.document.doc_ref
    }
}

/// Maps file ids to documents and blobs.
#[derive(Clone)]
pub struct Resolver {
    repository: Arc<dyn DocumentRepository>,
}

impl Resolver {
    pub fn new(repository: Arc<dyn DocumentRepository>) -> Self {
        Self { repository }
    }

    /// Decode `file_id` and check its repository, without touching documents.
    pub fn locate(&self, file_id: &FileId) -> Result<FileRef> {
        let file_ref = file_id.decode()?;
        if file_ref.document.repository != self.repository.name() {
            return Err(WopiError::NotFound(format!(
                "repository '{}'",
                file_ref.document.repository
            )));
        }
        Ok(file_ref)
    }

    /// Resolve to the document and its blob.
    ///
    /// `NotFound` when the id is malformed, names another repository, the
    /// document does not exist, or the field holds no blob.
    pub fn resolve(&self, file_id: &FileId) -> Result<ResolvedFile> {
        let FileRef { document, xpath } = self.locate(file_id)?;
        let info = self
            .repository
            .document(&document.doc_id)?
            .ok_or_else(|| WopiError::NotFound(format!("document '{}'", document.doc_id)))?;
        let blob = self.repository.blob(&document, &xpath)?.ok_or_else(|| {
            WopiError::NotFound(format!(
                "no blob at '{}' in document '{}'",
                xpath, document.doc_id
            ))
        })?;

        Ok(ResolvedFile {
            file_id: file_id.clone(),
            document: info,
            xpath,
            blob,
        })
    }

    /// Every lockable content field of a document, as file ids.
    pub fn sibling_file_ids(&self, doc: &DocumentRef) -> Result<Vec<FileId>> {
        Ok(self
            .repository
            .blob_fields(doc)?
            .iter()
            .map(|xpath| FileId::for_field(doc, xpath))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::{DocumentSpec, MemoryRepository, Permission};

    fn resolver() -> (Arc<MemoryRepository>, Resolver, DocumentRef) {
        let repo = Arc::new(MemoryRepository::new("default"));
        let doc = repo.add_document(
            DocumentSpec::new("Multi")
                .with_id("doc-1")
                .grant("john", Permission::ReadWrite)
                .blob("file:content", "main.docx", b"main".to_vec())
                .blob("files:files/0/file", "attachment.xlsx", b"att".to_vec()),
        );
        let resolver = Resolver::new(repo.clone());
        (repo, resolver, doc)
    }

    #[test]
    fn compute_is_deterministic_and_decodes_back() {
        let a = FileId::compute("default", "doc-1", "file:content");
        let b = FileId::compute("default", "doc-1", "file:content");
        assert_eq!(a, b);
        assert!(!a.as_str().contains(['/', '+', '=']));

        let decoded = a.decode().unwrap();
        assert_eq!(decoded.document, DocumentRef::new("default", "doc-1"));
        assert_eq!(decoded.xpath, "file:content");
    }

    #[test]
    fn distinct_fields_have_distinct_ids() {
        let a = FileId::compute("default", "doc-1", "file:content");
        let b = FileId::compute("default", "doc-1", "files:files/0/file");
        let c = FileId::compute("default", "doc-2", "file:content");
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn garbage_ids_are_not_found() {
        for raw in ["!!!", "", "Zm9v", "@@notbase64@@"] {
            let err = FileId::from_raw(raw).decode().unwrap_err();
            assert!(matches!(err, WopiError::NotFound(_)), "{}", raw);
        }
    }

    #[test]
    fn resolve_existing_blob() {
        let (_repo, resolver, doc) = resolver();
        let id = FileId::for_field(&doc, "files:files/0/file");
        let resolved = resolver.resolve(&id).unwrap();
        assert_eq!(resolved.doc_ref(), &doc);
        assert_eq!(resolved.blob.filename, "attachment.xlsx");
        assert_eq!(resolved.document.title, "Multi");
    }

    #[test]
    fn resolve_missing_document_field_or_repository() {
        let (_repo, resolver, doc) = resolver();
        let cases = [
            FileId::compute("default", "nope", "file:content"),
            FileId::for_field(&doc, "files:files/9/file"),
            FileId::compute("elsewhere", "doc-1", "file:content"),
        ];
        for id in cases {
            let err = resolver.resolve(&id).unwrap_err();
            assert_eq!(err.status_code(), 404);
        }
    }

    #[test]
    fn siblings_cover_every_blob_field() {
        let (_repo, resolver, doc) = resolver();
        let siblings = resolver.sibling_file_ids(&doc).unwrap();
        assert_eq!(siblings.len(), 2);
        assert!(siblings.contains(&FileId::for_field(&doc, "file:content")));
        assert!(siblings.contains(&FileId::for_field(&doc, "files:files/0/file")));
    }
}
