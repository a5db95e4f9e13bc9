//! Request and response shaping of the WOPI Files endpoint.
//!
//! `FilesEndpoint` sits between a transport (HTTP server, CLI) and the
//! [`LockEngine`]: it reads protocol headers, dispatches on
//! `X-WOPI-Override`, and turns engine results into [`WopiResponse`]s.
//!
//! | Route                          | Method                         |
//! |--------------------------------|--------------------------------|
//! | `GET  /files/{id}`             | [`FilesEndpoint::check_file_info`] |
//! | `GET  /files/{id}/contents`    | [`FilesEndpoint::get_file`]    |
//! | `POST /files/{id}`             | [`FilesEndpoint::post`]        |
//! | `POST /files/{id}/contents`    | [`FilesEndpoint::post_contents`] |

use crate::engine::{LockEngine, PutRelativeOutcome, PutRelativeRequest, RequestContext};
use crate::error::{Result, WopiError};
use crate::headers::{self, Operation, WopiHeaders};
use crate::identity::{FileId, ResolvedFile};
use crate::repository::DocumentRef;
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;

/// Share URL types offered in CheckFileInfo and accepted by GET_SHARE_URL.
pub const SHARE_URL_READ_ONLY: &str = "ReadOnly";
pub const SHARE_URL_READ_WRITE: &str = "ReadWrite";

/// Response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Empty,
    Json(Value),
    Bytes(Vec<u8>),
}

/// Transport-neutral WOPI response.
#[derive(Debug, Clone, PartialEq)]
pub struct WopiResponse {
    pub status: u16,
    /// Value of `X-WOPI-Lock`. `Some("")` is an empty header, `None` no header.
    pub lock: Option<String>,
    /// Value of `X-WOPI-ItemVersion`.
    pub item_version: Option<u64>,
    pub body: Body,
}

impl WopiResponse {
    pub fn ok() -> Self {
        Self {
            status: 200,
            lock: None,
            item_version: None,
            body: Body::Empty,
        }
    }

    pub fn with_lock(mut self, lock: impl Into<String>) -> Self {
        self.lock = Some(lock.into());
        self
    }

    pub fn with_item_version(mut self, version: u64) -> Self {
        self.item_version = Some(version);
        self
    }

    pub fn with_json(mut self, body: Value) -> Self {
        self.body = Body::Json(body);
        self
    }

    pub fn with_bytes(mut self, body: Vec<u8>) -> Self {
        self.body = Body::Bytes(body);
        self
    }

    /// Error response: the error's status, plus the lock header a conflict carries.
    pub fn from_error(err: &WopiError) -> Self {
        Self {
            status: err.status_code(),
            lock: err.lock_header().map(str::to_string),
            item_version: None,
            body: Body::Empty,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == 200
    }

    /// JSON body, if any.
    pub fn json(&self) -> Option<&Value> {
        match &self.body {
            Body::Json(value) => Some(value),
            _ => None,
        }
    }
}

/// CheckFileInfo properties.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct FileInfo {
    pub base_file_name: String,
    pub owner_id: String,
    pub size: u64,
    pub user_id: String,
    /// Item version, as a string.
    pub version: String,
    pub user_friendly_name: String,
    pub read_only: bool,
    pub user_can_write: bool,
    pub user_can_rename: bool,
    pub user_can_not_write_relative: bool,
    pub supports_locks: bool,
    pub supports_get_lock: bool,
    pub supports_extended_lock_length: bool,
    pub supports_update: bool,
    pub supports_rename: bool,
    pub supported_share_url_types: Vec<String>,
    pub host_view_url: String,
    pub host_edit_url: String,
    pub breadcrumb_brand_name: String,
    pub breadcrumb_brand_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub breadcrumb_folder_name: Option<String>,
}

/// The Files endpoint over one engine.
pub struct FilesEndpoint {
    engine: Arc<LockEngine>,
}

impl FilesEndpoint {
    pub fn new(engine: Arc<LockEngine>) -> Self {
        Self { engine }
    }

    pub fn engine(&self) -> &LockEngine {
        &self.engine
    }

    /// `GET /files/{id}`.
    pub fn check_file_info(&self, ctx: &RequestContext, file_id: &FileId) -> WopiResponse {
        self.try_check_file_info(ctx, file_id)
            .unwrap_or_else(|err| WopiResponse::from_error(&err))
    }

    pub fn try_check_file_info(&self, ctx: &RequestContext, file_id: &FileId) -> Result<WopiResponse> {
        let snapshot = self.engine.check_file_info(ctx, file_id)?;
        let config = self.engine.config();
        let file = &snapshot.file;
        let can_write = snapshot.user_can_write;

        let info = FileInfo {
            base_file_name: file.blob.filename.clone(),
            owner_id: file.document.creator.clone(),
            size: file.blob.length,
            user_id: ctx.principal.clone(),
            version: snapshot.item_version.to_string(),
            user_friendly_name: ctx.principal.clone(),
            read_only: !can_write,
            user_can_write: can_write,
            user_can_rename: can_write,
            user_can_not_write_relative: !can_write || !config.allow_put_relative_creation,
            supports_locks: true,
            supports_get_lock: true,
            supports_extended_lock_length: true,
            supports_update: true,
            supports_rename: true,
            supported_share_url_types: vec![
                SHARE_URL_READ_ONLY.to_string(),
                SHARE_URL_READ_WRITE.to_string(),
            ],
            host_view_url: self.host_url(file.doc_ref(), &file.xpath, false),
            host_edit_url: self.host_url(file.doc_ref(), &file.xpath, true),
            breadcrumb_brand_name: config.brand_name.clone(),
            breadcrumb_brand_url: config.base_url.clone(),
            breadcrumb_folder_name: file.document.parent_title.clone(),
        };
        let body = serde_json::to_value(&info)
            .map_err(|e| WopiError::Storage(format!("failed to serialize file info: {}", e)))?;
        Ok(WopiResponse::ok()
            .with_item_version(snapshot.item_version)
            .with_json(body))
    }

    /// `GET /files/{id}/contents`.
    pub fn get_file(
        &self,
        ctx: &RequestContext,
        file_id: &FileId,
        headers: &WopiHeaders,
    ) -> WopiResponse {
        self.try_get_file(ctx, file_id, headers)
            .unwrap_or_else(|err| WopiResponse::from_error(&err))
    }

    pub fn try_get_file(
        &self,
        ctx: &RequestContext,
        file_id: &FileId,
        headers: &WopiHeaders,
    ) -> Result<WopiResponse> {
        // A malformed size header is treated as absent
        let max_expected = headers
            .get(headers::MAX_EXPECTED_SIZE)
            .and_then(|v| v.trim().parse::<u64>().ok());
        let (content, version) = self.engine.get_file(ctx, file_id, max_expected)?;
        Ok(WopiResponse::ok()
            .with_item_version(version)
            .with_bytes(content))
    }

    /// `POST /files/{id}`, dispatched on `X-WOPI-Override`.
    pub fn post(
        &self,
        ctx: &RequestContext,
        file_id: &FileId,
        headers: &WopiHeaders,
        body: &[u8],
    ) -> WopiResponse {
        self.try_post(ctx, file_id, headers, body)
            .unwrap_or_else(|err| WopiResponse::from_error(&err))
    }

    pub fn try_post(
        &self,
        ctx: &RequestContext,
        file_id: &FileId,
        headers: &WopiHeaders,
        body: &[u8],
    ) -> Result<WopiResponse> {
        let lock = headers.get(headers::LOCK);
        match self.operation(file_id, headers)? {
            // An empty old lock asks for a plain LOCK
            Operation::Lock
                if headers
                    .get(headers::OLD_LOCK)
                    .is_some_and(|old| !old.is_empty()) =>
            {
                let old_lock = headers.get(headers::OLD_LOCK);
                self.engine.unlock_and_relock(ctx, file_id, lock, old_lock)?;
                Ok(WopiResponse::ok())
            }
            Operation::Lock => {
                let version = self.engine.lock(ctx, file_id, lock)?;
                Ok(WopiResponse::ok().with_item_version(version))
            }
            Operation::Unlock => {
                let version = self.engine.unlock(ctx, file_id, lock)?;
                Ok(WopiResponse::ok().with_item_version(version))
            }
            Operation::RefreshLock => {
                let version = self.engine.refresh_lock(ctx, file_id, lock)?;
                Ok(WopiResponse::ok().with_item_version(version))
            }
            Operation::GetLock => {
                let current = self.engine.get_lock(ctx, file_id)?;
                Ok(WopiResponse::ok().with_lock(current))
            }
            Operation::RenameFile => self.rename(ctx, file_id, headers),
            Operation::PutRelative => self.put_relative(ctx, file_id, headers, body),
            Operation::GetShareUrl => self.share_url(file_id, headers),
            Operation::Put => {
                self.engine.resolve(file_id)?;
                Err(WopiError::BadRequest(
                    "PUT is only accepted on the contents endpoint".to_string(),
                ))
            }
        }
    }

    /// `POST /files/{id}/contents`. Only `PUT` is accepted.
    pub fn post_contents(
        &self,
        ctx: &RequestContext,
        file_id: &FileId,
        headers: &WopiHeaders,
        body: &[u8],
    ) -> WopiResponse {
        self.try_post_contents(ctx, file_id, headers, body)
            .unwrap_or_else(|err| WopiResponse::from_error(&err))
    }

    pub fn try_post_contents(
        &self,
        ctx: &RequestContext,
        file_id: &FileId,
        headers: &WopiHeaders,
        body: &[u8],
    ) -> Result<WopiResponse> {
        match self.operation(file_id, headers)? {
            Operation::Put => {
                let version =
                    self.engine
                        .put_file(ctx, file_id, headers.get(headers::LOCK), body)?;
                Ok(WopiResponse::ok().with_item_version(version))
            }
            other => {
                self.engine.resolve(file_id)?;
                Err(WopiError::BadRequest(format!(
                    "{} is not accepted on the contents endpoint",
                    other
                )))
            }
        }
    }

    /// Parse the override header. A missing or unknown value is a bad
    /// request, but only once the file is known to exist.
    fn operation(&self, file_id: &FileId, headers: &WopiHeaders) -> Result<Operation> {
        let parsed = headers
            .get(headers::OVERRIDE)
            .ok_or_else(|| WopiError::BadRequest(format!("missing {} header", headers::OVERRIDE)))
            .and_then(str::parse::<Operation>);
        match parsed {
            Ok(operation) => Ok(operation),
            Err(err) => {
                self.engine.resolve(file_id)?;
                Err(err)
            }
        }
    }

    fn rename(&self, ctx: &RequestContext, file_id: &FileId, headers: &WopiHeaders) -> Result<WopiResponse> {
        let requested = headers.get_utf7(headers::REQUESTED_NAME);
        self.engine.rename_file(
            ctx,
            file_id,
            headers.get(headers::LOCK),
            requested.as_deref(),
        )?;
        // Clients expect the name they asked for, without the extension
        Ok(WopiResponse::ok().with_json(json!({ "Name": requested })))
    }

    fn put_relative(
        &self,
        ctx: &RequestContext,
        file_id: &FileId,
        headers: &WopiHeaders,
        body: &[u8],
    ) -> Result<WopiResponse> {
        let suggested = headers.get_utf7(headers::SUGGESTED_TARGET);
        let relative = headers.get_utf7(headers::RELATIVE_TARGET);
        let request = PutRelativeRequest {
            suggested_target: suggested.as_deref(),
            relative_target: relative.as_deref(),
            file_conversion: headers.contains(headers::FILE_CONVERSION),
            lock: headers.get(headers::LOCK),
        };
        let outcome = self.engine.put_relative(ctx, file_id, request, body)?;
        Ok(WopiResponse::ok()
            .with_item_version(outcome.item_version)
            .with_json(self.put_relative_body(ctx, &outcome)))
    }

    fn put_relative_body(&self, ctx: &RequestContext, outcome: &PutRelativeOutcome) -> Value {
        let mut url = format!(
            "{}wopi/files/{}",
            self.engine.config().effective_wopi_base_url(),
            outcome.file_id
        );
        url.push_str("?access_token=");
        if let Some(token) = &ctx.access_token {
            url.push_str(token);
        }
        json!({
            "Name": outcome.name,
            "Url": url,
            "HostViewUrl": self.host_url(&outcome.document, &outcome.xpath, false),
            "HostEditUrl": self.host_url(&outcome.document, &outcome.xpath, true),
        })
    }

    fn share_url(&self, file_id: &FileId, headers: &WopiHeaders) -> Result<WopiResponse> {
        let file: ResolvedFile = self.engine.resolve(file_id)?;
        let edit = match headers.get(headers::URL_TYPE) {
            Some(SHARE_URL_READ_ONLY) => false,
            Some(SHARE_URL_READ_WRITE) => true,
            other => {
                return Err(WopiError::Unsupported(format!(
                    "unsupported {} '{}'",
                    headers::URL_TYPE,
                    other.unwrap_or_default()
                )));
            }
        };
        let url = self.host_url(file.doc_ref(), &file.xpath, edit);
        Ok(WopiResponse::ok().with_json(json!({ "ShareUrl": url })))
    }

    /// `{base_url}wopi/{view|edit}/{repository}/{doc_id}/{xpath}`.
    fn host_url(&self, doc: &DocumentRef, xpath: &str, edit: bool) -> String {
        format!(
            "{}wopi/{}/{}/{}/{}",
            self.engine.config().base_url,
            if edit { "edit" } else { "view" },
            doc.repository,
            doc.doc_id,
            xpath
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::locks::MemoryLockStore;
    use crate::repository::{DocumentRepository, DocumentSpec, MemoryRepository, Permission};
    use crate::versions::MemoryItemVersions;
    use chrono::Duration;

    const CONTENT: &str = "file:content";

    fn endpoint() -> (FilesEndpoint, Arc<MemoryRepository>, FileId) {
        let repo = Arc::new(MemoryRepository::new("default"));
        let doc = repo.add_document(
            DocumentSpec::new("Report")
                .with_id("doc-1")
                .with_creator("john")
                .in_folder("Workspace")
                .grant("john", Permission::ReadWrite)
                .grant("joe", Permission::Read)
                .blob(CONTENT, "test-file.txt", "test content"),
        );
        let engine = LockEngine::new(
            Config::default(),
            repo.clone(),
            Arc::new(MemoryLockStore::new(Duration::minutes(30))),
            Arc::new(MemoryItemVersions::new()),
        );
        let file_id = FileId::for_field(&doc, CONTENT);
        (FilesEndpoint::new(Arc::new(engine)), repo, file_id)
    }

    fn john() -> RequestContext {
        RequestContext::new("john").with_access_token("token-1")
    }

    fn op(name: &str) -> WopiHeaders {
        WopiHeaders::new().with(headers::OVERRIDE, name)
    }

    #[test]
    fn check_file_info_properties() {
        let (files, _repo, id) = endpoint();
        let response = files.check_file_info(&john(), &id);
        assert_eq!(response.status, 200);
        let info = response.json().unwrap();

        assert_eq!(info["BaseFileName"], "test-file.txt");
        assert_eq!(info["OwnerId"], "john");
        assert_eq!(info["Size"], 12);
        assert_eq!(info["Version"], "0");
        assert_eq!(info["UserCanWrite"], true);
        assert_eq!(info["ReadOnly"], false);
        assert_eq!(info["SupportsLocks"], true);
        assert_eq!(info["SupportedShareUrlTypes"], json!(["ReadOnly", "ReadWrite"]));
        assert_eq!(info["BreadcrumbFolderName"], "Workspace");
        assert_eq!(
            info["HostEditUrl"],
            "http://localhost:8080/wopi/edit/default/doc-1/file:content"
        );

        let reader = files.check_file_info(&RequestContext::new("joe"), &id);
        assert_eq!(reader.json().unwrap()["UserCanWrite"], false);
        assert_eq!(reader.json().unwrap()["UserCanNotWriteRelative"], true);
    }

    #[test]
    fn missing_or_unknown_override_is_bad_request_after_resolution() {
        let (files, _repo, id) = endpoint();
        assert_eq!(files.post(&john(), &id, &WopiHeaders::new(), b"").status, 400);
        assert_eq!(files.post(&john(), &id, &op("DELETE"), b"").status, 400);

        let missing = FileId::compute("default", "nope", CONTENT);
        assert_eq!(files.post(&john(), &missing, &op("DELETE"), b"").status, 404);
        assert_eq!(files.post(&john(), &missing, &WopiHeaders::new(), b"").status, 404);
    }

    #[test]
    fn put_is_only_accepted_on_contents() {
        let (files, _repo, id) = endpoint();
        assert_eq!(files.post(&john(), &id, &op("PUT"), b"x").status, 400);
        assert_eq!(files.post_contents(&john(), &id, &op("LOCK"), b"x").status, 400);
    }

    #[test]
    fn lock_cycle_through_headers() {
        let (files, _repo, id) = endpoint();
        let lock = files.post(&john(), &id, &op("LOCK").with(headers::LOCK, "foo"), b"");
        assert_eq!(lock.status, 200);
        assert_eq!(lock.item_version, Some(0));

        let conflict = files.post(&john(), &id, &op("LOCK").with(headers::LOCK, "bar"), b"");
        assert_eq!(conflict.status, 409);
        assert_eq!(conflict.lock.as_deref(), Some("foo"));

        let relock = files.post(
            &john(),
            &id,
            &op("LOCK")
                .with(headers::LOCK, "bar")
                .with(headers::OLD_LOCK, "foo"),
            b"",
        );
        assert_eq!(relock.status, 200);

        let get = files.post(&john(), &id, &op("GET_LOCK"), b"");
        assert_eq!(get.lock.as_deref(), Some("bar"));

        let put = files.post_contents(&john(), &id, &op("PUT").with(headers::LOCK, "bar"), b"new");
        assert_eq!(put.item_version, Some(1));

        let unlock = files.post(&john(), &id, &op("UNLOCK").with(headers::LOCK, "bar"), b"");
        assert_eq!(unlock.status, 200);
        assert_eq!(unlock.item_version, Some(1));

        let again = files.post(&john(), &id, &op("UNLOCK").with(headers::LOCK, "bar"), b"");
        assert_eq!(again.status, 409);
        assert_eq!(again.lock.as_deref(), Some(""));
    }

    #[test]
    fn empty_old_lock_header_is_a_plain_lock() {
        let (files, _repo, id) = endpoint();
        let response = files.post(
            &john(),
            &id,
            &op("LOCK").with(headers::LOCK, "foo").with(headers::OLD_LOCK, ""),
            b"",
        );
        assert_eq!(response.status, 200);
        assert_eq!(response.item_version, Some(0));

        let get = files.post(&john(), &id, &op("GET_LOCK"), b"");
        assert_eq!(get.lock.as_deref(), Some("foo"));
    }

    #[test]
    fn get_file_size_header() {
        let (files, _repo, id) = endpoint();
        let ok = files.get_file(&john(), &id, &WopiHeaders::new());
        assert_eq!(ok.body, Body::Bytes(b"test content".to_vec()));
        assert_eq!(ok.item_version, Some(0));

        let small = WopiHeaders::new().with(headers::MAX_EXPECTED_SIZE, "4");
        assert_eq!(files.get_file(&john(), &id, &small).status, 412);

        let garbage = WopiHeaders::new().with(headers::MAX_EXPECTED_SIZE, "lots");
        assert_eq!(files.get_file(&john(), &id, &garbage).status, 200);
    }

    #[test]
    fn rename_decodes_requested_name() {
        let (files, repo, id) = endpoint();
        let doc = DocumentRef::new("default", "doc-1");
        // "Hi Mom -☺-!" in UTF-7
        let headers = op("RENAME_FILE").with(headers::REQUESTED_NAME, "Hi Mom -+Jjo--!");

        let response = files.post(&john(), &id, &headers, b"");
        assert_eq!(response.status, 200);
        assert_eq!(response.json().unwrap()["Name"], "Hi Mom -\u{263A}-!");
        assert_eq!(
            repo.blob(&doc, CONTENT).unwrap().unwrap().filename,
            "Hi Mom -\u{263A}-!.txt"
        );
    }

    #[test]
    fn rename_by_reader_conflicts_before_missing_name() {
        let (files, _repo, id) = endpoint();
        let reader = RequestContext::new("joe");
        let response = files.post(&reader, &id, &op("RENAME_FILE"), b"");
        assert_eq!(response.status, 409);
        assert_eq!(response.lock, None);
        assert_eq!(files.post(&john(), &id, &op("RENAME_FILE"), b"").status, 400);
    }

    #[test]
    fn put_relative_new_document_body() {
        let (files, _repo, id) = endpoint();
        let headers = op("PUT_RELATIVE").with(headers::SUGGESTED_TARGET, "copy.txt");
        let response = files.post(&john(), &id, &headers, b"copy");
        assert_eq!(response.status, 200);

        let body = response.json().unwrap();
        assert_eq!(body["Name"], "copy.txt");
        let url = body["Url"].as_str().unwrap();
        assert!(url.starts_with("http://localhost:8080/wopi/files/"));
        assert!(url.ends_with("?access_token=token-1"));
        assert!(!url.contains(id.as_str()));
        assert!(body["HostViewUrl"].as_str().unwrap().contains("/wopi/view/default/"));
    }

    #[test]
    fn put_relative_conversion_keeps_file_id() {
        let (files, _repo, id) = endpoint();
        let headers = op("PUT_RELATIVE")
            .with(headers::SUGGESTED_TARGET, ".pdf")
            .with(headers::FILE_CONVERSION, "True");
        let response = files.post(&john(), &id, &headers, b"%PDF");
        assert_eq!(response.item_version, Some(1));
        let body = response.json().unwrap();
        assert_eq!(body["Name"], "test-file.pdf");
        assert!(body["Url"].as_str().unwrap().contains(id.as_str()));
    }

    #[test]
    fn put_relative_target_headers_are_exclusive() {
        let (files, _repo, id) = endpoint();
        assert_eq!(files.post(&john(), &id, &op("PUT_RELATIVE"), b"x").status, 501);
        let both = op("PUT_RELATIVE")
            .with(headers::SUGGESTED_TARGET, "a.txt")
            .with(headers::RELATIVE_TARGET, "b.txt");
        assert_eq!(files.post(&john(), &id, &both, b"x").status, 501);
    }

    #[test]
    fn share_url_types() {
        let (files, _repo, id) = endpoint();
        let read = files.post(
            &john(),
            &id,
            &op("GET_SHARE_URL").with(headers::URL_TYPE, "ReadOnly"),
            b"",
        );
        assert_eq!(
            read.json().unwrap()["ShareUrl"],
            "http://localhost:8080/wopi/view/default/doc-1/file:content"
        );
        let write = files.post(
            &john(),
            &id,
            &op("GET_SHARE_URL").with(headers::URL_TYPE, "ReadWrite"),
            b"",
        );
        assert!(write.json().unwrap()["ShareUrl"].as_str().unwrap().contains("/wopi/edit/"));

        let other = files.post(
            &john(),
            &id,
            &op("GET_SHARE_URL").with(headers::URL_TYPE, "Embed"),
            b"",
        );
        assert_eq!(other.status, 501);
        assert_eq!(files.post(&john(), &id, &op("GET_SHARE_URL"), b"").status, 501);
    }

    #[test]
    fn natively_locked_document_has_no_lock_header() {
        let (files, repo, id) = endpoint();
        repo.acquire_native_lock(&DocumentRef::new("default", "doc-1"), "Administrator")
            .unwrap();
        let response = files.post(&john(), &id, &op("GET_LOCK"), b"");
        assert_eq!(response.status, 409);
        assert_eq!(response.lock, None);
    }
}
