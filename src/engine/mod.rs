//! The WOPI lock state machine and the content mutations it guards.
//!
//! Per file id the engine derives one of three states:
//! - `Unlocked`: no live lock record
//! - `WopiLocked(v)`: a live record with value `v`
//! - `NativelyLocked`: the document's native lock is held by an owner other
//!   than the configured WOPI marker (derived, never stored)
//!
//! # Request Order
//!
//! Every operation resolves the file id first (`NotFound`), then checks its
//! required headers (`BadRequest`), then enters the document's critical
//! section and applies its transition. Lock-store and bridge changes made
//! for one request happen inside a single section.
//!
//! Each section starts by reloading the document's lock holders from the
//! store, so locks taken or dropped by another engine sharing the store
//! are seen, and a native lock left behind by expired WOPI locks is
//! released on the next request that touches the document.

mod section;


use crate::bridge::RepositoryLockBridge;
use crate::config::Config;
use crate::error::{Result, WopiError};
use crate::events::{Event, EventAction, EventLog};
use crate::headers::Operation;
use crate::identity::{FileId, ResolvedFile, Resolver};
use crate::locks::{LockRecord, LockStore};
use crate::repository::{BlobInfo, DocumentRef, DocumentRepository};
use crate::versions::ItemVersionCounter;
use chrono::{DateTime, Utc};
use section::DocumentSections;
use serde_json::json;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, debug_span, warn};

/// Who is calling, and with which access token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub principal: String,
    pub access_token: Option<String>,
}

impl RequestContext {
    pub fn new(principal: impl Into<String>) -> Self {
        Self {
            principal: principal.into(),
            access_token: None,
        }
    }

    pub fn with_access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }
}

/// Lock state of one file id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LockState {
    Unlocked,
    WopiLocked(LockRecord),
    NativelyLocked,
}

/// Metadata served by CheckFileInfo.
#[derive(Debug, Clone)]
pub struct FileSnapshot {
    pub file: ResolvedFile,
    pub item_version: u64,
    pub user_can_write: bool,
}

/// Target-naming headers and flags of a PUT_RELATIVE request.
#[derive(Debug, Clone, Copy, Default)]
pub struct PutRelativeRequest<'a> {
    pub suggested_target: Option<&'a str>,
    pub relative_target: Option<&'a str>,
    pub file_conversion: bool,
    pub lock: Option<&'a str>,
}

/// Result of a PUT_RELATIVE request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutRelativeOutcome {
    /// File name the content was stored under.
    pub name: String,
    /// The written file: the source itself on conversion, else a new document's.
    pub file_id: FileId,
    pub document: DocumentRef,
    pub xpath: String,
    pub item_version: u64,
    /// Label of the version recorded before an in-place conversion.
    pub snapshot: Option<String>,
}

/// Coordinates the lock store, the native-lock bridge, item versions and
/// the repository.
pub struct LockEngine {
    config: Config,
    repository: Arc<dyn DocumentRepository>,
    store: Arc<dyn LockStore>,
    versions: Arc<dyn ItemVersionCounter>,
    resolver: Resolver,
    bridge: RepositoryLockBridge,
    sections: DocumentSections,
    events: Option<EventLog>,
}

impl LockEngine {
    pub fn new(
        config: Config,
        repository: Arc<dyn DocumentRepository>,
        store: Arc<dyn LockStore>,
        versions: Arc<dyn ItemVersionCounter>,
    ) -> Self {
        let bridge = RepositoryLockBridge::new(Arc::clone(&repository), config.lock_owner.clone());
        Self {
            resolver: Resolver::new(Arc::clone(&repository)),
            bridge,
            config,
            repository,
            store,
            versions,
            sections: DocumentSections::new(),
            events: None,
        }
    }

    /// Also guard each document section with a lock file under `dir`, for
    /// engines in several processes sharing one store.
    pub fn with_section_dir(mut self, dir: impl Into<std::path::PathBuf>) -> Self {
        self.sections = DocumentSections::with_dir(dir);
        self
    }

    /// Append successful transitions to `log`.
    pub fn with_event_log(mut self, log: EventLog) -> Self {
        self.events = Some(log);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn repository(&self) -> &Arc<dyn DocumentRepository> {
        &self.repository
    }

    pub fn store(&self) -> &Arc<dyn LockStore> {
        &self.store
    }

    /// Resolve a file id without touching lock state.
    pub fn resolve(&self, file_id: &FileId) -> Result<ResolvedFile> {
        self.resolver.resolve(file_id)
    }

    /// Current lock state of a file id.
    pub fn lock_state(&self, file_id: &FileId) -> Result<LockState> {
        let file = self.resolver.resolve(file_id)?;
        self.in_section(file.doc_ref(), || self.observe(&file))
    }

    // =========================================================================
    // Lock operations
    // =========================================================================

    /// LOCK: take the lock, or refresh it when `lock` is the current value.
    /// Returns the item version.
    pub fn lock(&self, ctx: &RequestContext, file_id: &FileId, lock: Option<&str>) -> Result<u64> {
        self.with_file(Operation::Lock, ctx, file_id, |file| {
            let lock = required(lock, crate::headers::LOCK)?;
            let doc = file.doc_ref();

            self.in_section(doc, || match self.observe(file)? {
                LockState::NativelyLocked => {
                    debug!("document natively locked");
                    Err(WopiError::conflict())
                }
                LockState::WopiLocked(record) if record.lock == lock => {
                    debug!("same lock value, refreshing");
                    let record = self.store.replace(&file.file_id, lock, lock)?;
                    self.bridge.track(doc, &file.file_id, record.expires_at);
                    self.audit(ctx, EventAction::RefreshLock, file, json!({"lock": lock}));
                    self.versions.current(&file.file_id)
                }
                LockState::WopiLocked(record) => {
                    debug!(current = %record.lock, "locked with another value");
                    Err(WopiError::conflict_with(record.lock))
                }
                LockState::Unlocked => {
                    self.check_write_permission(ctx, doc)?;
                    self.bridge.acquire(doc)?;
                    let record = match self.store.put(&file.file_id, lock) {
                        Ok(record) => record,
                        Err(err) => {
                            self.release_if_drained(doc)?;
                            return Err(err.into());
                        }
                    };
                    self.bridge.track(doc, &file.file_id, record.expires_at);
                    debug!(lock = %lock, "lock taken");
                    self.audit(ctx, EventAction::Lock, file, json!({"lock": lock}));
                    self.versions.current(&file.file_id)
                }
            })
        })
    }

    /// UNLOCK_AND_RELOCK: swap `old_lock` for `lock`.
    pub fn unlock_and_relock(
        &self,
        ctx: &RequestContext,
        file_id: &FileId,
        lock: Option<&str>,
        old_lock: Option<&str>,
    ) -> Result<()> {
        self.with_file(Operation::Lock, ctx, file_id, |file| {
            let lock = required(lock, crate::headers::LOCK)?;
            let old_lock = required(old_lock, crate::headers::OLD_LOCK)?;
            let doc = file.doc_ref();

            self.in_section(doc, || match self.observe(file)? {
                LockState::NativelyLocked => Err(WopiError::conflict()),
                LockState::Unlocked => {
                    debug!("cannot relock an unlocked file");
                    Err(WopiError::conflict_with(""))
                }
                LockState::WopiLocked(record) if record.lock != old_lock => {
                    debug!(current = %record.lock, "old lock mismatch");
                    Err(WopiError::conflict_with(record.lock))
                }
                LockState::WopiLocked(_) => {
                    let record = self.store.replace(&file.file_id, old_lock, lock)?;
                    self.bridge.track(doc, &file.file_id, record.expires_at);
                    self.audit(
                        ctx,
                        EventAction::UnlockAndRelock,
                        file,
                        json!({"old_lock": old_lock, "lock": lock}),
                    );
                    Ok(())
                }
            })
        })
    }

    /// UNLOCK: remove the lock and release the native lock when no sibling
    /// holds one. Returns the item version.
    pub fn unlock(
        &self,
        ctx: &RequestContext,
        file_id: &FileId,
        lock: Option<&str>,
    ) -> Result<u64> {
        self.with_file(Operation::Unlock, ctx, file_id, |file| {
            let lock = required(lock, crate::headers::LOCK)?;
            let doc = file.doc_ref();

            self.in_section(doc, || {
                self.expect_lock(file, lock)?;
                self.check_write_permission(ctx, doc)?;
                self.store.remove(&file.file_id, lock)?;
                let remaining = self.sync_holders(doc)?;
                debug!(remaining, "lock removed");
                self.audit(ctx, EventAction::Unlock, file, json!({"lock": lock}));
                self.versions.current(&file.file_id)
            })
        })
    }

    /// REFRESH_LOCK: restart the lock's expiry. Returns the item version.
    pub fn refresh_lock(
        &self,
        ctx: &RequestContext,
        file_id: &FileId,
        lock: Option<&str>,
    ) -> Result<u64> {
        self.with_file(Operation::RefreshLock, ctx, file_id, |file| {
            let lock = required(lock, crate::headers::LOCK)?;
            let doc = file.doc_ref();

            self.in_section(doc, || {
                self.expect_lock(file, lock)?;
                self.check_write_permission(ctx, doc)?;
                let record = self.store.replace(&file.file_id, lock, lock)?;
                self.bridge.track(doc, &file.file_id, record.expires_at);
                self.audit(ctx, EventAction::RefreshLock, file, json!({"lock": lock}));
                self.versions.current(&file.file_id)
            })
        })
    }

    /// GET_LOCK: the current value, empty when unlocked.
    pub fn get_lock(&self, ctx: &RequestContext, file_id: &FileId) -> Result<String> {
        self.with_file(Operation::GetLock, ctx, file_id, |file| {
            self.in_section(file.doc_ref(), || match self.observe(file)? {
                LockState::NativelyLocked => Err(WopiError::conflict()),
                LockState::Unlocked => Ok(String::new()),
                LockState::WopiLocked(record) => Ok(record.lock),
            })
        })
    }

    // =========================================================================
    // Content operations
    // =========================================================================

    /// PUT: replace the blob's bytes. Returns the new item version.
    pub fn put_file(
        &self,
        ctx: &RequestContext,
        file_id: &FileId,
        lock: Option<&str>,
        content: &[u8],
    ) -> Result<u64> {
        self.with_file(Operation::Put, ctx, file_id, |file| {
            let doc = file.doc_ref();
            self.check_write_permission(ctx, doc)?;

            self.in_section(doc, || {
                let blob = self.current_blob(file)?;
                match self.observe(file)? {
                    LockState::NativelyLocked => return Err(WopiError::conflict()),
                    LockState::Unlocked
                        if self.config.require_lock_for_non_empty_put && blob.length > 0 =>
                    {
                        debug!(size = blob.length, "unlocked file is not empty");
                        return Err(WopiError::conflict_with(""));
                    }
                    LockState::Unlocked => {}
                    LockState::WopiLocked(record) => check_lock_header(&record, lock)?,
                }

                let previous = self.repository.read_blob(doc, &file.xpath)?;
                self.repository
                    .write_blob(doc, &file.xpath, &blob.filename, None, content)?;
                let version = self.bump_or_restore(file, || {
                    self.repository
                        .write_blob(doc, &file.xpath, &blob.filename, None, &previous)
                        .map(|_| ())
                })?;
                debug!(size = content.len(), version, "content written");
                self.audit(
                    ctx,
                    EventAction::PutFile,
                    file,
                    json!({"size": content.len(), "item_version": version}),
                );
                Ok(version)
            })
        })
    }

    /// RENAME_FILE: rename the blob to `requested_name` plus its current
    /// extension. Returns the stored file name.
    pub fn rename_file(
        &self,
        ctx: &RequestContext,
        file_id: &FileId,
        lock: Option<&str>,
        requested_name: Option<&str>,
    ) -> Result<String> {
        self.with_file(Operation::RenameFile, ctx, file_id, |file| {
            let doc = file.doc_ref();
            self.check_write_permission(ctx, doc)?;
            let requested = required(requested_name, crate::headers::REQUESTED_NAME)?;

            self.in_section(doc, || {
                self.check_mutation(file, lock)?;
                let blob = self.current_blob(file)?;
                let filename = match extension(&blob.filename) {
                    Some(ext) => format!("{}.{}", requested, ext),
                    None => requested.to_string(),
                };
                self.repository.rename_blob(doc, &file.xpath, &filename)?;
                if self.config.rename_bumps_item_version {
                    self.bump_or_restore(file, || {
                        self.repository
                            .rename_blob(doc, &file.xpath, &blob.filename)
                            .map(|_| ())
                    })?;
                }
                debug!(from = %blob.filename, to = %filename, "blob renamed");
                self.audit(
                    ctx,
                    EventAction::RenameFile,
                    file,
                    json!({"from": blob.filename, "to": filename}),
                );
                Ok(filename)
            })
        })
    }

    /// PUT_RELATIVE: store `content` under a new name, either in place
    /// (file conversion) or as a new document next to the source.
    pub fn put_relative(
        &self,
        ctx: &RequestContext,
        file_id: &FileId,
        request: PutRelativeRequest<'_>,
        content: &[u8],
    ) -> Result<PutRelativeOutcome> {
        self.with_file(Operation::PutRelative, ctx, file_id, |file| {
            let name = relative_target_name(&file.blob, request)?;
            let doc = file.doc_ref();

            if request.file_conversion {
                self.check_write_permission(ctx, doc)?;
                return self.in_section(doc, || {
                    self.check_mutation(file, request.lock)?;
                    let blob = self.current_blob(file)?;
                    let previous = self.repository.read_blob(doc, &file.xpath)?;
                    let label = self.repository.snapshot_before_write(doc)?;
                    debug!(version = %label, "version recorded before conversion");
                    self.repository
                        .write_blob(doc, &file.xpath, &name, None, content)?;
                    let version = self.bump_or_restore(file, || {
                        self.repository
                            .write_blob(doc, &file.xpath, &blob.filename, None, &previous)
                            .map(|_| ())
                    })?;
                    self.audit(
                        ctx,
                        EventAction::PutRelativeFile,
                        file,
                        json!({"name": name, "snapshot": label, "item_version": version}),
                    );
                    Ok(PutRelativeOutcome {
                        name,
                        file_id: file.file_id.clone(),
                        document: doc.clone(),
                        xpath: file.xpath.clone(),
                        item_version: version,
                        snapshot: Some(label),
                    })
                });
            }

            if !self.config.allow_put_relative_creation {
                return Err(WopiError::Unsupported(
                    "creating new files through PUT_RELATIVE is disabled".to_string(),
                ));
            }
            self.check_write_permission(ctx, doc)?;
            let created = self
                .repository
                .create_document(doc, &file.xpath, &name, content)?;
            let new_file_id = FileId::for_field(&created, &file.xpath);
            debug!(new_document = %created, "document created");
            self.audit(
                ctx,
                EventAction::PutRelativeFile,
                file,
                json!({"name": name, "created": new_file_id}),
            );
            Ok(PutRelativeOutcome {
                name,
                item_version: self.versions.current(&new_file_id)?,
                file_id: new_file_id,
                document: created,
                xpath: file.xpath.clone(),
                snapshot: None,
            })
        })
    }

    // =========================================================================
    // Read operations
    // =========================================================================

    /// CheckFileInfo data.
    pub fn check_file_info(&self, ctx: &RequestContext, file_id: &FileId) -> Result<FileSnapshot> {
        let file = self.resolver.resolve(file_id)?;
        Ok(FileSnapshot {
            item_version: self.versions.current(file_id)?,
            user_can_write: self.repository.can_write(file.doc_ref(), &ctx.principal)?,
            file,
        })
    }

    /// GetFile: the blob's bytes and item version.
    ///
    /// `PreconditionFailed` when the blob is larger than `max_blob_size` or
    /// the client's `max_expected_size`.
    pub fn get_file(
        &self,
        ctx: &RequestContext,
        file_id: &FileId,
        max_expected_size: Option<u64>,
    ) -> Result<(Vec<u8>, u64)> {
        let _span = debug_span!("wopi", operation = "GET_FILE", file_id = %file_id, user = %ctx.principal)
            .entered();
        let file = self.resolver.resolve(file_id)?;
        let size = file.blob.length;
        if size > self.config.max_blob_size {
            return Err(WopiError::PreconditionFailed(format!(
                "file size {} exceeds the server limit of {} bytes",
                size, self.config.max_blob_size
            )));
        }
        if let Some(max) = max_expected_size
            && size > max
        {
            return Err(WopiError::PreconditionFailed(format!(
                "file size {} exceeds the expected maximum of {} bytes",
                size, max
            )));
        }
        let content = self.repository.read_blob(file.doc_ref(), &file.xpath)?;
        Ok((content, self.versions.current(file_id)?))
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Release native locks of documents whose WOPI locks have all expired.
    ///
    /// Expired lock records are purged first. Returns the documents whose
    /// native lock was released.
    pub fn reap_expired(&self) -> Result<Vec<DocumentRef>> {
        let purged = self.store.purge_expired()?;
        let mut candidates: BTreeSet<DocumentRef> = purged
            .iter()
            .filter_map(|record| self.resolver.locate(&record.file_id).ok())
            .map(|file_ref| file_ref.document)
            .collect();
        candidates.extend(self.bridge.drained_documents());

        let mut released = Vec::new();
        for doc in candidates {
            if self.repository.document(&doc.doc_id)?.is_none() {
                continue;
            }
            let was_released = self.sections.run(&doc, || -> Result<bool> {
                let live = self.live_sibling_locks(&doc)?;
                self.bridge.reconcile(&doc, live);
                if self.bridge.live_holders(&doc) > 0 {
                    return Ok(false);
                }
                self.bridge.release(&doc)
            })?;
            if was_released {
                released.push(doc);
            }
        }

        if !purged.is_empty() || !released.is_empty() {
            let docs: Vec<String> = released.iter().map(|d| d.to_string()).collect();
            self.append(
                Event::new(EventAction::Reap, self.bridge.marker())
                    .with_details(json!({"purged": purged.len(), "released": docs})),
            );
        }
        debug!(purged = purged.len(), released = released.len(), "reaped expired locks");
        Ok(released)
    }

    /// Set a document's native lock for `owner` on behalf of a non-WOPI actor.
    pub fn lock_natively(&self, ctx: &RequestContext, doc_id: &str, owner: &str) -> Result<()> {
        let doc = self.existing_document(doc_id)?;
        self.sections.run(&doc, || {
            match self.repository.acquire_native_lock(&doc, owner)? {
                Some(holder) if holder != owner => {
                    debug!(holder = %holder, "document already natively locked");
                    Err(WopiError::conflict())
                }
                _ => {
                    self.append(
                        Event::new(EventAction::NativeLock, &ctx.principal)
                            .with_details(json!({"document": doc.to_string(), "owner": owner})),
                    );
                    Ok(())
                }
            }
        })
    }

    /// Clear a native lock held by `owner`. Returns whether it was cleared.
    pub fn unlock_natively(&self, ctx: &RequestContext, doc_id: &str, owner: &str) -> Result<bool> {
        let doc = self.existing_document(doc_id)?;
        self.sections.run(&doc, || {
            let cleared = self.repository.release_native_lock(&doc, owner)?;
            if cleared {
                self.append(
                    Event::new(EventAction::NativeUnlock, &ctx.principal)
                        .with_details(json!({"document": doc.to_string(), "owner": owner})),
                );
            }
            Ok(cleared)
        })
    }

    // =========================================================================
    // Internals
    // =========================================================================

    /// Resolve, then run `op` inside a request span.
    fn with_file<T>(
        &self,
        operation: Operation,
        ctx: &RequestContext,
        file_id: &FileId,
        op: impl FnOnce(&ResolvedFile) -> Result<T>,
    ) -> Result<T> {
        let _span = debug_span!(
            "wopi",
            operation = %operation,
            file_id = %file_id,
            user = %ctx.principal
        )
        .entered();

        let result = self.resolver.resolve(file_id).and_then(|file| {
            debug!(
                repository = %file.doc_ref().repository,
                doc_id = %file.doc_ref().doc_id,
                xpath = %file.xpath,
                "request"
            );
            op(&file)
        });

        match &result {
            Ok(_) => debug!(status = 200, "response"),
            Err(err) => debug!(status = err.status_code(), error = %err, "response"),
        }
        result
    }

    /// Run `f` inside the document's critical section, with the bridge's
    /// holder set reloaded from the store.
    fn in_section<T>(&self, doc: &DocumentRef, f: impl FnOnce() -> Result<T>) -> Result<T> {
        self.sections.run(doc, || {
            self.sync_holders(doc)?;
            f()
        })
    }

    /// Replace the holder set of `doc` with the store's live locks and
    /// release the WOPI native lock when none is left. Returns the live
    /// holder count.
    fn sync_holders(&self, doc: &DocumentRef) -> Result<usize> {
        let live = self.live_sibling_locks(doc)?;
        self.bridge.reconcile(doc, live);
        let holders = self.bridge.live_holders(doc);
        if holders == 0 && self.bridge.release(doc)? {
            debug!("no live WOPI lock left on the document");
        }
        Ok(holders)
    }

    fn live_sibling_locks(&self, doc: &DocumentRef) -> Result<Vec<(FileId, DateTime<Utc>)>> {
        let mut live = Vec::new();
        for sibling in self.resolver.sibling_file_ids(doc)? {
            if let Some(record) = self.store.get(&sibling)? {
                live.push((sibling, record.expires_at));
            }
        }
        Ok(live)
    }

    fn observe(&self, file: &ResolvedFile) -> Result<LockState> {
        if self.bridge.is_held_by_other(file.doc_ref())? {
            return Ok(LockState::NativelyLocked);
        }
        match self.store.get(&file.file_id)? {
            Some(record) => {
                self.bridge
                    .track(file.doc_ref(), &file.file_id, record.expires_at);
                Ok(LockState::WopiLocked(record))
            }
            None => Ok(LockState::Unlocked),
        }
    }

    /// Shared precondition of UNLOCK and REFRESH_LOCK.
    fn expect_lock(&self, file: &ResolvedFile, lock: &str) -> Result<LockRecord> {
        match self.observe(file)? {
            LockState::NativelyLocked => Err(WopiError::conflict()),
            LockState::Unlocked => {
                debug!("file is not locked");
                Err(WopiError::conflict_with(""))
            }
            LockState::WopiLocked(record) if record.lock != lock => {
                debug!(current = %record.lock, "lock mismatch");
                Err(WopiError::conflict_with(record.lock))
            }
            LockState::WopiLocked(record) => Ok(record),
        }
    }

    /// Lock rule for content mutations: unlocked, or locked with `lock`.
    fn check_mutation(&self, file: &ResolvedFile, lock: Option<&str>) -> Result<()> {
        match self.observe(file)? {
            LockState::NativelyLocked => Err(WopiError::conflict()),
            LockState::Unlocked => Ok(()),
            LockState::WopiLocked(record) => check_lock_header(&record, lock),
        }
    }

    fn check_write_permission(&self, ctx: &RequestContext, doc: &DocumentRef) -> Result<()> {
        if self.repository.can_write(doc, &ctx.principal)? {
            Ok(())
        } else {
            debug!("user cannot write the document");
            Err(WopiError::conflict())
        }
    }

    /// Undo a fresh native-lock acquisition when no holder remains.
    fn release_if_drained(&self, doc: &DocumentRef) -> Result<()> {
        if self.bridge.live_holders(doc) == 0 {
            self.bridge.release(doc)?;
        }
        Ok(())
    }

    /// Advance the item version after a content change. When that fails,
    /// `restore` puts the previous content back before the error returns.
    fn bump_or_restore(
        &self,
        file: &ResolvedFile,
        restore: impl FnOnce() -> Result<()>,
    ) -> Result<u64> {
        self.versions.bump(&file.file_id).inspect_err(|err| {
            warn!(error = %err, "item version not advanced, restoring content");
            if let Err(restore_err) = restore() {
                warn!(error = %restore_err, "failed to restore content");
            }
        })
    }

    /// Blob metadata as of now, inside the section.
    fn current_blob(&self, file: &ResolvedFile) -> Result<BlobInfo> {
        self.repository
            .blob(file.doc_ref(), &file.xpath)?
            .ok_or_else(|| WopiError::NotFound(format!("file '{}'", file.file_id)))
    }

    fn existing_document(&self, doc_id: &str) -> Result<DocumentRef> {
        self.repository
            .document(doc_id)?
            .map(|info| info.doc_ref)
            .ok_or_else(|| WopiError::NotFound(format!("document '{}'", doc_id)))
    }

    fn audit(
        &self,
        ctx: &RequestContext,
        action: EventAction,
        file: &ResolvedFile,
        details: serde_json::Value,
    ) {
        self.append(
            Event::new(action, &ctx.principal)
                .with_file(&file.file_id)
                .with_details(details),
        );
    }

    fn append(&self, event: Event) {
        if let Some(log) = &self.events
            && let Err(err) = log.append(&event)
        {
            warn!(action = %event.action, error = %err, "failed to append audit event");
        }
    }
}

/// Non-empty header value or `BadRequest`.
fn required<'a>(value: Option<&'a str>, header: &str) -> Result<&'a str> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| WopiError::BadRequest(format!("missing {} header", header)))
}

/// A locked file may only be changed by a caller presenting its lock.
fn check_lock_header(record: &LockRecord, lock: Option<&str>) -> Result<()> {
    if lock == Some(record.lock.as_str()) {
        Ok(())
    } else {
        debug!(current = %record.lock, "lock header missing or mismatched");
        Err(WopiError::conflict_with(record.lock.clone()))
    }
}

fn extension(filename: &str) -> Option<&str> {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| !ext.is_empty())
}

fn base_name(filename: &str) -> &str {
    Path::new(filename)
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or(filename)
}

/// New file name of a PUT_RELATIVE request. Exactly one target header must
/// be present; a suggested target starting with `.` replaces the extension.
fn relative_target_name(blob: &BlobInfo, request: PutRelativeRequest<'_>) -> Result<String> {
    let suggested = request.suggested_target.filter(|v| !v.is_empty());
    let relative = request.relative_target.filter(|v| !v.is_empty());
    match (suggested, relative) {
        (Some(suggested), None) if suggested.starts_with('.') => {
            Ok(format!("{}{}", base_name(&blob.filename), suggested))
        }
        (Some(suggested), None) => Ok(suggested.to_string()),
        (None, Some(relative)) => Ok(relative.to_string()),
        _ => Err(WopiError::Unsupported(format!(
            "exactly one of {} or {} is required",
            crate::headers::SUGGESTED_TARGET,
            crate::headers::RELATIVE_TARGET
        ))),
    }
}
