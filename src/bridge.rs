//! Bridge between WOPI locks and the repository's native document lock.
//!
//! A document may hold several lockable fields, each with its own WOPI
//! lock. The native lock is document-wide, so the bridge keeps, per
//! document, the set of file ids holding a live WOPI lock together with
//! their expiry. The native lock is taken (with the configured owner
//! marker) when that set gains its first member and cleared when it
//! drains.
//!
//! The engine rebuilds a document's holder set from the lock store
//! (`reconcile`) at the start of every critical section, so the store
//! stays the authority when several engines share it. Holders whose
//! expiry has passed no longer count;
//! [`RepositoryLockBridge::drained_documents`] reports documents left
//! natively locked with no live holder so the engine can reap them.
//!
//! Callers serialize per document: every method here is meant to run
//! inside the engine's per-document critical section.

use crate::error::{Result, WopiError};
use crate::identity::FileId;
use crate::repository::{DocumentRef, DocumentRepository};
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Holders {
    expiries: HashMap<FileId, DateTime<Utc>>,
}

impl Holders {
    fn live_count(&self, now: DateTime<Utc>) -> usize {
        self.expiries.values().filter(|exp| now < **exp).count()
    }

    fn prune(&mut self, now: DateTime<Utc>) {
        self.expiries.retain(|_, exp| now < *exp);
    }
}

/// Tracks WOPI lock holders per document and drives the native lock.
pub struct RepositoryLockBridge {
    repository: Arc<dyn DocumentRepository>,
    marker: String,
    holders: Mutex<BTreeMap<DocumentRef, Holders>>,
}

impl RepositoryLockBridge {
    pub fn new(repository: Arc<dyn DocumentRepository>, marker: impl Into<String>) -> Self {
        Self {
            repository,
            marker: marker.into(),
            holders: Mutex::new(BTreeMap::new()),
        }
    }

    /// Owner string written into native locks taken on behalf of WOPI.
    pub fn marker(&self) -> &str {
        &self.marker
    }

    fn holders(&self) -> MutexGuard<'_, BTreeMap<DocumentRef, Holders>> {
        self.holders.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Whether the document is natively locked by someone other than WOPI.
    pub fn is_held_by_other(&self, doc: &DocumentRef) -> Result<bool> {
        Ok(self
            .repository
            .native_lock(doc)?
            .is_some_and(|holder| holder != self.marker))
    }

    /// Take the native lock for WOPI. A no-op when WOPI already holds it.
    pub fn acquire(&self, doc: &DocumentRef) -> Result<()> {
        match self.repository.acquire_native_lock(doc, &self.marker)? {
            Some(holder) if holder != self.marker => {
                tracing::debug!(document = %doc, holder = %holder, "native lock held by another owner");
                Err(WopiError::conflict())
            }
            Some(_) => Ok(()),
            None => {
                tracing::debug!(document = %doc, "native lock acquired");
                Ok(())
            }
        }
    }

    /// Clear the native lock if WOPI holds it. Returns whether it was cleared.
    pub fn release(&self, doc: &DocumentRef) -> Result<bool> {
        let released = self.repository.release_native_lock(doc, &self.marker)?;
        if released {
            tracing::debug!(document = %doc, "native lock released");
        }
        Ok(released)
    }

    /// Replace the holder set of `doc` with freshly read live locks.
    pub fn reconcile(
        &self,
        doc: &DocumentRef,
        live: impl IntoIterator<Item = (FileId, DateTime<Utc>)>,
    ) {
        let mut holders = self.holders();
        holders.entry(doc.clone()).or_default().expiries = live.into_iter().collect();
    }

    /// Record `file_id` as holding a lock on `doc` until `expires_at`.
    pub fn track(&self, doc: &DocumentRef, file_id: &FileId, expires_at: DateTime<Utc>) {
        self.holders()
            .entry(doc.clone())
            .or_default()
            .expiries
            .insert(file_id.clone(), expires_at);
    }

    /// Live holders of `doc`.
    pub fn live_holders(&self, doc: &DocumentRef) -> usize {
        self.holders()
            .get(doc)
            .map(|h| h.live_count(Utc::now()))
            .unwrap_or(0)
    }

    /// Tracked documents whose holders have all expired. Expired holders
    /// are dropped from the sets as a side effect.
    pub fn drained_documents(&self) -> Vec<DocumentRef> {
        let now = Utc::now();
        let mut holders = self.holders();
        let mut drained = Vec::new();
        for (doc, entry) in holders.iter_mut() {
            let had_holders = !entry.expiries.is_empty();
            entry.prune(now);
            if had_holders && entry.expiries.is_empty() {
                drained.push(doc.clone());
            }
        }
        drained
    }
}
