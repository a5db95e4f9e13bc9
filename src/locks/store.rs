//! The lock store contract.

use super::record::LockRecord;
use crate::error::WopiError;
use crate::identity::FileId;
use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

/// Why a store operation did not apply.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LockStoreError {
    /// `put` found a live record.
    #[error("file '{file_id}' is already locked")]
    AlreadyLocked { file_id: FileId, current: String },

    /// `replace` or `remove` found no live record.
    #[error("file '{0}' is not locked")]
    Absent(FileId),

    /// `replace` or `remove` found a different value.
    #[error("lock mismatch on file '{file_id}'")]
    Mismatch { file_id: FileId, current: String },

    /// The backing storage failed.
    #[error(transparent)]
    Storage(#[from] WopiError),
}

impl From<LockStoreError> for WopiError {
    fn from(err: LockStoreError) -> Self {
        match err {
            LockStoreError::AlreadyLocked { current, .. }
            | LockStoreError::Mismatch { current, .. } => WopiError::conflict_with(current),
            LockStoreError::Absent(_) => WopiError::conflict_with(""),
            LockStoreError::Storage(inner) => inner,
        }
    }
}

pub type StoreResult<T> = std::result::Result<T, LockStoreError>;

/// Durable mapping from file id to lock record.
///
/// Each method is atomic with respect to other calls on the same store.
pub trait LockStore: Send + Sync {
    /// The live record for `file_id`, if any.
    fn get(&self, file_id: &FileId) -> StoreResult<Option<LockRecord>>;

    /// Create a record. Fails with `AlreadyLocked` when a live one exists.
    fn put(&self, file_id: &FileId, lock: &str) -> StoreResult<LockRecord>;

    /// Swap `expected` for `new` and restart expiry.
    fn replace(&self, file_id: &FileId, expected: &str, new: &str) -> StoreResult<LockRecord>;

    /// Delete the record when its value is `expected`.
    fn remove(&self, file_id: &FileId, expected: &str) -> StoreResult<()>;

    /// Every stored record, expired ones included, sorted by file id.
    fn list(&self) -> StoreResult<Vec<LockRecord>>;

    /// Delete every expired record and return what was deleted.
    fn purge_expired(&self) -> StoreResult<Vec<LockRecord>>;

    /// Lifetime given to written records.
    fn ttl(&self) -> Duration;
}

/// Drop an expired record.
pub(crate) fn live(record: Option<LockRecord>, now: DateTime<Utc>) -> Option<LockRecord> {
    record.filter(|r| r.is_live_at(now))
}

/// Check a compare-and-set precondition against the current live record.
pub(crate) fn expect_value(
    file_id: &FileId,
    current: Option<LockRecord>,
    expected: &str,
) -> StoreResult<LockRecord> {
    match current {
        None => Err(LockStoreError::Absent(file_id.clone())),
        Some(record) if record.lock == expected => Ok(record),
        Some(record) => Err(LockStoreError::Mismatch {
            file_id: file_id.clone(),
            current: record.lock,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_errors_map_to_conflicts() {
        let id = FileId::compute("default", "doc", "file:content");
        let already: WopiError = LockStoreError::AlreadyLocked {
            file_id: id.clone(),
            current: "foo".into(),
        }
        .into();
        assert_eq!(already.lock_header(), Some("foo"));

        let absent: WopiError = LockStoreError::Absent(id.clone()).into();
        assert_eq!(absent.lock_header(), Some(""));

        let storage: WopiError = LockStoreError::Storage(WopiError::Storage("disk".into())).into();
        assert_eq!(storage.status_code(), 500);
    }
}
