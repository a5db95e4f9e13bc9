//! Process-local lock store.

use super::record::LockRecord;
use super::store::{LockStore, LockStoreError, StoreResult, expect_value, live};
use crate::identity::FileId;
use chrono::{Duration, Utc};
use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};

/// Lock store held in a mutex-guarded map.
pub struct MemoryLockStore {
    ttl: Duration,
    records: Mutex<BTreeMap<FileId, LockRecord>>,
}

impl MemoryLockStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            records: Mutex::new(BTreeMap::new()),
        }
    }

    fn records(&self) -> MutexGuard<'_, BTreeMap<FileId, LockRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl LockStore for MemoryLockStore {
    fn get(&self, file_id: &FileId) -> StoreResult<Option<LockRecord>> {
        Ok(live(self.records().get(file_id).cloned(), Utc::now()))
    }

    fn put(&self, file_id: &FileId, lock: &str) -> StoreResult<LockRecord> {
        let mut records = self.records();
        if let Some(current) = live(records.get(file_id).cloned(), Utc::now()) {
            return Err(LockStoreError::AlreadyLocked {
                file_id: file_id.clone(),
                current: current.lock,
            });
        }
        let record = LockRecord::new(file_id.clone(), lock, self.ttl);
        records.insert(file_id.clone(), record.clone());
        Ok(record)
    }

    fn replace(&self, file_id: &FileId, expected: &str, new: &str) -> StoreResult<LockRecord> {
        let mut records = self.records();
        let current = live(records.get(file_id).cloned(), Utc::now());
        let record = expect_value(file_id, current, expected)?.renewed(new, self.ttl);
        records.insert(file_id.clone(), record.clone());
        Ok(record)
    }

    fn remove(&self, file_id: &FileId, expected: &str) -> StoreResult<()> {
        let mut records = self.records();
        let current = live(records.get(file_id).cloned(), Utc::now());
        expect_value(file_id, current, expected)?;
        records.remove(file_id);
        Ok(())
    }

    fn list(&self) -> StoreResult<Vec<LockRecord>> {
        Ok(self.records().values().cloned().collect())
    }

    fn purge_expired(&self) -> StoreResult<Vec<LockRecord>> {
        let now = Utc::now();
        let mut records = self.records();
        let expired: Vec<LockRecord> = records
            .values()
            .filter(|r| !r.is_live_at(now))
            .cloned()
            .collect();
        for record in &expired {
            records.remove(&record.file_id);
        }
        Ok(expired)
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }
}
