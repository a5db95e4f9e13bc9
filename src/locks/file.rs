//! Lock store persisted as one file per locked file id.

use super::record::LockRecord;
use super::store::{LockStore, LockStoreError, StoreResult, expect_value, live};
use crate::error::WopiError;
use crate::fs::atomic_write;
use crate::identity::FileId;
use chrono::{Duration, Utc};
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Lock store under a directory of `<file_id>.lock` JSON files.
///
/// New records are created with create_new so two writers never both
/// succeed. Replacements go through an atomic rename. Compare-and-set steps
/// are serialized within the process by a mutex.
pub struct FileLockStore {
    dir: PathBuf,
    ttl: Duration,
    guard: Mutex<()>,
}

impl FileLockStore {
    pub fn new(dir: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            dir: dir.into(),
            ttl,
            guard: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn lock(&self) -> MutexGuard<'_, ()> {
        self.guard.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn path_for(&self, file_id: &FileId) -> PathBuf {
        self.dir.join(format!("{}.lock", file_id.as_str()))
    }

    fn read(&self, path: &Path) -> StoreResult<Option<LockRecord>> {
        if !path.exists() {
            return Ok(None);
        }
        read_record(path).map(Some)
    }

    fn write(&self, record: &LockRecord) -> StoreResult<()> {
        let json = to_json(record)?;
        atomic_write(self.path_for(&record.file_id), json.as_bytes())?;
        Ok(())
    }

    /// Every parseable record in the directory, sorted by file id.
    fn read_all(&self) -> StoreResult<Vec<LockRecord>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.dir).map_err(|e| {
            WopiError::Storage(format!(
                "failed to read locks directory '{}': {}",
                self.dir.display(),
                e
            ))
        })?;

        let mut records = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| {
                WopiError::Storage(format!("failed to read locks directory entry: {}", e))
            })?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("lock") {
                continue;
            }
            // Skip unreadable lock files
            if let Ok(record) = read_record(&path) {
                records.push(record);
            }
        }
        records.sort_by(|a, b| a.file_id.cmp(&b.file_id));
        Ok(records)
    }

    /// Exclusively create a record file.
    fn create(&self, path: &Path, record: &LockRecord) -> StoreResult<()> {
        if !self.dir.exists() {
            fs::create_dir_all(&self.dir).map_err(|e| {
                WopiError::Storage(format!(
                    "failed to create locks directory '{}': {}",
                    self.dir.display(),
                    e
                ))
            })?;
        }

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(path)
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::AlreadyExists {
                    let current = read_record(path).map(|r| r.lock).unwrap_or_default();
                    LockStoreError::AlreadyLocked {
                        file_id: record.file_id.clone(),
                        current,
                    }
                } else {
                    LockStoreError::Storage(WopiError::Storage(format!(
                        "failed to create lock file '{}': {}",
                        path.display(),
                        e
                    )))
                }
            })?;

        let json = to_json(record)?;
        file.write_all(json.as_bytes()).map_err(|e| {
            let _ = fs::remove_file(path);
            WopiError::Storage(format!("failed to write lock record: {}", e))
        })?;
        file.sync_all().map_err(|e| {
            let _ = fs::remove_file(path);
            WopiError::Storage(format!("failed to sync lock file: {}", e))
        })?;
        Ok(())
    }
}

fn read_record(path: &Path) -> StoreResult<LockRecord> {
    let content = fs::read_to_string(path).map_err(|e| {
        WopiError::Storage(format!("failed to read lock file '{}': {}", path.display(), e))
    })?;
    let record = serde_json::from_str(&content).map_err(|e| {
        WopiError::Storage(format!("failed to parse lock file '{}': {}", path.display(), e))
    })?;
    Ok(record)
}

fn to_json(record: &LockRecord) -> StoreResult<String> {
    let json = serde_json::to_string_pretty(record)
        .map_err(|e| WopiError::Storage(format!("failed to serialize lock record: {}", e)))?;
    Ok(json)
}

impl LockStore for FileLockStore {
    fn get(&self, file_id: &FileId) -> StoreResult<Option<LockRecord>> {
        let _guard = self.lock();
        Ok(live(self.read(&self.path_for(file_id))?, Utc::now()))
    }

    fn put(&self, file_id: &FileId, lock: &str) -> StoreResult<LockRecord> {
        let _guard = self.lock();
        let path = self.path_for(file_id);
        let record = LockRecord::new(file_id.clone(), lock, self.ttl);

        match self.read(&path)? {
            Some(current) if current.is_live_at(Utc::now()) => {
                Err(LockStoreError::AlreadyLocked {
                    file_id: file_id.clone(),
                    current: current.lock,
                })
            }
            Some(_) => {
                self.write(&record)?;
                Ok(record)
            }
            None => {
                self.create(&path, &record)?;
                Ok(record)
            }
        }
    }

    fn replace(&self, file_id: &FileId, expected: &str, new: &str) -> StoreResult<LockRecord> {
        let _guard = self.lock();
        let current = live(self.read(&self.path_for(file_id))?, Utc::now());
        let record = expect_value(file_id, current, expected)?.renewed(new, self.ttl);
        self.write(&record)?;
        Ok(record)
    }

    fn remove(&self, file_id: &FileId, expected: &str) -> StoreResult<()> {
        let _guard = self.lock();
        let path = self.path_for(file_id);
        let current = live(self.read(&path)?, Utc::now());
        expect_value(file_id, current, expected)?;
        fs::remove_file(&path).map_err(|e| {
            WopiError::Storage(format!(
                "failed to remove lock file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Ok(())
    }

    fn list(&self) -> StoreResult<Vec<LockRecord>> {
        let _guard = self.lock();
        self.read_all()
    }

    fn purge_expired(&self) -> StoreResult<Vec<LockRecord>> {
        let _guard = self.lock();
        let now = Utc::now();
        let expired: Vec<LockRecord> = self
            .read_all()?
            .into_iter()
            .filter(|r| !r.is_live_at(now))
            .collect();
        for record in &expired {
            let path = self.path_for(&record.file_id);
            fs::remove_file(&path).map_err(|e| {
                WopiError::Storage(format!(
                    "failed to remove lock file '{}': {}",
                    path.display(),
                    e
                ))
            })?;
        }
        Ok(expired)
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }
}
