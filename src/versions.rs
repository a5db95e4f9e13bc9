//! Per-file item version counters.
//!
//! The item version is the value of the `X-WOPI-ItemVersion` header. It
//! starts at 0 and advances by one on each content change, so clients can
//! tell whether their copy is current.

use crate::error::{Result, WopiError};
use crate::fs::atomic_write;
use crate::identity::FileId;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

/// Monotonic counter per file id.
pub trait ItemVersionCounter: Send + Sync {
    /// Current version, 0 for a file never bumped.
    fn current(&self, file_id: &FileId) -> Result<u64>;

    /// Advance by one and return the new version.
    fn bump(&self, file_id: &FileId) -> Result<u64>;
}

/// Counters kept in process memory.
#[derive(Default)]
pub struct MemoryItemVersions {
    counters: Mutex<BTreeMap<FileId, u64>>,
}

impl MemoryItemVersions {
    pub fn new() -> Self {
        Self::default()
    }

    fn counters(&self) -> MutexGuard<'_, BTreeMap<FileId, u64>> {
        self.counters.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ItemVersionCounter for MemoryItemVersions {
    fn current(&self, file_id: &FileId) -> Result<u64> {
        Ok(self.counters().get(file_id).copied().unwrap_or(0))
    }

    fn bump(&self, file_id: &FileId) -> Result<u64> {
        let mut counters = self.counters();
        let next = counters.get(file_id).copied().unwrap_or(0) + 1;
        counters.insert(file_id.clone(), next);
        Ok(next)
    }
}

/// Counters stored as a JSON map in a single file.
pub struct FileItemVersions {
    path: PathBuf,
    guard: Mutex<()>,
}

impl FileItemVersions {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            guard: Mutex::new(()),
        }
    }

    fn load(&self) -> Result<BTreeMap<String, u64>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let content = fs::read_to_string(&self.path).map_err(|e| {
            WopiError::Storage(format!(
                "failed to read item versions '{}': {}",
                self.path.display(),
                e
            ))
        })?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content).map_err(|e| {
            WopiError::Storage(format!(
                "failed to parse item versions '{}': {}",
                self.path.display(),
                e
            ))
        })
    }
}

impl ItemVersionCounter for FileItemVersions {
    fn current(&self, file_id: &FileId) -> Result<u64> {
        let _guard = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.load()?.get(file_id.as_str()).copied().unwrap_or(0))
    }

    fn bump(&self, file_id: &FileId) -> Result<u64> {
        let _guard = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        let mut counters = self.load()?;
        let next = counters.get(file_id.as_str()).copied().unwrap_or(0) + 1;
        counters.insert(file_id.as_str().to_string(), next);

        let json = serde_json::to_string_pretty(&counters)
            .map_err(|e| WopiError::Storage(format!("failed to serialize item versions: {}", e)))?;
        atomic_write(&self.path, json.as_bytes())?;
        Ok(next)
    }
}
