//! Lock files guarding short critical sections across processes.

use super::record::get_owner_string;
use crate::error::{Result, WopiError};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;

/// How long to wait between attempts on a held guard file.
const RETRY_INTERVAL: std::time::Duration = std::time::Duration::from_millis(5);

/// Contents of a guard file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct GuardMetadata {
    owner: String,
    created_at: DateTime<Utc>,
}

impl GuardMetadata {
    fn from_file(path: &Path) -> Option<Self> {
        let content = fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }
}

/// RAII guard for a section lock file.
///
/// When dropped, the lock file is deleted.
#[derive(Debug)]
pub struct SectionGuard {
    path: PathBuf,
}

impl SectionGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SectionGuard {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path)
            && e.kind() != ErrorKind::NotFound
        {
            tracing::warn!(path = %self.path.display(), error = %e, "failed to release section lock");
        }
    }
}

/// Take the lock file at `path`, waiting up to `wait` while another holder
/// has it.
///
/// A file older than `stale_after` (or unreadable once that long has
/// passed) belongs to a holder that died inside its section and is removed.
pub fn acquire_section(path: &Path, wait: Duration, stale_after: Duration) -> Result<SectionGuard> {
    if let Some(parent) = path.parent()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| {
            WopiError::Storage(format!(
                "failed to create sections directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }

    let started = Utc::now();
    loop {
        match try_create(path) {
            Ok(guard) => return Ok(guard),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(WopiError::Storage(format!(
                    "failed to acquire section lock '{}': {}",
                    path.display(),
                    e
                )));
            }
        }

        let now = Utc::now();
        let stale = match GuardMetadata::from_file(path) {
            Some(meta) => now - meta.created_at > stale_after,
            None => now - started > stale_after,
        };
        if stale {
            tracing::warn!(path = %path.display(), "removing stale section lock");
            let _ = fs::remove_file(path);
            continue;
        }
        if now - started > wait {
            let holder = GuardMetadata::from_file(path)
                .map(|meta| meta.owner)
                .unwrap_or_else(|| "unknown".to_string());
            return Err(WopiError::Storage(format!(
                "section lock '{}' is held by {}",
                path.display(),
                holder
            )));
        }
        thread::sleep(RETRY_INTERVAL);
    }
}

fn try_create(path: &Path) -> std::io::Result<SectionGuard> {
    let mut file = OpenOptions::new().write(true).create_new(true).open(path)?;
    let guard = SectionGuard {
        path: path.to_path_buf(),
    };
    let metadata = GuardMetadata {
        owner: get_owner_string(),
        created_at: Utc::now(),
    };
    let json = serde_json::to_string(&metadata).map_err(std::io::Error::other)?;
    file.write_all(json.as_bytes())?;
    file.sync_all()?;
    Ok(guard)
}
