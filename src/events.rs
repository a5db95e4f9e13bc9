//! Audit log of lock and content mutations.
//!
//! Every successful state change made through the engine is appended to an
//! NDJSON file (one JSON object per line), `.wopilock/events.ndjson` in a
//! workspace.
//!
//! # Event Format
//!
//! - `ts`: RFC3339 timestamp
//! - `action`: what happened (lock, unlock, put_file, ...)
//! - `actor`: principal on whose behalf the engine acted
//! - `file_id`: the affected file, when the action targets one
//! - `details`: freeform object with action-specific details
//!
//! ```no_run
//! use wopilock::events::{Event, EventAction, EventLog};
//! use serde_json::json;
//!
//! let log = EventLog::new(".wopilock/events.ndjson");
//! let event = Event::new(EventAction::Lock, "john")
//!     .with_details(json!({"lock": "foo"}));
//! log.append(&event)?;
//! # Ok::<(), wopilock::error::WopiError>(())
//! ```

use crate::error::{Result, WopiError};
use crate::identity::FileId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Actions that can be logged as events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventAction {
    /// Workspace initialization
    Init,
    /// Document added to the repository
    DocAdd,
    /// WOPI lock taken or refreshed through LOCK
    Lock,
    /// WOPI lock released
    Unlock,
    /// WOPI lock expiry restarted
    RefreshLock,
    /// WOPI lock value swapped
    UnlockAndRelock,
    /// Blob content replaced
    PutFile,
    /// Blob renamed
    RenameFile,
    /// Blob converted in place or copied to a new document
    PutRelativeFile,
    /// Native document lock set from the CLI
    NativeLock,
    /// Native document lock cleared from the CLI
    NativeUnlock,
    /// Expired locks reaped
    Reap,
}

impl std::fmt::Display for EventAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            EventAction::Init => "init",
            EventAction::DocAdd => "doc_add",
            EventAction::Lock => "lock",
            EventAction::Unlock => "unlock",
            EventAction::RefreshLock => "refresh_lock",
            EventAction::UnlockAndRelock => "unlock_and_relock",
            EventAction::PutFile => "put_file",
            EventAction::RenameFile => "rename_file",
            EventAction::PutRelativeFile => "put_relative_file",
            EventAction::NativeLock => "native_lock",
            EventAction::NativeUnlock => "native_unlock",
            EventAction::Reap => "reap",
        };
        f.write_str(name)
    }
}

/// An event record for the audit log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    /// RFC3339 timestamp when the event occurred.
    pub ts: DateTime<Utc>,

    /// The action that was performed.
    pub action: EventAction,

    /// Principal on whose behalf the action ran.
    pub actor: String,

    /// The affected file, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_id: Option<FileId>,

    /// Freeform details object with action-specific information.
    pub details: Value,
}

impl Event {
    /// Create a new event stamped with the current time.
    pub fn new(action: EventAction, actor: impl Into<String>) -> Self {
        Self {
            ts: Utc::now(),
            action,
            actor: actor.into(),
            file_id: None,
            details: Value::Object(serde_json::Map::new()),
        }
    }

    pub fn with_file(mut self, file_id: &FileId) -> Self {
        self.file_id = Some(file_id.clone());
        self
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    /// Serialize the event to a single-line JSON string.
    pub fn to_ndjson_line(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| WopiError::Storage(format!("failed to serialize event to JSON: {}", e)))
    }
}

/// Append-only NDJSON event file.
#[derive(Debug, Clone)]
pub struct EventLog {
    path: PathBuf,
}

impl EventLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event as a line, creating the file if needed.
    pub fn append(&self, event: &Event) -> Result<()> {
        let json_line = event.to_ndjson_line()?;

        if let Some(dir) = self.path.parent()
            && !dir.as_os_str().is_empty()
            && !dir.exists()
        {
            fs::create_dir_all(dir).map_err(|e| {
                WopiError::Storage(format!(
                    "failed to create events directory '{}': {}",
                    dir.display(),
                    e
                ))
            })?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| {
                WopiError::Storage(format!(
                    "failed to open events file '{}': {}",
                    self.path.display(),
                    e
                ))
            })?;

        writeln!(file, "{}", json_line).map_err(|e| {
            WopiError::Storage(format!(
                "failed to write event to '{}': {}",
                self.path.display(),
                e
            ))
        })?;

        file.sync_all().map_err(|e| {
            WopiError::Storage(format!(
                "failed to sync events file '{}': {}",
                self.path.display(),
                e
            ))
        })?;

        Ok(())
    }

    /// All events in the log, oldest first. A missing file is an empty log.
    pub fn read_all(&self) -> Result<Vec<Event>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path).map_err(|e| {
            WopiError::Storage(format!(
                "failed to read events file '{}': {}",
                self.path.display(),
                e
            ))
        })?;
        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                serde_json::from_str(line).map_err(|e| {
                    WopiError::Storage(format!("invalid event line in '{}': {}", self.path.display(), e))
                })
            })
            .collect()
    }
}
