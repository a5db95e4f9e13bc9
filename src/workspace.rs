//! On-disk workspace resolution for wopilock.
//!
//! A workspace is any directory containing a `.wopilock/` state directory:
//!
//! ```text
//! .wopilock/
//!   config.yaml          # Config
//!   locks/               # one <file_id>.lock per WOPI lock
//!   sections/            # <document>.section while a request holds it
//!   item-versions.json   # item version per file id
//!   docs/                # FsRepository root
//!   events.ndjson        # audit log
//! ```
//!
//! Commands other than `init` locate the workspace by walking up from the
//! working directory, the way git finds its repository.

use crate::config::Config;
use crate::engine::LockEngine;
use crate::error::{Result, WopiError};
use crate::events::EventLog;
use crate::fs::atomic_write_file;
use crate::locks::FileLockStore;
use crate::repository::FsRepository;
use crate::versions::FileItemVersions;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// State directory name under the workspace root.
pub const STATE_DIR: &str = ".wopilock";

/// Repository name embedded in file ids of workspace documents.
pub const REPOSITORY_NAME: &str = "default";

/// Resolved paths of a workspace. All paths are absolute when resolved
/// from an absolute directory.
#[derive(Debug, Clone)]
pub struct Workspace {
    pub root: PathBuf,
    pub state_dir: PathBuf,
    pub locks_dir: PathBuf,
    pub docs_dir: PathBuf,
}

impl Workspace {
    /// Workspace rooted at `root`, whether or not it is initialized.
    pub fn at<P: AsRef<Path>>(root: P) -> Self {
        let root = root.as_ref().to_path_buf();
        let state_dir = root.join(STATE_DIR);
        Self {
            locks_dir: state_dir.join("locks"),
            docs_dir: state_dir.join("docs"),
            state_dir,
            root,
        }
    }

    /// Find the workspace enclosing the current working directory.
    pub fn resolve() -> Result<Self> {
        let cwd = env::current_dir().map_err(|e| {
            WopiError::Storage(format!("failed to get current working directory: {}", e))
        })?;
        Self::resolve_from(cwd)
    }

    /// Find the nearest ancestor of `dir` (inclusive) holding `.wopilock/`.
    pub fn resolve_from<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        for candidate in dir.ancestors() {
            if candidate.join(STATE_DIR).is_dir() {
                return Ok(Self::at(candidate));
            }
        }
        Err(WopiError::Config(format!(
            "no wopilock workspace found in '{}' or any parent directory.\n\n\
             Run `wopilock init` to create one.",
            dir.display()
        )))
    }

    pub fn config_path(&self) -> PathBuf {
        self.state_dir.join("config.yaml")
    }

    pub fn versions_path(&self) -> PathBuf {
        self.state_dir.join("item-versions.json")
    }

    pub fn events_path(&self) -> PathBuf {
        self.state_dir.join("events.ndjson")
    }

    /// Directory of per-document section lock files.
    pub fn sections_path(&self) -> PathBuf {
        self.state_dir.join("sections")
    }

    pub fn exists(&self) -> bool {
        self.state_dir.is_dir()
    }

    /// Create the state directories and a default config. Existing files
    /// are left alone. Returns whether the workspace was newly created.
    pub fn init(&self) -> Result<bool> {
        let created = !self.exists();
        for dir in [&self.state_dir, &self.locks_dir, &self.docs_dir] {
            fs::create_dir_all(dir).map_err(|e| {
                WopiError::Storage(format!(
                    "failed to create directory '{}': {}",
                    dir.display(),
                    e
                ))
            })?;
        }
        let config_path = self.config_path();
        if !config_path.exists() {
            atomic_write_file(&config_path, &Config::default().to_yaml()?)?;
        }
        Ok(created)
    }

    pub fn load_config(&self) -> Result<Config> {
        Config::load_or_default(self.config_path())
    }

    pub fn repository(&self) -> FsRepository {
        FsRepository::new(REPOSITORY_NAME, &self.docs_dir)
    }

    pub fn event_log(&self) -> EventLog {
        EventLog::new(self.events_path())
    }

    /// Engine over the file-backed stores of this workspace.
    pub fn open_engine(&self) -> Result<LockEngine> {
        let config = self.load_config()?;
        let store = FileLockStore::new(&self.locks_dir, config.lock_ttl());
        Ok(LockEngine::new(
            config,
            Arc::new(self.repository()),
            Arc::new(store),
            Arc::new(FileItemVersions::new(self.versions_path())),
        )
        .with_section_dir(self.sections_path())
        .with_event_log(self.event_log()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::RequestContext;
    use crate::identity::FileId;
    use crate::repository::{DocumentRepository, DocumentSpec, Permission};
    use crate::test_support::{DirGuard, create_workspace};
    use serial_test::serial;
    use tempfile::TempDir;

    #[test]
    fn init_creates_layout_and_is_idempotent() {
        let temp = TempDir::new().unwrap();
        let workspace = Workspace::at(temp.path());
        assert!(!workspace.exists());

        assert!(workspace.init().unwrap());
        assert!(workspace.locks_dir.is_dir());
        assert!(workspace.docs_dir.is_dir());
        assert!(workspace.config_path().is_file());

        fs::write(workspace.config_path(), "lock_ttl_minutes: 5\n").unwrap();
        assert!(!workspace.init().unwrap());
        assert_eq!(workspace.load_config().unwrap().lock_ttl_minutes, 5);
    }

    #[test]
    fn resolve_from_walks_up_to_state_dir() {
        let temp = create_workspace();
        let nested = temp.path().join("a").join("b");
        fs::create_dir_all(&nested).unwrap();

        let workspace = Workspace::resolve_from(&nested).unwrap();
        assert_eq!(workspace.root, temp.path());
    }

    #[test]
    fn resolve_from_without_workspace_fails() {
        let temp = TempDir::new().unwrap();
        let err = Workspace::resolve_from(temp.path()).unwrap_err();
        assert!(err.to_string().contains("wopilock init"));
    }

    #[test]
    #[serial]
    fn resolve_uses_current_directory() {
        let temp = create_workspace();
        let _guard = DirGuard::new(temp.path());
        let workspace = Workspace::resolve().unwrap();
        assert!(workspace.exists());
    }

    #[test]
    fn engine_state_survives_reopen() {
        let temp = create_workspace();
        let workspace = Workspace::at(temp.path());
        let doc = workspace
            .repository()
            .add_document(
                DocumentSpec::new("Notes")
                    .with_id("notes")
                    .grant("john", Permission::ReadWrite)
                    .blob("file:content", "notes.txt", "hello"),
            )
            .unwrap();
        let id = FileId::for_field(&doc, "file:content");
        let john = RequestContext::new("john");

        let engine = workspace.open_engine().unwrap();
        engine.lock(&john, &id, Some("foo")).unwrap();
        assert_eq!(engine.put_file(&john, &id, Some("foo"), b"v1").unwrap(), 1);
        drop(engine);

        let reopened = workspace.open_engine().unwrap();
        assert_eq!(reopened.get_lock(&john, &id).unwrap(), "foo");
        assert_eq!(reopened.unlock(&john, &id, Some("foo")).unwrap(), 1);
        assert_eq!(workspace.repository().native_lock(&doc).unwrap(), None);
        assert_eq!(workspace.event_log().read_all().unwrap().len(), 3);
    }

    #[test]
    fn engines_sharing_a_workspace_keep_the_native_lock_consistent() {
        let temp = create_workspace();
        let workspace = Workspace::at(temp.path());
        let doc = workspace
            .repository()
            .add_document(
                DocumentSpec::new("Deck")
                    .with_id("deck")
                    .grant("john", Permission::ReadWrite)
                    .blob("file:content", "deck.pptx", "slides")
                    .blob("files:files/0/file", "notes.txt", "notes"),
            )
            .unwrap();
        let main = FileId::for_field(&doc, "file:content");
        let attachment = FileId::for_field(&doc, "files:files/0/file");
        let john = RequestContext::new("john");

        // One engine per process, both open at once
        let first = workspace.open_engine().unwrap();
        let second = workspace.open_engine().unwrap();
        first.lock(&john, &main, Some("a")).unwrap();
        second.lock(&john, &attachment, Some("b")).unwrap();

        first.unlock(&john, &main, Some("a")).unwrap();
        assert_eq!(
            workspace.repository().native_lock(&doc).unwrap().as_deref(),
            Some("wopi")
        );
        assert_eq!(first.get_lock(&john, &attachment).unwrap(), "b");

        second.unlock(&john, &attachment, Some("b")).unwrap();
        assert_eq!(workspace.repository().native_lock(&doc).unwrap(), None);
        let leftover = fs::read_dir(workspace.sections_path()).unwrap().count();
        assert_eq!(leftover, 0);
    }
}
