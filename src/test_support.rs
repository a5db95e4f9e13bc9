use crate::workspace::Workspace;
use std::path::{Path, PathBuf};
use std::sync::{LazyLock, Mutex, MutexGuard};
use tempfile::TempDir;

static CWD_LOCK: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

pub(crate) struct DirGuard {
    original: PathBuf,
    _lock: MutexGuard<'static, ()>,
}

impl DirGuard {
    pub(crate) fn new(new_dir: &Path) -> Self {
        // The working directory is process-global; serialize even if a
        // #[serial] annotation is missed.
        let lock = CWD_LOCK.lock().unwrap_or_else(|poison| poison.into_inner());
        let original = std::env::current_dir().unwrap();
        std::env::set_current_dir(new_dir).unwrap();
        Self {
            original,
            _lock: lock,
        }
    }
}

impl Drop for DirGuard {
    fn drop(&mut self) {
        let _ = std::env::set_current_dir(&self.original);
    }
}

/// A temporary directory holding an initialized workspace.
pub(crate) fn create_workspace() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    Workspace::at(temp_dir.path()).init().unwrap();
    temp_dir
}

/// A workspace whose config is `yaml`.
pub(crate) fn create_workspace_with_config(yaml: &str) -> TempDir {
    let temp_dir = create_workspace();
    std::fs::write(Workspace::at(temp_dir.path()).config_path(), yaml).unwrap();
    temp_dir
}
