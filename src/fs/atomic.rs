//! Atomic filesystem operations.
//!
//! All atomic writes follow this pattern:
//! 1. Write content to a uniquely named temporary file in the same directory
//! 2. Sync the file to disk (fsync)
//! 3. Rename it over the target
//!
//! `rename` replaces the destination atomically on POSIX, and std maps it to
//! `MoveFileExW(MOVEFILE_REPLACE_EXISTING)` on Windows. Source and destination
//! must be on the same filesystem, which holds because the temporary file
//! lives next to the target. On crash, a `.{filename}.{uuid}.tmp` may remain.

use crate::error::{Result, WopiError};
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Atomically write bytes to a file.
///
/// The target file is never observed in a partial state: readers see either
/// the previous content or the new content.
///
/// # Example
///
/// ```no_run
/// use wopilock::fs::atomic_write;
/// use std::path::Path;
///
/// atomic_write(Path::new("versions.json"), b"{}")?;
/// # Ok::<(), wopilock::error::WopiError>(())
/// ```
pub fn atomic_write<P: AsRef<Path>>(path: P, content: &[u8]) -> Result<()> {
    let path = path.as_ref();

    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
        && !parent.exists()
    {
        fs::create_dir_all(parent).map_err(|e| {
            WopiError::Storage(format!(
                "failed to create parent directory '{}': {}",
                parent.display(),
                e
            ))
        })?;
    }

    let temp_path = generate_temp_path(path)?;
    write_and_sync(&temp_path, content)?;
    atomic_replace(&temp_path, path)
}

/// Atomically write a string to a file.
pub fn atomic_write_file<P: AsRef<Path>>(path: P, content: &str) -> Result<()> {
    atomic_write(path, content.as_bytes())
}

/// Temporary path next to the target. The random suffix keeps concurrent
/// writers of the same target from sharing a temporary file.
fn generate_temp_path(target: &Path) -> Result<PathBuf> {
    let parent = target.parent().unwrap_or(Path::new("."));
    let filename = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| WopiError::Storage(format!("invalid file path '{}'", target.display())))?;

    Ok(parent.join(format!(".{}.{}.tmp", filename, Uuid::new_v4().simple())))
}

fn write_and_sync(path: &Path, content: &[u8]) -> Result<()> {
    let mut file = File::create(path).map_err(|e| {
        WopiError::Storage(format!(
            "failed to create temporary file '{}': {}",
            path.display(),
            e
        ))
    })?;

    file.write_all(content).map_err(|e| {
        let _ = fs::remove_file(path);
        WopiError::Storage(format!("failed to write to temporary file: {}", e))
    })?;

    file.sync_all().map_err(|e| {
        let _ = fs::remove_file(path);
        WopiError::Storage(format!("failed to sync temporary file to disk: {}", e))
    })?;

    Ok(())
}

fn atomic_replace(source: &Path, target: &Path) -> Result<()> {
    fs::rename(source, target).map_err(|e| {
        let _ = fs::remove_file(source);
        WopiError::Storage(format!(
            "failed to atomically replace '{}': {}",
            target.display(),
            e
        ))
    })?;

    sync_parent_dir(target);
    Ok(())
}

/// Persist the directory entry of a freshly renamed file.
#[cfg(unix)]
fn sync_parent_dir(target: &Path) {
    if let Some(parent) = target.parent()
        && let Ok(dir) = File::open(parent)
    {
        let _ = dir.sync_all();
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_target: &Path) {}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_new_file() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("test.txt");

        atomic_write(&file_path, b"hello world").unwrap();

        let content = fs::read_to_string(&file_path).unwrap();
        assert_eq!(content, "hello world");
    }

    #[test]
    fn test_atomic_write_replace_existing() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("test.txt");

        fs::write(&file_path, "original content").unwrap();
        atomic_write(&file_path, b"new content").unwrap();

        let content = fs::read_to_string(&file_path).unwrap();
        assert_eq!(content, "new content");
    }

    #[test]
    fn test_atomic_write_creates_parent_dirs() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("docs").join("doc-1").join("document.json");

        atomic_write_file(&file_path, "{}").unwrap();

        let content = fs::read_to_string(&file_path).unwrap();
        assert_eq!(content, "{}");
    }

    #[test]
    fn test_atomic_write_leaves_no_temp_files() {
        let temp_dir = TempDir::new().unwrap();
        let file_path = temp_dir.path().join("test.txt");

        atomic_write(&file_path, b"content").unwrap();
        atomic_write(&file_path, b"content again").unwrap();

        let entries: Vec<_> = fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(entries, vec!["test.txt".to_string()]);
    }

    #[test]
    fn test_generate_temp_path_is_unique_sibling() {
        let target = Path::new("/some/path/file.txt");
        let first = generate_temp_path(target).unwrap();
        let second = generate_temp_path(target).unwrap();

        assert_eq!(first.parent().unwrap(), Path::new("/some/path"));
        let name = first.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with(".file.txt."));
        assert!(name.ends_with(".tmp"));
        assert_ne!(first, second);
    }

    #[test]
    fn test_atomic_write_binary_and_empty_content() {
        let temp_dir = TempDir::new().unwrap();
        let binary_path = temp_dir.path().join("binary.bin");
        let empty_path = temp_dir.path().join("empty.bin");

        let binary_content: Vec<u8> = (0..256).map(|i| i as u8).collect();
        atomic_write(&binary_path, &binary_content).unwrap();
        atomic_write(&empty_path, b"").unwrap();

        assert_eq!(fs::read(&binary_path).unwrap(), binary_content);
        assert!(fs::read(&empty_path).unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_writes_to_same_target() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("shared.json");

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let path = path.clone();
                std::thread::spawn(move || {
                    atomic_write_file(&path, &format!("writer {}", i)).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // One complete write wins
        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("writer "));
    }
}
