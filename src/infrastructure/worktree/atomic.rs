//! Crash-consistent file writes.
//!
//! Every persisted artifact goes through `atomic_write_file`: write to a
//! temp sibling, flush, fsync, rename over the target, fsync the parent
//! directory. Concurrent readers observe either the previous content or
//! the new content, never a partial file.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::domain::errors::{DomainError, DomainResult};

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

fn tmp_sibling(path: &Path) -> std::path::PathBuf {
    let counter = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let pid = std::process::id();
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "artifact".to_string());
    path.with_file_name(format!("{file_name}.tmp.{pid}-{counter}"))
}

/// Write `bytes` to `path` atomically. Parent directories are created as
/// needed. On any failure the temp file is removed and the error surfaced.
pub fn atomic_write_file(path: &Path, bytes: &[u8]) -> DomainResult<()> {
    let parent = path
        .parent()
        .ok_or_else(|| DomainError::IoError(format!("no parent for {}", path.display())))?;
    std::fs::create_dir_all(parent)?;

    let tmp = tmp_sibling(path);
    let result = write_and_rename(&tmp, path, parent, bytes);
    if result.is_err() {
        let _ = std::fs::remove_file(&tmp);
    }
    result
}

fn write_and_rename(
    tmp: &Path,
    path: &Path,
    parent: &Path,
    bytes: &[u8],
) -> DomainResult<()> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(tmp)?;
    file.write_all(bytes)?;
    file.flush()?;
    file.sync_all()?;
    drop(file);

    std::fs::rename(tmp, path)?;
    sync_dir(parent);
    Ok(())
}

/// Fsync a directory so the rename itself is durable. Directory handles
/// cannot be fsynced on all platforms; failures here do not undo the
/// already-atomic rename.
fn sync_dir(dir: &Path) {
    #[cfg(unix)]
    if let Ok(handle) = File::open(dir) {
        let _ = handle.sync_all();
    }
    #[cfg(not(unix))]
    let _ = dir;
}

/// Serialize `value` as pretty JSON and write it atomically.
pub fn atomic_write_json<T: Serialize>(path: &Path, value: &T) -> DomainResult<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    atomic_write_file(path, &bytes)
}

/// Read and parse a JSON file. Absent files and parse failures both yield
/// `None`; this function never propagates an error.
pub fn safe_read_json<T: DeserializeOwned>(path: &Path) -> Option<T> {
    let bytes = std::fs::read(path).ok()?;
    match serde_json::from_slice(&bytes) {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::debug!(path = %path.display(), error = %err, "unreadable JSON artifact treated as absent");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_write_then_read() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/file.json");
        atomic_write_file(&path, b"{\"k\":1}").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"{\"k\":1}");
    }

    #[test]
    fn test_overwrite_replaces_content() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("file.txt");
        atomic_write_file(&path, b"old").unwrap();
        atomic_write_file(&path, b"new").unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), b"new");
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("file.txt");
        atomic_write_file(&path, b"content").unwrap();
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["file.txt"]);
    }

    #[test]
    fn test_safe_read_json_absent() {
        let dir = TempDir::new().unwrap();
        let value: Option<serde_json::Value> = safe_read_json(&dir.path().join("missing.json"));
        assert!(value.is_none());
    }

    #[test]
    fn test_safe_read_json_malformed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();
        let value: Option<serde_json::Value> = safe_read_json(&path);
        assert!(value.is_none());
    }

    #[test]
    fn test_json_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.json");
        atomic_write_json(&path, &json!({"a": [1, 2, 3]})).unwrap();
        let back: serde_json::Value = safe_read_json(&path).unwrap();
        assert_eq!(back["a"][2], 3);
    }
}
