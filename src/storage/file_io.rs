//! File I/O utilities with atomic writes
//!
//! Safe file operations that won't leave half-written state behind.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::warn;
use uuid::Uuid;

use crate::error::BackupError;

/// Write bytes to a file atomically (write to temp, then rename)
///
/// When `mode` is given it is applied to the temp file before the rename,
/// so the final file never exists with looser permissions.
pub fn write_atomic<P: AsRef<Path>>(
    path: P,
    bytes: &[u8],
    mode: Option<u32>,
) -> Result<(), BackupError> {
    let path = path.as_ref();

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            BackupError::Io(format!(
                "Failed to create directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }

    // Temp file in the same directory so the rename stays on one filesystem
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let temp_path = path.with_file_name(format!(".{}.tmp", file_name));

    let file = File::create(&temp_path)
        .map_err(|e| BackupError::Io(format!("Failed to create temp file: {}", e)))?;

    let mut writer = BufWriter::new(file);
    let written = writer
        .write_all(bytes)
        .and_then(|_| writer.flush())
        .and_then(|_| writer.get_ref().sync_all());

    if let Err(e) = written {
        let _ = fs::remove_file(&temp_path);
        return Err(BackupError::Io(format!("Failed to write data: {}", e)));
    }

    if let Some(mode) = mode {
        if let Err(e) = set_mode(&temp_path, mode) {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }
    }

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        BackupError::Io(format!("Failed to rename temp file: {}", e))
    })
}

/// Serialize JSON and write it atomically
pub fn write_json_atomic<T, P>(path: P, data: &T, mode: Option<u32>) -> Result<(), BackupError>
where
    T: Serialize,
    P: AsRef<Path>,
{
    let json = serde_json::to_vec_pretty(data)
        .map_err(|e| BackupError::Json(format!("Failed to serialize data: {}", e)))?;
    write_atomic(path, &json, mode)
}

/// Unix permission bits of a file, if the platform has them
pub fn file_mode(metadata: &fs::Metadata) -> Option<u32> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        Some(metadata.permissions().mode() & 0o7777)
    }
    #[cfg(not(unix))]
    {
        let _ = metadata;
        None
    }
}

/// Apply unix permission bits; a no-op elsewhere
pub fn set_mode(path: &Path, mode: u32) -> Result<(), BackupError> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|e| {
            BackupError::Io(format!(
                "Failed to set permissions on {}: {}",
                path.display(),
                e
            ))
        })
    }
    #[cfg(not(unix))]
    {
        let _ = (path, mode);
        Ok(())
    }
}

/// Total size of all files below a directory
pub fn dir_size(path: &Path) -> u64 {
    walkdir::WalkDir::new(path)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file())
        .filter_map(|entry| entry.metadata().ok())
        .map(|metadata| metadata.len())
        .sum()
}

/// A hidden working directory removed on drop unless persisted
///
/// Used to stage backups before they are sealed and to hold the transient
/// backup directories of bundle export/import.
#[derive(Debug)]
pub struct TransientDir {
    path: PathBuf,
    keep: bool,
}

impl TransientDir {
    /// Create `<parent>/.<prefix>-<uuid>`
    pub fn create_in(parent: &Path, prefix: &str) -> Result<Self, BackupError> {
        let path = parent.join(format!(".{}-{}", prefix, Uuid::new_v4()));
        fs::create_dir_all(&path).map_err(|e| {
            BackupError::Io(format!(
                "Failed to create working directory {}: {}",
                path.display(),
                e
            ))
        })?;
        Ok(Self { path, keep: false })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Move the directory to `target` and stop tracking it
    pub fn persist(mut self, target: &Path) -> Result<PathBuf, BackupError> {
        fs::rename(&self.path, target).map_err(|e| {
            BackupError::Io(format!(
                "Failed to move {} to {}: {}",
                self.path.display(),
                target.display(),
                e
            ))
        })?;
        self.keep = true;
        Ok(target.to_path_buf())
    }
}

impl Drop for TransientDir {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        if let Err(e) = fs::remove_dir_all(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), error = %e, "failed to remove working directory");
            }
        }
    }
}

/// Whether a directory name belongs to a hidden working directory
pub fn is_hidden(name: &str) -> bool {
    name.starts_with('.')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};
    use tempfile::TempDir;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
    struct TestData {
        name: String,
        value: i32,
    }

    #[test]
    fn test_write_json_atomic() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("test.json");

        let data = TestData {
            name: "test".to_string(),
            value: 42,
        };
        write_json_atomic(&path, &data, None).unwrap();

        let loaded: TestData = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        assert_eq!(data, loaded);
    }

    #[test]
    fn test_atomic_write_no_temp_file_left() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("wallet.json");

        write_atomic(&path, b"{}", None).unwrap();

        assert!(path.exists());
        assert!(!temp_dir.path().join(".wallet.json.tmp").exists());
    }

    #[test]
    fn test_write_creates_parent_directories() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("skills").join("web").join("SKILL.md");

        write_atomic(&path, b"# skill", None).unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"# skill");
    }

    #[cfg(unix)]
    #[test]
    fn test_write_applies_mode() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("wallet.json");

        write_atomic(&path, b"{}", Some(0o600)).unwrap();

        let mode = file_mode(&fs::metadata(&path).unwrap()).unwrap();
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn test_transient_dir_removed_on_drop() {
        let temp_dir = TempDir::new().unwrap();
        let path = {
            let transient = TransientDir::create_in(temp_dir.path(), "staging").unwrap();
            fs::write(transient.path().join("file"), b"x").unwrap();
            transient.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_transient_dir_persist() {
        let temp_dir = TempDir::new().unwrap();
        let transient = TransientDir::create_in(temp_dir.path(), "staging").unwrap();
        let name = transient.path().file_name().unwrap().to_string_lossy().to_string();
        assert!(is_hidden(&name));

        let target = temp_dir.path().join("backup-1");
        transient.persist(&target).unwrap();
        assert!(target.is_dir());
    }

    #[test]
    fn test_dir_size() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("a"), vec![0u8; 10]).unwrap();
        fs::create_dir(temp_dir.path().join("sub")).unwrap();
        fs::write(temp_dir.path().join("sub").join("b"), vec![0u8; 5]).unwrap();

        assert_eq!(dir_size(temp_dir.path()), 15);
    }
}
