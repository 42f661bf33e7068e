//! Backup directory manager
//!
//! Lists, names and prunes the timestamped backup directories under a
//! backups root, and resolves the known file state an incremental capture
//! is diffed against.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{BackupError, BackupResult};
use crate::models::{BackupType, Manifest};
use crate::storage::file_io::{dir_size, is_hidden};

/// Metadata about a backup
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupInfo {
    /// Backup directory name
    pub name: String,
    /// Full path to the backup directory
    pub path: PathBuf,
    #[serde(rename = "type")]
    pub backup_type: BackupType,
    pub file_count: usize,
    /// Bytes on disk of the whole backup directory
    pub size: u64,
    pub sandbox_id: String,
    pub created_at: DateTime<Utc>,
}

impl BackupInfo {
    /// Describe a backup directory from its already-loaded manifest
    pub fn from_manifest(path: &Path, manifest: &Manifest) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.display().to_string());

        Self {
            name,
            path: path.to_path_buf(),
            backup_type: manifest.backup_type,
            file_count: manifest.files.len(),
            size: dir_size(path),
            sandbox_id: manifest.sandbox_id.clone(),
            created_at: manifest.created_at,
        }
    }

    /// Load the manifest of a backup directory and describe it
    pub fn load(path: &Path) -> BackupResult<Self> {
        let manifest = Manifest::load(path)?;
        Ok(Self::from_manifest(path, &manifest))
    }
}

/// File hashes known at the most recent backup of an identity
#[derive(Debug, Clone, Default)]
pub struct KnownState {
    /// Directory name of the backup the state was read from
    pub base_name: String,
    /// relative path -> content hash
    pub hashes: HashMap<String, String>,
}

/// Every readable backup under `root`, newest first
///
/// With a `sandbox_filter`, only backups of that identity are returned.
/// Hidden working directories and directories without a readable manifest
/// are skipped.
pub fn list_backups_in(root: &Path, sandbox_filter: Option<&str>) -> BackupResult<Vec<BackupInfo>> {
    Ok(scan(root, sandbox_filter)?
        .into_iter()
        .map(|(path, manifest)| BackupInfo::from_manifest(&path, &manifest))
        .collect())
}

/// The newest backup under `root` for an identity
pub fn latest_backup(root: &Path, sandbox_filter: Option<&str>) -> BackupResult<Option<BackupInfo>> {
    Ok(list_backups_in(root, sandbox_filter)?.into_iter().next())
}

/// Delete the oldest backups beyond `keep_count`, returning how many went
pub fn prune_backups(root: &Path, keep_count: usize) -> BackupResult<usize> {
    let backups = scan(root, None)?;
    let mut deleted = 0;

    for (path, manifest) in backups.into_iter().skip(keep_count) {
        fs::remove_dir_all(&path).map_err(|e| {
            BackupError::Io(format!(
                "Failed to delete old backup {}: {}",
                path.display(),
                e
            ))
        })?;
        debug!(path = %path.display(), created_at = %manifest.created_at, "pruned backup");
        deleted += 1;
    }

    if deleted > 0 {
        info!(deleted, keep_count, root = %root.display(), "pruned old backups");
    }
    Ok(deleted)
}

/// Resolve the file state of the newest backup of `sandbox_id` under `root`
///
/// The newest backup's chain is followed through `baseManifestRef` back to
/// its full base and folded oldest to newest. Returns `None` when there is
/// no prior backup or the chain cannot be followed to a full backup.
pub fn known_state(root: &Path, sandbox_id: &str) -> BackupResult<Option<KnownState>> {
    let Some((latest_path, latest)) = scan(root, Some(sandbox_id))?.into_iter().next() else {
        return Ok(None);
    };

    let base_name = dir_name(&latest_path);
    let mut visited = HashSet::from([base_name.clone()]);
    let mut chain = vec![latest];

    while let Some(base_ref) = chain
        .last()
        .filter(|m| m.backup_type == BackupType::Incremental)
        .and_then(|m| m.base_manifest_ref.clone())
    {
        if !visited.insert(base_ref.clone()) {
            warn!(backup = %base_ref, "backup chain loops back on itself");
            return Ok(None);
        }
        match Manifest::load(&root.join(&base_ref)) {
            Ok(manifest) => chain.push(manifest),
            Err(e) => {
                warn!(backup = %base_ref, error = %e, "backup chain is broken");
                return Ok(None);
            }
        }
    }

    let mut hashes = HashMap::new();
    for manifest in chain.iter().rev() {
        for entry in &manifest.files {
            hashes.insert(entry.relative_path.clone(), entry.content_hash.clone());
        }
    }

    debug!(base = %base_name, links = chain.len(), files = hashes.len(), "resolved known state");
    Ok(Some(KnownState { base_name, hashes }))
}

/// A fresh `backup-YYYYMMDD-HHMMSS-mmm` path under `root`
///
/// A `-N` suffix is appended when the name is already taken.
pub fn unique_backup_dir(root: &Path, created_at: DateTime<Utc>) -> PathBuf {
    let stem = format!(
        "backup-{}-{:03}",
        created_at.format("%Y%m%d-%H%M%S"),
        created_at.timestamp_subsec_millis()
    );

    let mut candidate = root.join(&stem);
    let mut n = 1;
    while candidate.exists() {
        candidate = root.join(format!("{}-{}", stem, n));
        n += 1;
    }
    candidate
}

/// Load every backup manifest under `root`, newest first
fn scan(root: &Path, sandbox_filter: Option<&str>) -> BackupResult<Vec<(PathBuf, Manifest)>> {
    if !root.exists() {
        return Ok(Vec::new());
    }

    let entries = fs::read_dir(root).map_err(|e| {
        BackupError::Io(format!(
            "Failed to read backup directory {}: {}",
            root.display(),
            e
        ))
    })?;

    let mut backups = Vec::new();
    for entry in entries {
        let entry =
            entry.map_err(|e| BackupError::Io(format!("Failed to read directory entry: {}", e)))?;
        let path = entry.path();

        if !path.is_dir() || is_hidden(&dir_name(&path)) {
            continue;
        }

        match Manifest::load(&path) {
            Ok(manifest) => {
                if sandbox_filter.map_or(true, |id| manifest.sandbox_id == id) {
                    backups.push((path, manifest));
                }
            }
            Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable backup"),
        }
    }

    // Newest first; names break ties within the same millisecond
    backups.sort_by(|(a_path, a), (b_path, b)| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| dir_name(b_path).cmp(&dir_name(a_path)))
    });

    Ok(backups)
}

fn dir_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::manifest::{sha256_hex, MANIFEST_VERSION};
    use crate::models::{Category, FileEntry};
    use chrono::{Duration, TimeZone};
    use tempfile::TempDir;

    fn entry(path: &str, content: &[u8]) -> FileEntry {
        FileEntry {
            relative_path: path.into(),
            category: Category::classify(path).unwrap_or(Category::Memory),
            content_hash: sha256_hex(content),
            size_bytes: content.len() as u64,
            encrypted: false,
            offset: 0,
            length: 0,
            mode: None,
        }
    }

    fn write_backup(
        root: &Path,
        name: &str,
        sandbox_id: &str,
        age_minutes: i64,
        base: Option<&str>,
        files: Vec<FileEntry>,
    ) -> PathBuf {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();

        let created_at = Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
            - Duration::minutes(age_minutes);
        let mut manifest = Manifest {
            version: MANIFEST_VERSION,
            sandbox_id: sandbox_id.into(),
            created_at,
            backup_type: if base.is_some() {
                BackupType::Incremental
            } else {
                BackupType::Full
            },
            base_manifest_ref: base.map(String::from),
            encryption: None,
            payload_size: 0,
            files,
            checksum: String::new(),
        };
        manifest.seal(b"").unwrap();
        manifest.save(&dir).unwrap();
        fs::write(Manifest::payload_path(&dir), b"").unwrap();
        dir
    }

    #[test]
    fn test_empty_backup_dir() {
        let temp_dir = TempDir::new().unwrap();
        assert!(list_backups_in(temp_dir.path(), None).unwrap().is_empty());
        assert!(list_backups_in(&temp_dir.path().join("missing"), None)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_list_sorted_newest_first() {
        let temp_dir = TempDir::new().unwrap();
        write_backup(temp_dir.path(), "backup-old", "sbx-a", 30, None, vec![]);
        write_backup(temp_dir.path(), "backup-new", "sbx-a", 5, None, vec![]);
        write_backup(temp_dir.path(), "backup-mid", "sbx-a", 10, None, vec![]);

        let names: Vec<_> = list_backups_in(temp_dir.path(), None)
            .unwrap()
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(names, vec!["backup-new", "backup-mid", "backup-old"]);
    }

    #[test]
    fn test_list_filters_by_sandbox() {
        let temp_dir = TempDir::new().unwrap();
        write_backup(temp_dir.path(), "backup-a", "sbx-a", 5, None, vec![]);
        write_backup(temp_dir.path(), "backup-b", "sbx-b", 5, None, vec![]);

        let backups = list_backups_in(temp_dir.path(), Some("sbx-b")).unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(backups[0].sandbox_id, "sbx-b");
    }

    #[test]
    fn test_list_skips_unreadable_and_hidden() {
        let temp_dir = TempDir::new().unwrap();
        write_backup(temp_dir.path(), "backup-ok", "sbx-a", 5, None, vec![]);
        fs::create_dir(temp_dir.path().join("backup-broken")).unwrap();
        fs::write(temp_dir.path().join("backup-broken").join("manifest.json"), "{").unwrap();
        write_backup(temp_dir.path(), ".staging-123", "sbx-a", 1, None, vec![]);

        let backups = list_backups_in(temp_dir.path(), None).unwrap();
        assert_eq!(backups.len(), 1);
        assert_eq!(backups[0].name, "backup-ok");
    }

    #[test]
    fn test_prune_keeps_newest() {
        let temp_dir = TempDir::new().unwrap();
        for (i, age) in [50, 40, 30, 20, 10].iter().enumerate() {
            write_backup(temp_dir.path(), &format!("backup-{}", i), "sbx-a", *age, None, vec![]);
        }

        assert_eq!(prune_backups(temp_dir.path(), 3).unwrap(), 2);

        let names: Vec<_> = list_backups_in(temp_dir.path(), None)
            .unwrap()
            .into_iter()
            .map(|b| b.name)
            .collect();
        assert_eq!(names, vec!["backup-4", "backup-3", "backup-2"]);
    }

    #[test]
    fn test_prune_with_enough_room_removes_nothing() {
        let temp_dir = TempDir::new().unwrap();
        write_backup(temp_dir.path(), "backup-1", "sbx-a", 10, None, vec![]);
        write_backup(temp_dir.path(), "backup-2", "sbx-a", 5, None, vec![]);

        assert_eq!(prune_backups(temp_dir.path(), 2).unwrap(), 0);
        assert_eq!(prune_backups(temp_dir.path(), 10).unwrap(), 0);
        assert_eq!(list_backups_in(temp_dir.path(), None).unwrap().len(), 2);
    }

    #[test]
    fn test_prune_leaves_unreadable_directories() {
        let temp_dir = TempDir::new().unwrap();
        write_backup(temp_dir.path(), "backup-1", "sbx-a", 10, None, vec![]);
        fs::create_dir(temp_dir.path().join("notes")).unwrap();

        assert_eq!(prune_backups(temp_dir.path(), 0).unwrap(), 1);
        assert!(temp_dir.path().join("notes").exists());
    }

    #[test]
    fn test_known_state_folds_chain() {
        let temp_dir = TempDir::new().unwrap();
        write_backup(
            temp_dir.path(),
            "backup-full",
            "sbx-a",
            30,
            None,
            vec![entry("SOUL.md", b"v1"), entry("wallet.json", b"w1")],
        );
        write_backup(
            temp_dir.path(),
            "backup-inc1",
            "sbx-a",
            20,
            Some("backup-full"),
            vec![entry("SOUL.md", b"v2")],
        );
        write_backup(temp_dir.path(), "backup-inc2", "sbx-a", 10, Some("backup-inc1"), vec![]);

        let state = known_state(temp_dir.path(), "sbx-a").unwrap().unwrap();
        assert_eq!(state.base_name, "backup-inc2");
        assert_eq!(state.hashes.len(), 2);
        assert_eq!(state.hashes["SOUL.md"], sha256_hex(b"v2"));
        assert_eq!(state.hashes["wallet.json"], sha256_hex(b"w1"));
    }

    #[test]
    fn test_known_state_without_prior_backup() {
        let temp_dir = TempDir::new().unwrap();
        write_backup(temp_dir.path(), "backup-other", "sbx-b", 10, None, vec![]);

        assert!(known_state(temp_dir.path(), "sbx-a").unwrap().is_none());
    }

    #[test]
    fn test_known_state_with_pruned_base() {
        let temp_dir = TempDir::new().unwrap();
        write_backup(temp_dir.path(), "backup-inc", "sbx-a", 10, Some("backup-gone"), vec![]);

        assert!(known_state(temp_dir.path(), "sbx-a").unwrap().is_none());
    }

    #[test]
    fn test_unique_backup_dir_suffixes() {
        let temp_dir = TempDir::new().unwrap();
        let now = Utc.with_ymd_and_hms(2026, 3, 4, 5, 6, 7).unwrap();

        let first = unique_backup_dir(temp_dir.path(), now);
        assert_eq!(dir_name(&first), "backup-20260304-050607-000");

        fs::create_dir(&first).unwrap();
        let second = unique_backup_dir(temp_dir.path(), now);
        assert_eq!(dir_name(&second), "backup-20260304-050607-000-1");
    }
}
