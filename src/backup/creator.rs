//! Backup creation
//!
//! Walks the durable-state tree, captures every classified file (or only
//! the changed ones for an incremental), encrypts sensitive categories when
//! a key is supplied and seals the result into a new backup directory.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tracing::{debug, info, info_span, warn};
use walkdir::WalkDir;

use super::manager::{known_state, unique_backup_dir, BackupInfo};
use super::payload::PayloadBuilder;
use crate::config::{BackupSettings, InstancePaths};
use crate::crypto::{seal, DerivedKey, EncryptionHeader, SecureString};
use crate::error::{BackupError, BackupResult};
use crate::models::manifest::{sha256_hex, MANIFEST_VERSION};
use crate::models::{BackupType, Category, FileEntry, Manifest};
use crate::storage::file_io::{file_mode, is_hidden, write_atomic, TransientDir};

/// Options for a single capture
#[derive(Debug, Clone, Default)]
pub struct BackupOptions {
    pub backup_type: BackupType,
    /// Passphrase for encrypting sensitive categories
    pub encryption_key: Option<SecureString>,
    /// Backups root to write into instead of the configured one
    pub output_dir: Option<PathBuf>,
    /// Categories to encrypt in addition to `secrets`
    pub encrypt_categories: Vec<Category>,
}

impl BackupOptions {
    pub fn full() -> Self {
        Self::default()
    }

    pub fn incremental() -> Self {
        Self {
            backup_type: BackupType::Incremental,
            ..Self::default()
        }
    }

    pub fn with_key(mut self, key: impl Into<SecureString>) -> Self {
        self.encryption_key = Some(key.into());
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }

    pub fn encrypt_category(mut self, category: Category) -> Self {
        if !self.encrypt_categories.contains(&category) {
            self.encrypt_categories.push(category);
        }
        self
    }
}

/// A durable-state file found by the scan
#[derive(Debug, Clone)]
struct ScannedFile {
    relative_path: String,
    category: Category,
    path: PathBuf,
}

/// Creates backups of one instance's durable state
pub struct BackupCreator<'a> {
    paths: &'a InstancePaths,
    settings: &'a BackupSettings,
}

impl<'a> BackupCreator<'a> {
    pub fn new(paths: &'a InstancePaths, settings: &'a BackupSettings) -> Self {
        Self { paths, settings }
    }

    /// Capture the durable state into a new backup directory
    ///
    /// Nothing is left under the backups root when this fails.
    pub fn create(&self, source_sandbox_id: &str, options: &BackupOptions) -> BackupResult<BackupInfo> {
        if source_sandbox_id.trim().is_empty() {
            return Err(BackupError::Config("Source sandbox id must not be empty".into()));
        }
        if options.encryption_key.as_ref().is_some_and(|k| k.is_blank()) {
            return Err(BackupError::EncryptionKey("Encryption key must not be empty".into()));
        }

        let root = options
            .output_dir
            .clone()
            .unwrap_or_else(|| self.paths.backups_dir().to_path_buf());

        let span = info_span!("create_backup", sandbox_id = %source_sandbox_id, requested = %options.backup_type);
        let _guard = span.enter();

        fs::create_dir_all(&root).map_err(|e| {
            BackupError::Io(format!(
                "Failed to create backup directory {}: {}",
                root.display(),
                e
            ))
        })?;

        let files = scan_state(self.paths.state_root(), &[root.as_path(), self.paths.backups_dir()])?;

        let (backup_type, base_manifest_ref, known) = match options.backup_type {
            BackupType::Full => (BackupType::Full, None, HashMap::new()),
            BackupType::Incremental => match known_state(&root, source_sandbox_id)? {
                Some(state) => (BackupType::Incremental, Some(state.base_name), state.hashes),
                None => {
                    warn!("no usable prior backup; capturing a full backup instead");
                    (BackupType::Full, None, HashMap::new())
                }
            },
        };

        let mut cipher = EntryCipher::new(self.settings, options);
        let mut builder = PayloadBuilder::new();
        let mut entries = Vec::new();

        for file in &files {
            let content = fs::read(&file.path)
                .map_err(|e| BackupError::source_read(file.relative_path.as_str(), e))?;
            let metadata = fs::metadata(&file.path)
                .map_err(|e| BackupError::source_read(file.relative_path.as_str(), e))?;

            let content_hash = sha256_hex(&content);
            if known.get(&file.relative_path) == Some(&content_hash) {
                continue;
            }

            let size_bytes = content.len() as u64;
            let (stored, encrypted) = match cipher.key_for(file.category)? {
                Some(key) => (seal(&content, key)?, true),
                None => (content, false),
            };
            let (offset, length) = builder.append(&stored);

            debug!(path = %file.relative_path, category = %file.category, encrypted, "captured file");
            entries.push(FileEntry {
                relative_path: file.relative_path.clone(),
                category: file.category,
                content_hash,
                size_bytes,
                encrypted,
                offset,
                length,
                mode: file_mode(&metadata),
            });
        }

        debug!(entries = entries.len(), bytes = builder.len(), "compressing payload");
        let compressed = builder.finish(self.settings.compression_level)?;

        let created_at = Utc::now();
        let mut manifest = Manifest {
            version: MANIFEST_VERSION,
            sandbox_id: source_sandbox_id.to_string(),
            created_at,
            backup_type,
            base_manifest_ref,
            encryption: cipher.into_header(),
            payload_size: 0,
            files: entries,
            checksum: String::new(),
        };
        manifest.seal(&compressed)?;

        let staging = TransientDir::create_in(&root, "staging")?;
        write_atomic(Manifest::payload_path(staging.path()), &compressed, None)?;
        write_atomic(Manifest::manifest_path(staging.path()), &manifest.to_bytes()?, None)?;

        let backup_dir = staging.persist(&unique_backup_dir(&root, created_at))?;
        let info = BackupInfo::from_manifest(&backup_dir, &manifest);

        info!(
            backup = %info.name,
            backup_type = %info.backup_type,
            files = info.file_count,
            size = info.size,
            "backup created"
        );
        Ok(info)
    }
}

/// Derives the capture key on first use and remembers its header
struct EntryCipher<'a> {
    settings: &'a BackupSettings,
    options: &'a BackupOptions,
    key: Option<(EncryptionHeader, DerivedKey)>,
}

impl<'a> EntryCipher<'a> {
    fn new(settings: &'a BackupSettings, options: &'a BackupOptions) -> Self {
        Self {
            settings,
            options,
            key: None,
        }
    }

    /// The key to seal `category` with, or `None` to store plaintext
    fn key_for(&mut self, category: Category) -> BackupResult<Option<&DerivedKey>> {
        let Some(passphrase) = self.options.encryption_key.as_ref() else {
            return Ok(None);
        };
        let encrypts = self.settings.encrypts(category)
            || self.options.encrypt_categories.contains(&category);
        if !encrypts {
            return Ok(None);
        }

        if self.key.is_none() {
            let header = EncryptionHeader::generate(self.settings.kdf.clone());
            let key = header.derive(passphrase)?;
            self.key = Some((header, key));
        }
        Ok(self.key.as_ref().map(|(_, key)| key))
    }

    /// The manifest header, present only if something was encrypted
    fn into_header(self) -> Option<EncryptionHeader> {
        self.key.map(|(header, _)| header)
    }
}

/// Enumerate classified files under `state_root`, sorted by path
///
/// Symlinks are not followed. Only the top-level state directories are
/// descended into, and never the `excluded` or hidden ones below them, so an
/// unreadable cache elsewhere in the root cannot abort a capture.
fn scan_state(state_root: &Path, excluded: &[&Path]) -> BackupResult<Vec<ScannedFile>> {
    if !state_root.is_dir() {
        return Err(BackupError::source_read(
            state_root.display().to_string(),
            "durable-state root is not a directory",
        ));
    }

    let walker = WalkDir::new(state_root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            if entry.depth() == 1 && Category::for_directory(&name).is_none() {
                return false;
            }
            !is_hidden(&name) && !excluded.iter().any(|dir| entry.path() == *dir)
        });

    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e
                .path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| state_root.display().to_string());
            BackupError::source_read(path, e)
        })?;

        if !entry.file_type().is_file() {
            continue;
        }

        let Some(relative_path) = relative_key(state_root, entry.path()) else {
            warn!(path = %entry.path().display(), "skipping file with a non UTF-8 path");
            continue;
        };

        match Category::classify(&relative_path) {
            Some(category) => files.push(ScannedFile {
                relative_path,
                category,
                path: entry.into_path(),
            }),
            None => debug!(path = %relative_path, "not durable state, skipping"),
        }
    }

    Ok(files)
}

/// `/`-separated path of `path` relative to `root`
fn relative_key(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?;
    let parts = relative
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join("/"))
}
