//! Backup restoration
//!
//! Writes captured files back into the durable-state tree. Every entry is
//! handled independently: one failure is recorded and the rest still run.

use std::path::Path;

use serde::Serialize;
use tracing::{debug, info, info_span, warn};

use super::integrity::open_verified;
use super::payload::entry_bytes;
use crate::config::InstancePaths;
use crate::crypto::{open, DerivedKey, EncryptionHeader, SecureString};
use crate::error::{BackupError, BackupResult};
use crate::models::manifest::sha256_hex;
use crate::models::{CategorySelection, FileEntry};
use crate::storage::file_io::write_atomic;

/// What to restore and how
#[derive(Debug, Clone, Default)]
pub struct RestoreOptions {
    pub categories: CategorySelection,
    /// Report what would be written without touching the tree
    pub dry_run: bool,
    pub decryption_key: Option<SecureString>,
}

impl RestoreOptions {
    pub fn with_categories(mut self, categories: CategorySelection) -> Self {
        self.categories = categories;
        self
    }

    pub fn dry_run(mut self) -> Self {
        self.dry_run = true;
        self
    }

    pub fn with_key(mut self, key: impl Into<SecureString>) -> Self {
        self.decryption_key = Some(key.into());
        self
    }
}

/// Result of a restore operation
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RestoreResult {
    /// Paths written (or that would be written on a dry run)
    pub restored_files: Vec<String>,
    /// Paths outside the selected categories
    pub skipped_files: Vec<String>,
    /// One `"<path>: <reason>"` line per failed entry
    pub errors: Vec<String>,
    pub dry_run: bool,
}

impl RestoreResult {
    /// Check if every selected entry was restored
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    /// Get a summary of what was restored
    pub fn summary(&self) -> String {
        let verb = if self.dry_run { "Would restore" } else { "Restored" };
        format!(
            "{} {} file(s), skipped {}, {} error(s)",
            verb,
            self.restored_files.len(),
            self.skipped_files.len(),
            self.errors.len()
        )
    }
}

/// Handles restoring from backups
pub struct RestoreManager<'a> {
    paths: &'a InstancePaths,
}

impl<'a> RestoreManager<'a> {
    /// Create a new RestoreManager
    pub fn new(paths: &'a InstancePaths) -> Self {
        Self { paths }
    }

    /// Restore a backup directory into the durable-state tree
    ///
    /// The backup is verified first; a backup that fails verification is
    /// refused before anything is written.
    pub fn restore(&self, backup_dir: &Path, options: &RestoreOptions) -> BackupResult<RestoreResult> {
        let span = info_span!("restore_backup", path = %backup_dir.display(), dry_run = options.dry_run);
        let _guard = span.enter();

        let verified = open_verified(backup_dir)?;
        let manifest = &verified.manifest;

        let mut keys = KeySlot::new(manifest.encryption.as_ref(), options.decryption_key.as_ref());
        let mut result = RestoreResult {
            dry_run: options.dry_run,
            ..RestoreResult::default()
        };

        for entry in &manifest.files {
            if !options.categories.includes(entry.category) {
                result.skipped_files.push(entry.relative_path.clone());
                continue;
            }

            let outcome = self
                .recover(entry, &verified.payload, &mut keys)
                .and_then(|plaintext| {
                    if options.dry_run {
                        Ok(())
                    } else {
                        self.write(entry, &plaintext)
                    }
                });

            match outcome {
                Ok(()) => {
                    debug!(path = %entry.relative_path, "restored file");
                    result.restored_files.push(entry.relative_path.clone());
                }
                Err(message) => {
                    warn!(error = %message, "file not restored");
                    result.errors.push(message);
                }
            }
        }

        info!(
            restored = result.restored_files.len(),
            skipped = result.skipped_files.len(),
            errors = result.errors.len(),
            "restore finished"
        );
        Ok(result)
    }

    /// Plaintext of one entry, checked against its recorded hash
    fn recover(&self, entry: &FileEntry, payload: &[u8], keys: &mut KeySlot<'_>) -> Result<Vec<u8>, String> {
        let path = &entry.relative_path;
        let stored = entry_bytes(payload, entry).map_err(|e| format!("{}: {}", path, e))?;

        let plaintext = if entry.encrypted {
            let key = keys.get().map_err(|reason| format!("{}: {}", path, reason))?;
            open(stored, key).map_err(|e| format!("{}: {}", path, e))?
        } else {
            stored.to_vec()
        };

        if sha256_hex(&plaintext) != entry.content_hash {
            return Err(format!("{}: content does not match its recorded hash", path));
        }
        Ok(plaintext)
    }

    fn write(&self, entry: &FileEntry, plaintext: &[u8]) -> Result<(), String> {
        let target = self.paths.resolve(&entry.relative_path);
        write_atomic(&target, plaintext, entry.mode)
            .map_err(|e| BackupError::target_write(entry.relative_path.as_str(), e).to_string())
    }
}

/// The restore key, derived once on the first encrypted entry
struct KeySlot<'a> {
    header: Option<&'a EncryptionHeader>,
    passphrase: Option<&'a SecureString>,
    derived: Option<Result<DerivedKey, String>>,
}

impl<'a> KeySlot<'a> {
    fn new(header: Option<&'a EncryptionHeader>, passphrase: Option<&'a SecureString>) -> Self {
        Self {
            header,
            passphrase,
            derived: None,
        }
    }

    fn get(&mut self) -> Result<&DerivedKey, String> {
        if self.derived.is_none() {
            self.derived = Some(self.derive());
        }
        match &self.derived {
            Some(Ok(key)) => Ok(key),
            Some(Err(reason)) => Err(reason.clone()),
            None => Err("encryption key unavailable".to_string()),
        }
    }

    fn derive(&self) -> Result<DerivedKey, String> {
        let passphrase = self
            .passphrase
            .ok_or_else(|| "encrypted file cannot be restored without key".to_string())?;
        let header = self
            .header
            .ok_or_else(|| "manifest has no encryption header".to_string())?;
        header.derive(passphrase).map_err(|e| e.to_string())
    }
}
