//! Migration between instance identities
//!
//! Export is a full backup of the source instance. Import verifies the
//! backup, restores every category into the local tree and then rebinds
//! the identity descriptor to the new owner.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, info_span, warn};

use super::identity::rewrite_sandbox_id;
use crate::backup::{
    verify_backup_integrity, BackupCreator, BackupInfo, BackupOptions, RestoreManager,
    RestoreOptions,
};
use crate::config::{BackupSettings, InstancePaths};
use crate::crypto::SecureString;
use crate::error::BackupResult;
use crate::models::Manifest;

/// A completed migration export
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationExport {
    pub backup: BackupInfo,
    pub source_sandbox_id: String,
    pub exported_at: DateTime<Utc>,
}

/// Where to import from and who the state will belong to
#[derive(Debug, Clone)]
pub struct ImportRequest {
    pub backup_path: PathBuf,
    pub new_sandbox_id: String,
    pub decryption_key: Option<SecureString>,
}

impl ImportRequest {
    pub fn new(backup_path: impl Into<PathBuf>, new_sandbox_id: impl Into<String>) -> Self {
        Self {
            backup_path: backup_path.into(),
            new_sandbox_id: new_sandbox_id.into(),
            decryption_key: None,
        }
    }

    pub fn with_key(mut self, key: impl Into<SecureString>) -> Self {
        self.decryption_key = Some(key.into());
        self
    }
}

/// Outcome of an import
///
/// Imports never fail early; every problem lands in `errors`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationResult {
    pub success: bool,
    /// Identity recorded in the backup, when its manifest was readable
    pub source_sandbox_id: Option<String>,
    pub target_sandbox_id: String,
    pub files_restored: usize,
    pub identity_updated: bool,
    pub errors: Vec<String>,
}

impl MigrationResult {
    /// An import that stopped before touching local state
    pub fn failed(target_sandbox_id: &str, errors: Vec<String>) -> Self {
        Self {
            success: false,
            target_sandbox_id: target_sandbox_id.to_string(),
            errors,
            ..Self::default()
        }
    }

    /// Get a summary of the import
    pub fn summary(&self) -> String {
        let status = if self.success { "succeeded" } else { "failed" };
        format!(
            "Migration {}: {} file(s) restored, identity {}, {} error(s)",
            status,
            self.files_restored,
            if self.identity_updated { "updated" } else { "unchanged" },
            self.errors.len()
        )
    }
}

/// Which captured files are present in the local tree
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationVerification {
    pub complete: bool,
    pub missing_files: Vec<String>,
    pub present_files: Vec<String>,
}

/// Moves state between instance identities
pub struct MigrationOrchestrator<'a> {
    pub(crate) paths: &'a InstancePaths,
    pub(crate) settings: &'a BackupSettings,
}

impl<'a> MigrationOrchestrator<'a> {
    pub fn new(paths: &'a InstancePaths, settings: &'a BackupSettings) -> Self {
        Self { paths, settings }
    }

    /// Take a full backup of the source instance for transfer
    pub fn export_for_migration(
        &self,
        source_sandbox_id: &str,
        encryption_key: Option<SecureString>,
        output_dir: Option<PathBuf>,
    ) -> BackupResult<MigrationExport> {
        let options = BackupOptions {
            encryption_key,
            output_dir,
            ..BackupOptions::full()
        };
        let backup = BackupCreator::new(self.paths, self.settings).create(source_sandbox_id, &options)?;

        info!(backup = %backup.name, source = %source_sandbox_id, "migration export ready");
        Ok(MigrationExport {
            backup,
            source_sandbox_id: source_sandbox_id.to_string(),
            exported_at: Utc::now(),
        })
    }

    /// Restore a migration backup locally and rebind it to a new identity
    pub fn import_migration(&self, request: &ImportRequest) -> MigrationResult {
        let span = info_span!(
            "import_migration",
            path = %request.backup_path.display(),
            target = %request.new_sandbox_id
        );
        let _guard = span.enter();

        if request.new_sandbox_id.trim().is_empty() {
            return MigrationResult::failed(
                &request.new_sandbox_id,
                vec!["New sandbox id must not be empty".to_string()],
            );
        }

        let report = verify_backup_integrity(&request.backup_path);
        if !report.valid {
            warn!("migration backup failed verification, nothing imported");
            return MigrationResult::failed(&request.new_sandbox_id, report.errors);
        }

        let mut result = MigrationResult {
            target_sandbox_id: request.new_sandbox_id.clone(),
            source_sandbox_id: Manifest::load(&request.backup_path)
                .ok()
                .map(|m| m.sandbox_id),
            ..MigrationResult::default()
        };

        let options = RestoreOptions {
            decryption_key: request.decryption_key.clone(),
            ..RestoreOptions::default()
        };
        match RestoreManager::new(self.paths).restore(&request.backup_path, &options) {
            Ok(restore) => {
                result.files_restored = restore.restored_files.len();
                result.errors.extend(restore.errors);
            }
            Err(e) => {
                result.errors.push(e.to_string());
                return result;
            }
        }

        match rewrite_sandbox_id(&self.paths.identity_file(), &request.new_sandbox_id) {
            Ok(()) => result.identity_updated = true,
            Err(e) => result.errors.push(e.to_string()),
        }

        result.success = result.errors.is_empty();
        info!(
            success = result.success,
            files = result.files_restored,
            identity_updated = result.identity_updated,
            "migration import finished"
        );
        result
    }

    /// Check which files of a backup exist in the local tree
    pub fn verify_migration(&self, backup_path: &Path) -> BackupResult<MigrationVerification> {
        let manifest = Manifest::load(backup_path)?;

        let (present_files, missing_files): (Vec<_>, Vec<_>) = manifest
            .files
            .into_iter()
            .map(|entry| entry.relative_path)
            .partition(|path| self.paths.resolve(path).is_file());

        Ok(MigrationVerification {
            complete: missing_files.is_empty(),
            missing_files,
            present_files,
        })
    }
}
