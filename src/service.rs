//! Backup service
//!
//! The single entry point to every backup, restore and migration operation,
//! bound to one instance's paths and settings.

use std::path::{Path, PathBuf};

use tracing::warn;

use crate::backup::{
    self, BackupCreator, BackupInfo, BackupOptions, IntegrityReport, RestoreManager,
    RestoreOptions, RestoreResult,
};
use crate::config::{BackupSettings, InstancePaths};
use crate::crypto::SecureString;
use crate::error::{BackupError, BackupResult};
use crate::migration::{
    ImportRequest, MigrationExport, MigrationOrchestrator, MigrationResult, MigrationVerification,
    PortableExport,
};
use crate::models::Manifest;

/// Service for backup, restore and migration
#[derive(Debug, Clone)]
pub struct BackupService {
    paths: InstancePaths,
    settings: BackupSettings,
}

impl BackupService {
    /// Create a new backup service
    pub fn new(paths: InstancePaths, settings: BackupSettings) -> Self {
        Self { paths, settings }
    }

    pub fn paths(&self) -> &InstancePaths {
        &self.paths
    }

    pub fn settings(&self) -> &BackupSettings {
        &self.settings
    }

    /// Capture the durable state into a new backup
    pub fn create_backup(
        &self,
        source_sandbox_id: &str,
        options: &BackupOptions,
    ) -> BackupResult<BackupInfo> {
        BackupCreator::new(&self.paths, &self.settings).create(source_sandbox_id, options)
    }

    /// Backups of the current identity, newest first
    ///
    /// Lists every backup when the instance has no identity yet.
    pub fn list_backups(&self) -> BackupResult<Vec<BackupInfo>> {
        let sandbox_id = match self.paths.current_sandbox_id() {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "identity unreadable, listing all backups");
                None
            }
        };
        backup::list_backups_in(self.paths.backups_dir(), sandbox_id.as_deref())
    }

    /// The newest backup of the current identity
    pub fn latest_backup(&self) -> BackupResult<BackupInfo> {
        self.list_backups()?
            .into_iter()
            .next()
            .ok_or_else(|| BackupError::backup_not_found("latest"))
    }

    /// Delete the oldest backups under `backups_root` beyond `keep_count`
    pub fn prune_backups(&self, backups_root: &Path, keep_count: usize) -> BackupResult<usize> {
        backup::prune_backups(backups_root, keep_count)
    }

    /// Prune the configured backups root to the configured retention
    pub fn prune_with_retention(&self) -> BackupResult<usize> {
        self.prune_backups(self.paths.backups_dir(), self.settings.retention.keep_count)
    }

    /// Load and validate a backup's manifest
    pub fn load_manifest(&self, backup_path: &Path) -> BackupResult<Manifest> {
        Manifest::load(backup_path)
    }

    /// Verify a backup without restoring it
    pub fn verify_backup_integrity(&self, backup_path: &Path) -> IntegrityReport {
        backup::verify_backup_integrity(backup_path)
    }

    /// Restore a backup into the durable-state tree
    pub fn restore_backup(
        &self,
        backup_path: &Path,
        options: &RestoreOptions,
    ) -> BackupResult<RestoreResult> {
        RestoreManager::new(&self.paths).restore(backup_path, options)
    }

    /// Full backup of the source instance for transfer
    pub fn export_for_migration(
        &self,
        source_sandbox_id: &str,
        encryption_key: Option<SecureString>,
        output_dir: Option<PathBuf>,
    ) -> BackupResult<MigrationExport> {
        self.orchestrator()
            .export_for_migration(source_sandbox_id, encryption_key, output_dir)
    }

    /// Restore a migration backup and rebind it to a new identity
    pub fn import_migration(&self, request: &ImportRequest) -> MigrationResult {
        self.orchestrator().import_migration(request)
    }

    /// Which files of a backup exist in the local tree
    pub fn verify_migration(&self, backup_path: &Path) -> BackupResult<MigrationVerification> {
        self.orchestrator().verify_migration(backup_path)
    }

    /// Write a single-file bundle of the source instance
    pub fn export_portable(
        &self,
        source_sandbox_id: &str,
        output_path: &Path,
        encryption_key: Option<SecureString>,
    ) -> BackupResult<PortableExport> {
        self.orchestrator()
            .export_portable(source_sandbox_id, output_path, encryption_key)
    }

    /// Import a single-file bundle under a new identity
    pub fn import_portable(
        &self,
        bundle_path: &Path,
        new_sandbox_id: &str,
        decryption_key: Option<SecureString>,
    ) -> MigrationResult {
        self.orchestrator()
            .import_portable(bundle_path, new_sandbox_id, decryption_key)
    }

    fn orchestrator(&self) -> MigrationOrchestrator<'_> {
        MigrationOrchestrator::new(&self.paths, &self.settings)
    }
}
