//! Portable single-file bundles
//!
//! A bundle frames one backup as
//! `[u32 BE manifest length][manifest JSON][compressed payload]` so it can
//! travel as a single file or byte stream.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, info_span};

use super::orchestrator::{ImportRequest, MigrationOrchestrator, MigrationResult};
use crate::backup::{BackupCreator, BackupOptions};
use crate::crypto::SecureString;
use crate::error::{BackupError, BackupResult};
use crate::models::Manifest;
use crate::storage::file_io::{write_atomic, TransientDir};

/// Size of the manifest length prefix
pub const LENGTH_PREFIX: usize = 4;

/// A written bundle
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PortableExport {
    pub file_path: PathBuf,
    pub sandbox_id: String,
    pub file_count: usize,
    pub size_bytes: u64,
    pub exported_at: DateTime<Utc>,
}

/// The two sections of a decoded bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BundleParts<'a> {
    pub manifest: &'a [u8],
    pub payload: &'a [u8],
}

/// Frame manifest bytes and a compressed payload into one buffer
pub fn encode_bundle(manifest: &[u8], payload: &[u8]) -> BackupResult<Vec<u8>> {
    let length = u32::try_from(manifest.len()).map_err(|_| {
        BackupError::Integrity(format!(
            "Manifest of {} bytes is too large for a bundle",
            manifest.len()
        ))
    })?;

    let mut bundle = Vec::with_capacity(LENGTH_PREFIX + manifest.len() + payload.len());
    bundle.extend_from_slice(&length.to_be_bytes());
    bundle.extend_from_slice(manifest);
    bundle.extend_from_slice(payload);
    Ok(bundle)
}

/// Split a bundle into its manifest and payload sections
pub fn decode_bundle(bundle: &[u8]) -> BackupResult<BundleParts<'_>> {
    if bundle.len() < LENGTH_PREFIX {
        return Err(BackupError::Integrity(format!(
            "Bundle is truncated: {} bytes, no length prefix",
            bundle.len()
        )));
    }

    let (prefix, rest) = bundle.split_at(LENGTH_PREFIX);
    let mut length_bytes = [0u8; LENGTH_PREFIX];
    length_bytes.copy_from_slice(prefix);
    let length = u32::from_be_bytes(length_bytes) as usize;
    if length == 0 || length > rest.len() {
        return Err(BackupError::Integrity(format!(
            "Bundle is truncated: manifest length {} with {} bytes remaining",
            length,
            rest.len()
        )));
    }

    let (manifest, payload) = rest.split_at(length);
    Ok(BundleParts { manifest, payload })
}

impl MigrationOrchestrator<'_> {
    /// Write a full backup of the source instance as one bundle file
    pub fn export_portable(
        &self,
        source_sandbox_id: &str,
        output_path: &Path,
        encryption_key: Option<SecureString>,
    ) -> BackupResult<PortableExport> {
        let span = info_span!("export_portable", source = %source_sandbox_id, output = %output_path.display());
        let _guard = span.enter();

        fs::create_dir_all(self.paths.backups_dir())?;
        let transient = TransientDir::create_in(self.paths.backups_dir(), "portable")?;

        let options = BackupOptions {
            encryption_key,
            output_dir: Some(transient.path().to_path_buf()),
            ..BackupOptions::full()
        };
        let backup = BackupCreator::new(self.paths, self.settings).create(source_sandbox_id, &options)?;

        let manifest = fs::read(Manifest::manifest_path(&backup.path))?;
        let payload = fs::read(Manifest::payload_path(&backup.path))?;
        let bundle = encode_bundle(&manifest, &payload)?;

        write_atomic(output_path, &bundle, None)?;

        info!(files = backup.file_count, bytes = bundle.len(), "portable bundle written");
        Ok(PortableExport {
            file_path: output_path.to_path_buf(),
            sandbox_id: source_sandbox_id.to_string(),
            file_count: backup.file_count,
            size_bytes: bundle.len() as u64,
            exported_at: Utc::now(),
        })
    }

    /// Import a bundle file and rebind it to `new_sandbox_id`
    ///
    /// The bundle is unpacked into a transient backup directory that is
    /// removed whatever the outcome.
    pub fn import_portable(
        &self,
        bundle_path: &Path,
        new_sandbox_id: &str,
        decryption_key: Option<SecureString>,
    ) -> MigrationResult {
        let span = info_span!("import_portable", bundle = %bundle_path.display());
        let _guard = span.enter();

        let transient = match self.unpack(bundle_path) {
            Ok(transient) => transient,
            Err(e) => return MigrationResult::failed(new_sandbox_id, vec![e.to_string()]),
        };

        let request = ImportRequest {
            backup_path: transient.path().to_path_buf(),
            new_sandbox_id: new_sandbox_id.to_string(),
            decryption_key,
        };
        self.import_migration(&request)
    }

    /// Materialize a bundle as a backup directory
    fn unpack(&self, bundle_path: &Path) -> BackupResult<TransientDir> {
        let bundle = fs::read(bundle_path).map_err(|e| {
            BackupError::Io(format!(
                "Failed to read bundle {}: {}",
                bundle_path.display(),
                e
            ))
        })?;
        let parts = decode_bundle(&bundle)?;
        Manifest::from_slice(parts.manifest)?;

        fs::create_dir_all(self.paths.backups_dir())?;
        let transient = TransientDir::create_in(self.paths.backups_dir(), "import")?;
        write_atomic(Manifest::manifest_path(transient.path()), parts.manifest, None)?;
        write_atomic(Manifest::payload_path(transient.path()), parts.payload, None)?;
        Ok(transient)
    }
}
