//! Integrity verification
//!
//! Recomputes the manifest checksum from the stored payload and checks
//! every entry's addressing, without needing a decryption key.

use std::fs;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, warn};

use super::payload::{decompress, entry_bytes};
use crate::error::{BackupError, BackupResult};
use crate::models::Manifest;

/// Outcome of verifying one backup directory
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct IntegrityReport {
    pub valid: bool,
    pub errors: Vec<String>,
}

impl IntegrityReport {
    /// Get a summary of the verification
    pub fn summary(&self) -> String {
        if self.valid {
            "Backup is valid".to_string()
        } else {
            format!("Backup is invalid ({} problem(s))", self.errors.len())
        }
    }
}

/// A backup whose checksum and addressing have been checked
pub(crate) struct VerifiedBackup {
    pub manifest: Manifest,
    /// Decompressed payload
    pub payload: Vec<u8>,
}

/// Verify a backup directory, reporting each problem found
pub fn verify_backup_integrity(backup_dir: &Path) -> IntegrityReport {
    let (verified, errors) = inspect(backup_dir);
    let valid = verified.is_some() && errors.is_empty();

    if !valid {
        warn!(path = %backup_dir.display(), problems = errors.len(), "backup failed verification");
    }
    IntegrityReport { valid, errors }
}

/// Open a backup for restore, refusing anything that fails verification
///
/// A missing manifest is reported as `ManifestNotFound`, every other
/// problem as `Integrity`.
pub(crate) fn open_verified(backup_dir: &Path) -> BackupResult<VerifiedBackup> {
    if let Err(e @ BackupError::ManifestNotFound(_)) = Manifest::load(backup_dir) {
        return Err(e);
    }

    match inspect(backup_dir) {
        (Some(verified), errors) if errors.is_empty() => Ok(verified),
        (_, errors) => Err(BackupError::Integrity(errors.join("; "))),
    }
}

fn inspect(backup_dir: &Path) -> (Option<VerifiedBackup>, Vec<String>) {
    let mut errors = Vec::new();

    let manifest = Manifest::load(backup_dir).map_err(|e| errors.push(e.to_string()));

    let payload_path = Manifest::payload_path(backup_dir);
    let compressed = fs::read(&payload_path).map_err(|e| {
        errors.push(format!(
            "Failed to read payload {}: {}",
            payload_path.display(),
            e
        ))
    });

    let (Ok(manifest), Ok(compressed)) = (manifest, compressed) else {
        return (None, errors);
    };

    if compressed.len() as u64 != manifest.payload_size {
        errors.push(format!(
            "Payload size mismatch: manifest records {} bytes, found {}",
            manifest.payload_size,
            compressed.len()
        ));
    }

    match manifest.checksum_matches(&compressed) {
        Ok(true) => {}
        Ok(false) => {
            errors.push("Checksum mismatch: manifest or payload has been modified".to_string());
        }
        Err(e) => errors.push(e.to_string()),
    }

    // Content checks only mean something once the checksum holds
    if !errors.is_empty() {
        return (None, errors);
    }

    let payload = match decompress(&compressed) {
        Ok(payload) => payload,
        Err(e) => {
            errors.push(e.to_string());
            return (None, errors);
        }
    };

    for entry in &manifest.files {
        if let Err(e) = entry_bytes(&payload, entry) {
            errors.push(e.to_string());
        }
    }

    debug!(
        path = %backup_dir.display(),
        files = manifest.files.len(),
        problems = errors.len(),
        "verified backup"
    );
    (Some(VerifiedBackup { manifest, payload }), errors)
}
