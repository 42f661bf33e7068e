//! Backup manifest codec
//!
//! A backup directory holds `manifest.json` and `payload.zst`. The manifest
//! lists every captured file with its plaintext hash and its location in the
//! decompressed payload, and seals both with a SHA-256 checksum.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::Category;
use crate::crypto::EncryptionHeader;
use crate::error::{BackupError, BackupResult};

/// Manifest format version
pub const MANIFEST_VERSION: u32 = 1;

/// Manifest file name inside a backup directory
pub const MANIFEST_FILE: &str = "manifest.json";

/// Compressed payload file name inside a backup directory
pub const PAYLOAD_FILE: &str = "payload.zst";

/// Full or incremental capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupType {
    /// Every durable-state file
    #[default]
    Full,
    /// Only files changed since the base backup
    Incremental,
}

impl std::fmt::Display for BackupType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackupType::Full => f.write_str("full"),
            BackupType::Incremental => f.write_str("incremental"),
        }
    }
}

/// One captured file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    /// `/`-separated path relative to the durable-state root
    pub relative_path: String,
    pub category: Category,
    /// SHA-256 of the plaintext (hex)
    pub content_hash: String,
    /// Plaintext size
    pub size_bytes: u64,
    /// Whether the stored bytes are ciphertext
    pub encrypted: bool,
    /// Start of the stored bytes in the decompressed payload
    pub offset: u64,
    /// Length of the stored bytes in the decompressed payload
    pub length: u64,
    /// Unix permission bits at capture time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<u32>,
}

/// Backup manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    /// Manifest format version
    pub version: u32,
    /// Source instance identity at capture time
    pub sandbox_id: String,
    pub created_at: DateTime<Utc>,
    #[serde(rename = "type")]
    pub backup_type: BackupType,
    /// Directory name of the backup an incremental is relative to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_manifest_ref: Option<String>,
    /// Key derivation header, present when any entry is encrypted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encryption: Option<EncryptionHeader>,
    /// Byte length of `payload.zst`
    pub payload_size: u64,
    pub files: Vec<FileEntry>,
    /// SHA-256 over every other field and the compressed payload
    pub checksum: String,
}

/// Everything the checksum covers, borrowed from a manifest
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChecksumView<'a> {
    version: u32,
    sandbox_id: &'a str,
    created_at: &'a DateTime<Utc>,
    #[serde(rename = "type")]
    backup_type: BackupType,
    base_manifest_ref: &'a Option<String>,
    encryption: &'a Option<EncryptionHeader>,
    payload_size: u64,
    files: &'a [FileEntry],
}

impl Manifest {
    /// Path of the manifest file in a backup directory
    pub fn manifest_path(backup_dir: &Path) -> PathBuf {
        backup_dir.join(MANIFEST_FILE)
    }

    /// Path of the payload file in a backup directory
    pub fn payload_path(backup_dir: &Path) -> PathBuf {
        backup_dir.join(PAYLOAD_FILE)
    }

    /// Compute the integrity checksum for this manifest and `payload`
    pub fn compute_checksum(&self, payload: &[u8]) -> BackupResult<String> {
        let view = ChecksumView {
            version: self.version,
            sandbox_id: &self.sandbox_id,
            created_at: &self.created_at,
            backup_type: self.backup_type,
            base_manifest_ref: &self.base_manifest_ref,
            encryption: &self.encryption,
            payload_size: self.payload_size,
            files: &self.files,
        };

        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(&view)?);
        hasher.update(payload);
        Ok(hex::encode(hasher.finalize()))
    }

    /// Set `payload_size` and `checksum` from the final payload bytes
    pub fn seal(&mut self, payload: &[u8]) -> BackupResult<()> {
        self.payload_size = payload.len() as u64;
        self.checksum = self.compute_checksum(payload)?;
        Ok(())
    }

    /// Whether the stored checksum matches `payload`
    pub fn checksum_matches(&self, payload: &[u8]) -> BackupResult<bool> {
        Ok(self.compute_checksum(payload)? == self.checksum)
    }

    /// Parse and validate manifest bytes
    pub fn from_slice(bytes: &[u8]) -> BackupResult<Self> {
        let manifest: Manifest = serde_json::from_slice(bytes)
            .map_err(|e| BackupError::Integrity(format!("Malformed manifest: {}", e)))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Serialize for storage
    pub fn to_bytes(&self) -> BackupResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Load the manifest of a backup directory
    pub fn load(backup_dir: &Path) -> BackupResult<Self> {
        let path = Self::manifest_path(backup_dir);
        let bytes = fs::read(&path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => {
                BackupError::ManifestNotFound(path.display().to_string())
            }
            _ => BackupError::Integrity(format!(
                "Failed to read manifest {}: {}",
                path.display(),
                e
            )),
        })?;
        Self::from_slice(&bytes)
    }

    /// Write the manifest into a backup directory
    pub fn save(&self, backup_dir: &Path) -> BackupResult<()> {
        fs::write(Self::manifest_path(backup_dir), self.to_bytes()?)
            .map_err(|e| BackupError::Io(format!("Failed to write manifest: {}", e)))
    }

    /// Structural checks serde can't express
    fn validate(&self) -> BackupResult<()> {
        if self.version != MANIFEST_VERSION {
            return Err(BackupError::Integrity(format!(
                "Unsupported manifest version: {} (expected {})",
                self.version, MANIFEST_VERSION
            )));
        }
        if self.sandbox_id.trim().is_empty() {
            return Err(BackupError::Integrity("Manifest has an empty sandboxId".into()));
        }
        if self.checksum.len() != 64 || !self.checksum.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(BackupError::Integrity("Manifest checksum is not a SHA-256 digest".into()));
        }
        if self.backup_type == BackupType::Incremental && self.base_manifest_ref.is_none() {
            return Err(BackupError::Integrity(
                "Incremental manifest has no baseManifestRef".into(),
            ));
        }

        let mut seen = HashSet::new();
        for entry in &self.files {
            if !is_safe_relative_path(&entry.relative_path) {
                return Err(BackupError::Integrity(format!(
                    "Unsafe path in manifest: {}",
                    entry.relative_path
                )));
            }
            if !seen.insert(entry.relative_path.as_str()) {
                return Err(BackupError::Integrity(format!(
                    "Duplicate path in manifest: {}",
                    entry.relative_path
                )));
            }
            if entry.encrypted && self.encryption.is_none() {
                return Err(BackupError::Integrity(format!(
                    "{} is encrypted but the manifest has no encryption header",
                    entry.relative_path
                )));
            }
        }

        Ok(())
    }

    /// Find an entry by relative path
    pub fn find(&self, relative_path: &str) -> Option<&FileEntry> {
        self.files.iter().find(|f| f.relative_path == relative_path)
    }

    /// Total plaintext bytes captured
    pub fn total_size(&self) -> u64 {
        self.files.iter().map(|f| f.size_bytes).sum()
    }
}

/// Reject absolute paths and parent traversal so a crafted manifest
/// can't write outside the durable-state root
fn is_safe_relative_path(path: &str) -> bool {
    !path.is_empty()
        && !path.starts_with('/')
        && !path.contains('\\')
        && path
            .split('/')
            .all(|part| !part.is_empty() && part != "." && part != "..")
}

/// SHA-256 of bytes as lowercase hex
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn sample_manifest() -> Manifest {
        Manifest {
            version: MANIFEST_VERSION,
            sandbox_id: "sbx-a".into(),
            created_at: Utc::now(),
            backup_type: BackupType::Full,
            base_manifest_ref: None,
            encryption: None,
            payload_size: 0,
            files: vec![FileEntry {
                relative_path: "SOUL.md".into(),
                category: Category::Soul,
                content_hash: sha256_hex(b"# soul"),
                size_bytes: 6,
                encrypted: false,
                offset: 0,
                length: 6,
                mode: None,
            }],
            checksum: String::new(),
        }
    }

    #[test]
    fn test_sha256_known_value() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_seal_and_verify() {
        let mut manifest = sample_manifest();
        manifest.seal(b"payload").unwrap();

        assert_eq!(manifest.payload_size, 7);
        assert!(manifest.checksum_matches(b"payload").unwrap());
        assert!(!manifest.checksum_matches(b"payloaD").unwrap());
    }

    #[test]
    fn test_entry_tamper_changes_checksum() {
        let mut manifest = sample_manifest();
        manifest.seal(b"payload").unwrap();

        manifest.files[0].content_hash = sha256_hex(b"# other soul");
        assert!(!manifest.checksum_matches(b"payload").unwrap());
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let mut manifest = sample_manifest();
        manifest.seal(b"payload").unwrap();
        manifest.save(temp_dir.path()).unwrap();

        let loaded = Manifest::load(temp_dir.path()).unwrap();
        assert_eq!(loaded.checksum, manifest.checksum);
        assert!(loaded.checksum_matches(b"payload").unwrap());
    }

    #[test]
    fn test_serialized_field_names() {
        let mut manifest = sample_manifest();
        manifest.seal(b"").unwrap();
        let json = String::from_utf8(manifest.to_bytes().unwrap()).unwrap();

        assert!(json.contains("\"sandboxId\""));
        assert!(json.contains("\"type\": \"full\""));
        assert!(json.contains("\"relativePath\""));
        assert!(!json.contains("baseManifestRef"));
    }

    #[test]
    fn test_missing_manifest() {
        let temp_dir = TempDir::new().unwrap();
        let result = Manifest::load(temp_dir.path());
        assert!(matches!(result, Err(BackupError::ManifestNotFound(_))));
    }

    #[test]
    fn test_missing_required_field_is_integrity_error() {
        let result = Manifest::from_slice(br#"{"version":1,"sandboxId":"x"}"#);
        assert!(matches!(result, Err(BackupError::Integrity(_))));
    }

    #[test]
    fn test_duplicate_paths_rejected() {
        let mut manifest = sample_manifest();
        let dup = manifest.files[0].clone();
        manifest.files.push(dup);
        manifest.seal(b"").unwrap();

        let result = Manifest::from_slice(&manifest.to_bytes().unwrap());
        assert!(matches!(result, Err(BackupError::Integrity(_))));
    }

    #[test]
    fn test_unsafe_paths_rejected() {
        assert!(!is_safe_relative_path("../etc/passwd"));
        assert!(!is_safe_relative_path("/etc/passwd"));
        assert!(!is_safe_relative_path("skills//x"));
        assert!(is_safe_relative_path("skills/web/SKILL.md"));
    }

    #[test]
    fn test_incremental_requires_base_ref() {
        let mut manifest = sample_manifest();
        manifest.backup_type = BackupType::Incremental;
        manifest.seal(b"").unwrap();

        let result = Manifest::from_slice(&manifest.to_bytes().unwrap());
        assert!(matches!(result, Err(BackupError::Integrity(_))));
    }
}
