//! Custom error types for automaton-state
//!
//! Fatal, whole-operation failures are returned as `Err(BackupError)`.
//! Per-file failures during restore and import are rendered from the same
//! variants into the `errors` list of the batch result instead.

use thiserror::Error;

/// The main error type for backup, restore and migration operations
#[derive(Error, Debug)]
pub enum BackupError {
    /// Manifest checksum mismatch, malformed manifest or unreadable payload
    #[error("Integrity error: {0}")]
    Integrity(String),

    /// Encrypted file encountered with a missing or wrong key
    #[error("Encryption key error: {0}")]
    EncryptionKey(String),

    /// A file to be captured could not be read
    #[error("Failed to read source file {path}: {reason}")]
    SourceRead { path: String, reason: String },

    /// A restored file could not be written
    #[error("{path}: write failed: {reason}")]
    TargetWrite { path: String, reason: String },

    /// The identity descriptor could not be rewritten
    #[error("Identity update failed: {0}")]
    IdentityUpdate(String),

    /// No manifest at the given backup path
    #[error("Manifest not found: {0}")]
    ManifestNotFound(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(String),

    /// Payload compression errors
    #[error("Compression error: {0}")]
    Compression(String),

    /// Cipher or key derivation failures unrelated to the supplied key
    #[error("Encryption error: {0}")]
    Encryption(String),

    /// Entity not found errors
    #[error("{entity_type} not found: {identifier}")]
    NotFound {
        entity_type: &'static str,
        identifier: String,
    },
}

impl BackupError {
    /// Create a "not found" error for backups
    pub fn backup_not_found(identifier: impl Into<String>) -> Self {
        Self::NotFound {
            entity_type: "Backup",
            identifier: identifier.into(),
        }
    }

    /// Create a source read error for a captured path
    pub fn source_read(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::SourceRead {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Create a target write error for a restored path
    pub fn target_write(path: impl Into<String>, reason: impl ToString) -> Self {
        Self::TargetWrite {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. } | Self::ManifestNotFound(_))
    }
}

impl From<std::io::Error> for BackupError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<serde_json::Error> for BackupError {
    fn from(err: serde_json::Error) -> Self {
        Self::Json(err.to_string())
    }
}

/// Result type alias for automaton-state operations
pub type BackupResult<T> = Result<T, BackupError>;
