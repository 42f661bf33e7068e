//! Backup settings for automaton-state
//!
//! Retention, compression, encryption opt-ins and key derivation costs.
//! Persisted as JSON next to the durable state.

use serde::{Deserialize, Serialize};

use super::paths::InstancePaths;
use crate::crypto::key_derivation::KdfParams;
use crate::error::BackupError;
use crate::models::Category;
use crate::storage::file_io::write_json_atomic;

/// Backup retention settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupRetention {
    /// Number of backups kept by `prune` when no explicit count is given
    pub keep_count: usize,
}

impl Default for BackupRetention {
    fn default() -> Self {
        Self { keep_count: 10 }
    }
}

/// Settings for backup and restore operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSettings {
    /// Schema version for migration support
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,

    /// Backup retention policy
    #[serde(default)]
    pub retention: BackupRetention,

    /// zstd compression level for payloads
    #[serde(default = "default_compression_level")]
    pub compression_level: i32,

    /// Categories encrypted in addition to `secrets` when a key is supplied
    #[serde(default)]
    pub encrypt_categories: Vec<Category>,

    /// Argon2id cost parameters for new backups
    #[serde(default)]
    pub kdf: KdfParams,
}

fn default_schema_version() -> u32 {
    1
}

fn default_compression_level() -> i32 {
    3
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            schema_version: default_schema_version(),
            retention: BackupRetention::default(),
            compression_level: default_compression_level(),
            encrypt_categories: Vec::new(),
            kdf: KdfParams::default(),
        }
    }
}

impl BackupSettings {
    /// Load settings from disk, or fall back to defaults if the file doesn't exist
    pub fn load_or_default(paths: &InstancePaths) -> Result<Self, BackupError> {
        let settings_path = paths.settings_file();

        if !settings_path.exists() {
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&settings_path)
            .map_err(|e| BackupError::Io(format!("Failed to read settings file: {}", e)))?;

        let settings: BackupSettings = serde_json::from_str(&contents)
            .map_err(|e| BackupError::Config(format!("Failed to parse settings file: {}", e)))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Save settings to disk
    pub fn save(&self, paths: &InstancePaths) -> Result<(), BackupError> {
        self.validate()?;
        write_json_atomic(paths.settings_file(), self, None)
    }

    /// Reject values zstd or argon2 would refuse later
    pub fn validate(&self) -> Result<(), BackupError> {
        if !zstd::compression_level_range().contains(&self.compression_level) {
            return Err(BackupError::Config(format!(
                "compression_level {} is outside the supported zstd range",
                self.compression_level
            )));
        }
        self.kdf.validate()
    }

    /// Whether files of `category` are encrypted when a key is supplied
    pub fn encrypts(&self, category: Category) -> bool {
        category == Category::Secrets || self.encrypt_categories.contains(&category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_settings() {
        let settings = BackupSettings::default();
        assert_eq!(settings.retention.keep_count, 10);
        assert_eq!(settings.compression_level, 3);
        assert!(settings.encrypt_categories.is_empty());
        assert!(settings.encrypts(Category::Secrets));
        assert!(!settings.encrypts(Category::Memory));
    }

    #[test]
    fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let paths = InstancePaths::with_base_dir(temp_dir.path().to_path_buf());

        let mut settings = BackupSettings::default();
        settings.retention.keep_count = 3;
        settings.encrypt_categories = vec![Category::Memory];
        settings.save(&paths).unwrap();

        let loaded = BackupSettings::load_or_default(&paths).unwrap();
        assert_eq!(loaded.retention.keep_count, 3);
        assert!(loaded.encrypts(Category::Memory));
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let settings: BackupSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings.compression_level, 3);
        assert_eq!(settings.kdf.memory_cost, 65536);
    }

    #[test]
    fn test_invalid_compression_level_rejected() {
        let temp_dir = TempDir::new().unwrap();
        let paths = InstancePaths::with_base_dir(temp_dir.path().to_path_buf());
        std::fs::write(paths.settings_file(), r#"{"compression_level": 99}"#).unwrap();

        let result = BackupSettings::load_or_default(&paths);
        assert!(matches!(result, Err(BackupError::Config(_))));
    }
}
