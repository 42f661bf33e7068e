//! Path management for automaton-state
//!
//! Resolves the instance's durable-state root and the backups root.
//!
//! ## Path Resolution Order
//!
//! 1. `AUTOMATON_HOME` environment variable (if set)
//! 2. `$HOME/.automaton` via the platform's home directory
//!
//! The backups root defaults to `<root>/backups` and can be moved with
//! `AUTOMATON_BACKUP_DIR`.

use std::path::{Path, PathBuf};

use directories::BaseDirs;

use crate::error::{BackupError, BackupResult};
use crate::models::identity::IdentityDescriptor;

/// Name of the identity descriptor at the root of the durable state
pub const IDENTITY_FILE: &str = "automaton.json";

/// Directory name of the default backups root
pub const BACKUPS_DIR: &str = "backups";

/// Settings file for this crate; lives in the root but is never captured
pub const SETTINGS_FILE: &str = "backup-settings.json";

/// Manages all paths used by automaton-state
#[derive(Debug, Clone)]
pub struct InstancePaths {
    /// Durable-state root of the instance
    base_dir: PathBuf,
    /// Where timestamped backup directories are created
    backups_dir: PathBuf,
}

impl InstancePaths {
    /// Create a new InstancePaths instance from the environment
    ///
    /// # Errors
    ///
    /// Returns an error if the home directory cannot be determined.
    pub fn new() -> BackupResult<Self> {
        let base_dir = match std::env::var_os("AUTOMATON_HOME") {
            Some(custom) => PathBuf::from(custom),
            None => resolve_default_path()?,
        };

        let backups_dir = match std::env::var_os("AUTOMATON_BACKUP_DIR") {
            Some(custom) => PathBuf::from(custom),
            None => base_dir.join(BACKUPS_DIR),
        };

        Ok(Self {
            base_dir,
            backups_dir,
        })
    }

    /// Create InstancePaths with a custom root (useful for testing)
    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        let backups_dir = base_dir.join(BACKUPS_DIR);
        Self {
            base_dir,
            backups_dir,
        }
    }

    /// The durable-state root (~/.automaton/ or equivalent)
    pub fn state_root(&self) -> &Path {
        &self.base_dir
    }

    /// The default backups root
    pub fn backups_dir(&self) -> &Path {
        &self.backups_dir
    }

    /// Path to automaton.json
    pub fn identity_file(&self) -> PathBuf {
        self.base_dir.join(IDENTITY_FILE)
    }

    /// Path to the backup settings file
    pub fn settings_file(&self) -> PathBuf {
        self.base_dir.join(SETTINGS_FILE)
    }

    /// Resolve a path relative to the durable-state root
    pub fn resolve(&self, relative_path: &str) -> PathBuf {
        relative_path
            .split('/')
            .fold(self.base_dir.clone(), |acc, part| acc.join(part))
    }

    /// Read the current identity id from the identity descriptor
    ///
    /// Returns `None` when the instance has no descriptor yet.
    pub fn current_sandbox_id(&self) -> BackupResult<Option<String>> {
        let path = self.identity_file();
        if !path.exists() {
            return Ok(None);
        }
        IdentityDescriptor::load(&path).map(|identity| Some(identity.sandbox_id))
    }
}

/// Resolve the default state root from the user's home directory
fn resolve_default_path() -> BackupResult<PathBuf> {
    let dirs = BaseDirs::new()
        .ok_or_else(|| BackupError::Config("Could not determine home directory".into()))?;
    Ok(dirs.home_dir().join(".automaton"))
}
