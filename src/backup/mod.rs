//! Backup system for automaton-state
//!
//! Captures the instance's durable state into sealed backup directories and
//! restores it again.
//!
//! # Architecture
//!
//! - `BackupCreator`: walks the state tree and writes full or incremental
//!   backups
//! - `RestoreManager`: verifies a backup and writes selected files back
//! - `manager`: lists, names and prunes backup directories
//! - `integrity`: checksum and addressing verification
//!
//! # Backup Format
//!
//! Each backup is a directory `backup-YYYYMMDD-HHMMSS-mmm` holding:
//! - `manifest.json`: file list, hashes, optional encryption header, checksum
//! - `payload.zst`: every captured file's stored bytes in one zstd frame
//!
//! # Example
//!
//! ```rust,ignore
//! use automaton_state::backup::{BackupCreator, BackupOptions, RestoreManager, RestoreOptions};
//! use automaton_state::config::{BackupSettings, InstancePaths};
//!
//! let paths = InstancePaths::new()?;
//! let settings = BackupSettings::load_or_default(&paths)?;
//!
//! let info = BackupCreator::new(&paths, &settings)
//!     .create("sbx-1", &BackupOptions::incremental())?;
//!
//! let result = RestoreManager::new(&paths).restore(&info.path, &RestoreOptions::default())?;
//! println!("{}", result.summary());
//! ```

pub mod creator;
pub mod integrity;
pub mod manager;
pub mod payload;
pub mod restore;

pub use creator::{BackupCreator, BackupOptions};
pub use integrity::{verify_backup_integrity, IntegrityReport};
pub use manager::{latest_backup, list_backups_in, prune_backups, BackupInfo};
pub use restore::{RestoreManager, RestoreOptions, RestoreResult};
