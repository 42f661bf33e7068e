//! automaton-state - durable-state backup, restore and migration
//!
//! This library persists and transfers the durable state of a long-running
//! autonomous instance: its identity, credentials, memory, soul and skills.
//!
//! # Architecture
//!
//! The crate is organized into the following modules:
//!
//! - `config`: Instance paths and backup settings
//! - `error`: Custom error types
//! - `models`: Categories, the backup manifest and the identity descriptor
//! - `crypto`: Argon2id key derivation and AES-256-GCM sealing
//! - `storage`: Atomic writes and transient working directories
//! - `backup`: Backup creation, integrity checks, restore and pruning
//! - `migration`: Moving state to a new identity and portable bundles
//! - `service`: `BackupService`, the facade over all of the above
//! - `cli`: Command handlers for the `automaton-state` binary
//!
//! # Example
//!
//! ```rust,ignore
//! use automaton_state::{BackupOptions, BackupService, BackupSettings, InstancePaths};
//!
//! let paths = InstancePaths::new()?;
//! let settings = BackupSettings::load_or_default(&paths)?;
//! let service = BackupService::new(paths, settings);
//!
//! let info = service.create_backup("sbx-1", &BackupOptions::incremental())?;
//! assert!(service.verify_backup_integrity(&info.path).valid);
//! ```

pub mod backup;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod error;
pub mod logging;
pub mod migration;
pub mod models;
pub mod service;
pub mod storage;

pub use backup::{BackupInfo, BackupOptions, IntegrityReport, RestoreOptions, RestoreResult};
pub use config::{BackupSettings, InstancePaths};
pub use crypto::SecureString;
pub use error::{BackupError, BackupResult};
pub use migration::{
    ImportRequest, MigrationExport, MigrationResult, MigrationVerification, PortableExport,
};
pub use models::{BackupType, Category, CategorySelection, FileEntry, Manifest};
pub use service::BackupService;
