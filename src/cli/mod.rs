//! CLI command handlers
//!
//! This module contains the implementation of CLI commands,
//! bridging the clap argument parsing with the backup service.

pub mod backup;
pub mod key;
pub mod migrate;

pub use backup::{handle_backup_command, BackupCommands};
pub use migrate::{handle_bundle_command, handle_migrate_command, BundleCommands, MigrateCommands};
