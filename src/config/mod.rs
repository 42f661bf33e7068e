//! Configuration module for automaton-state
//!
//! - Durable-state and backups root resolution
//! - Backup settings persistence

pub mod paths;
pub mod settings;

pub use paths::InstancePaths;
pub use settings::{BackupRetention, BackupSettings};
