//! Core data models for automaton-state
//!
//! File categories, the backup manifest and the identity descriptor.

pub mod category;
pub mod identity;
pub mod manifest;

pub use category::{Category, CategorySelection};
pub use identity::IdentityDescriptor;
pub use manifest::{BackupType, FileEntry, Manifest, MANIFEST_FILE, PAYLOAD_FILE};
