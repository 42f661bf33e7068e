//! State migration between instances
//!
//! - `orchestrator`: export a backup for transfer and import it under a new
//!   identity
//! - `identity`: rewrite the sandbox id in `automaton.json`
//! - `bundle`: single-file framing of a backup for transport

pub mod bundle;
pub mod identity;
pub mod orchestrator;

pub use bundle::{decode_bundle, encode_bundle, BundleParts, PortableExport};
pub use identity::rewrite_sandbox_id;
pub use orchestrator::{
    ImportRequest, MigrationExport, MigrationOrchestrator, MigrationResult, MigrationVerification,
};
