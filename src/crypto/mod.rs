//! Cryptographic functions for automaton-state
//!
//! AES-256-GCM encryption with Argon2id key derivation for captured
//! credential material (and any category opted in).

pub mod encryption;
pub mod key_derivation;
pub mod secure_memory;

pub use encryption::{open, seal, EncryptionHeader};
pub use key_derivation::{derive_key, DerivedKey, KdfParams};
pub use secure_memory::SecureString;
