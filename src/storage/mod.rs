//! Storage helpers for automaton-state
//!
//! Atomic writes, permission handling and self-cleaning working directories.

pub mod file_io;

pub use file_io::{dir_size, write_atomic, write_json_atomic, TransientDir};
