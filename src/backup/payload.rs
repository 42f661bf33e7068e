//! Payload assembly and compression
//!
//! Captured files are concatenated into one buffer and compressed as a
//! single zstd frame. Manifest entries address the decompressed bytes.

use crate::error::{BackupError, BackupResult};
use crate::models::FileEntry;

/// Accumulates stored file bytes before compression
#[derive(Debug, Default)]
pub struct PayloadBuilder {
    buffer: Vec<u8>,
}

impl PayloadBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append stored bytes, returning their `(offset, length)`
    pub fn append(&mut self, bytes: &[u8]) -> (u64, u64) {
        let offset = self.buffer.len() as u64;
        self.buffer.extend_from_slice(bytes);
        (offset, bytes.len() as u64)
    }

    /// Uncompressed size so far
    #[allow(clippy::len_without_is_empty)]
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// Compress the accumulated bytes
    pub fn finish(self, level: i32) -> BackupResult<Vec<u8>> {
        zstd::stream::encode_all(self.buffer.as_slice(), level)
            .map_err(|e| BackupError::Compression(format!("Failed to compress payload: {}", e)))
    }
}

/// Decompress a stored payload
pub fn decompress(compressed: &[u8]) -> BackupResult<Vec<u8>> {
    zstd::stream::decode_all(compressed)
        .map_err(|e| BackupError::Integrity(format!("Payload is not a valid zstd stream: {}", e)))
}

/// Borrow an entry's stored bytes from a decompressed payload
pub fn entry_bytes<'a>(payload: &'a [u8], entry: &FileEntry) -> BackupResult<&'a [u8]> {
    let start = usize::try_from(entry.offset).ok();
    let end = start.and_then(|s| s.checked_add(usize::try_from(entry.length).ok()?));

    match (start, end) {
        (Some(start), Some(end)) if end <= payload.len() => Ok(&payload[start..end]),
        _ => Err(BackupError::Integrity(format!(
            "{} addresses bytes {}..+{} outside the {}-byte payload",
            entry.relative_path,
            entry.offset,
            entry.length,
            payload.len()
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;

    fn entry(offset: u64, length: u64) -> FileEntry {
        FileEntry {
            relative_path: "SOUL.md".into(),
            category: Category::Soul,
            content_hash: String::new(),
            size_bytes: length,
            encrypted: false,
            offset,
            length,
            mode: None,
        }
    }

    #[test]
    fn test_append_tracks_offsets() {
        let mut builder = PayloadBuilder::new();
        assert_eq!(builder.append(b"hello"), (0, 5));
        assert_eq!(builder.append(b""), (5, 0));
        assert_eq!(builder.append(b"world!"), (5, 6));
        assert_eq!(builder.len(), 11);
    }

    #[test]
    fn test_compress_then_slice() {
        let mut builder = PayloadBuilder::new();
        builder.append(b"first");
        let (offset, length) = builder.append(b"second");

        let compressed = builder.finish(3).unwrap();
        let payload = decompress(&compressed).unwrap();

        assert_eq!(entry_bytes(&payload, &entry(offset, length)).unwrap(), b"second");
    }

    #[test]
    fn test_out_of_range_entry() {
        let payload = b"short".to_vec();
        let result = entry_bytes(&payload, &entry(3, 10));
        assert!(matches!(result, Err(BackupError::Integrity(_))));
    }

    #[test]
    fn test_garbage_is_integrity_error() {
        assert!(matches!(
            decompress(b"definitely not zstd"),
            Err(BackupError::Integrity(_))
        ));
    }

    #[test]
    fn test_repetitive_payload_shrinks() {
        let mut builder = PayloadBuilder::new();
        builder.append(&vec![b'a'; 64 * 1024]);
        let compressed = builder.finish(3).unwrap();
        assert!(compressed.len() < 1024);
    }
}
