//! AES-256-GCM sealing of captured file bytes
//!
//! Sealed bytes are `nonce (12 bytes) || ciphertext || tag`. Each call
//! generates a fresh nonce.

use aes_gcm::{
    aead::{Aead, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use aes_gcm::aead::rand_core::RngCore;
use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};

use crate::error::{BackupError, BackupResult};

use super::key_derivation::{derive_key, generate_salt, DerivedKey, KdfParams};

/// Size of the AES-GCM nonce in bytes (96 bits)
pub const NONCE_SIZE: usize = 12;

/// Size of the GCM authentication tag
pub const TAG_SIZE: usize = 16;

const KDF_NAME: &str = "argon2id";
const CIPHER_NAME: &str = "aes-256-gcm";

/// Key material description stored in a manifest with encrypted entries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptionHeader {
    /// Key derivation function
    pub kdf: String,
    /// Cipher used for every encrypted entry
    pub cipher: String,
    /// Salt for key derivation (base64 encoded)
    pub salt: String,
    /// Argon2id cost parameters
    #[serde(flatten)]
    pub params: KdfParams,
}

impl EncryptionHeader {
    /// Create a header with a fresh random salt
    pub fn generate(params: KdfParams) -> Self {
        Self {
            kdf: KDF_NAME.to_string(),
            cipher: CIPHER_NAME.to_string(),
            salt: STANDARD.encode(generate_salt()),
            params,
        }
    }

    /// Derive the key described by this header from a passphrase
    pub fn derive(&self, passphrase: &str) -> BackupResult<DerivedKey> {
        if self.kdf != KDF_NAME || self.cipher != CIPHER_NAME {
            return Err(BackupError::Encryption(format!(
                "Unsupported encryption scheme: {} / {}",
                self.kdf, self.cipher
            )));
        }

        let salt = STANDARD
            .decode(&self.salt)
            .map_err(|e| BackupError::Encryption(format!("Invalid salt encoding: {}", e)))?;

        derive_key(passphrase, &salt, &self.params)
    }
}

/// Encrypt plaintext, returning `nonce || ciphertext`
pub fn seal(plaintext: &[u8], key: &DerivedKey) -> BackupResult<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| BackupError::Encryption(format!("Failed to create cipher: {}", e)))?;

    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|e| BackupError::Encryption(format!("Encryption failed: {}", e)))?;

    let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Decrypt bytes produced by [`seal`]
///
/// Authentication failure means the key is wrong (the payload checksum has
/// already ruled out tampering) and is reported as `EncryptionKey`.
pub fn open(sealed: &[u8], key: &DerivedKey) -> BackupResult<Vec<u8>> {
    if sealed.len() < NONCE_SIZE + TAG_SIZE {
        return Err(BackupError::Integrity(format!(
            "Sealed data too short: {} bytes",
            sealed.len()
        )));
    }

    let cipher = Aes256Gcm::new_from_slice(key.as_bytes())
        .map_err(|e| BackupError::Encryption(format!("Failed to create cipher: {}", e)))?;

    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
    let nonce = Nonce::from_slice(nonce_bytes);

    cipher.decrypt(nonce, ciphertext).map_err(|_| {
        BackupError::EncryptionKey("decryption failed: invalid key or corrupted data".to_string())
    })
}
