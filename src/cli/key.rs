//! Passphrase input for CLI commands
//!
//! Passphrases come from a hidden prompt or the `AUTOMATON_BACKUP_KEY`
//! environment variable, never from the command line itself.

use clap::Args;

use crate::crypto::SecureString;
use crate::error::{BackupError, BackupResult};

/// Environment variable holding the backup passphrase
pub const KEY_ENV: &str = "AUTOMATON_BACKUP_KEY";

/// Decryption key arguments shared by restore and import commands
#[derive(Args, Debug, Clone, Default)]
pub struct KeyArgs {
    /// Prompt for the passphrase of encrypted files
    #[arg(long)]
    pub key_prompt: bool,
}

impl KeyArgs {
    /// The decryption key, if one was offered
    pub fn decryption_key(&self) -> BackupResult<Option<SecureString>> {
        if self.key_prompt {
            return prompt_passphrase("Backup passphrase: ").map(Some);
        }
        Ok(key_from_env())
    }
}

/// The encryption key for a new backup: the environment, else a prompt
pub fn encryption_key() -> BackupResult<SecureString> {
    if let Some(key) = key_from_env() {
        return Ok(key);
    }

    let passphrase = prompt_passphrase("New backup passphrase: ")?;
    let confirm = prompt_passphrase("Confirm passphrase: ")?;
    if !passphrase.matches(&confirm) {
        return Err(BackupError::EncryptionKey("Passphrases do not match".into()));
    }
    Ok(passphrase)
}

fn key_from_env() -> Option<SecureString> {
    std::env::var(KEY_ENV)
        .ok()
        .filter(|key| !key.is_empty())
        .map(SecureString::from)
}

/// Prompt for a passphrase (hidden input)
fn prompt_passphrase(prompt: &str) -> BackupResult<SecureString> {
    let passphrase = rpassword::prompt_password(prompt)
        .map(SecureString::from)
        .map_err(|e| BackupError::Encryption(format!("Failed to read passphrase: {}", e)))?;

    if passphrase.is_blank() {
        return Err(BackupError::EncryptionKey("Passphrase cannot be empty".into()));
    }
    Ok(passphrase)
}
