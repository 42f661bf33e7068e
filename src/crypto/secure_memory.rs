//! Passphrase storage that is wiped on drop
//!
//! Backup passphrases travel from the prompt or environment through the
//! creator and restore engine as [`SecureString`]; the buffer is zeroed when
//! the last owner lets go of it.

use std::fmt;
use std::ops::Deref;

use zeroize::Zeroize;

/// A passphrase whose bytes are zeroed on drop and never printed
pub struct SecureString {
    inner: String,
}

impl SecureString {
    pub fn new(s: impl Into<String>) -> Self {
        Self { inner: s.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// True for an empty or whitespace-only passphrase
    pub fn is_blank(&self) -> bool {
        self.inner.trim().is_empty()
    }

    /// Compare two passphrases without short-circuiting on the first
    /// differing byte
    pub fn matches(&self, other: &SecureString) -> bool {
        let (a, b) = (self.inner.as_bytes(), other.inner.as_bytes());
        if a.len() != b.len() {
            return false;
        }
        a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
    }
}

impl Clone for SecureString {
    fn clone(&self) -> Self {
        Self::new(self.inner.as_str())
    }
}

impl Drop for SecureString {
    fn drop(&mut self) {
        self.inner.zeroize();
    }
}

impl Deref for SecureString {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl From<String> for SecureString {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&str> for SecureString {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl fmt::Debug for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SecureString(***)")
    }
}

impl fmt::Display for SecureString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}
