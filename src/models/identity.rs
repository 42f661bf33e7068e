//! Identity descriptor (`automaton.json`)
//!
//! Only `sandboxId` is interpreted here; every other field is carried
//! through untouched.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BackupError, BackupResult};

/// The instance descriptor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IdentityDescriptor {
    #[serde(rename = "sandboxId")]
    pub sandbox_id: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl IdentityDescriptor {
    /// Load a descriptor, failing if `sandboxId` is missing
    pub fn load(path: &Path) -> BackupResult<Self> {
        let contents = fs::read_to_string(path).map_err(|e| {
            BackupError::Io(format!("Failed to read {}: {}", path.display(), e))
        })?;

        serde_json::from_str(&contents).map_err(|e| {
            BackupError::Json(format!("Failed to parse {}: {}", path.display(), e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_unknown_fields_preserved() {
        let json = r#"{"sandboxId":"sbx-1","name":"alpha","wallet":{"address":"0x1"}}"#;
        let identity: IdentityDescriptor = serde_json::from_str(json).unwrap();

        assert_eq!(identity.sandbox_id, "sbx-1");
        assert_eq!(identity.extra["name"], "alpha");

        let round_trip = serde_json::to_value(&identity).unwrap();
        assert_eq!(round_trip["wallet"]["address"], "0x1");
    }

    #[test]
    fn test_missing_sandbox_id() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("automaton.json");
        fs::write(&path, r#"{"name":"alpha"}"#).unwrap();

        assert!(matches!(
            IdentityDescriptor::load(&path),
            Err(BackupError::Json(_))
        ));
    }
}
