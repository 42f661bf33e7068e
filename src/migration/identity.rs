//! Identity descriptor rewriting
//!
//! After state moves to a new instance, `automaton.json` must carry the new
//! owner's sandbox id. Only that field changes.

use std::fs;
use std::path::Path;

use tracing::info;

use crate::error::{BackupError, BackupResult};
use crate::models::IdentityDescriptor;
use crate::storage::file_io::{file_mode, write_json_atomic};

/// Replace `sandboxId` in the descriptor at `path`, keeping every other field
///
/// The descriptor must already exist; a missing one is an
/// `IdentityUpdate` error. Its unix permissions carry over to the rewrite.
pub fn rewrite_sandbox_id(path: &Path, new_sandbox_id: &str) -> BackupResult<()> {
    if new_sandbox_id.trim().is_empty() {
        return Err(BackupError::IdentityUpdate("New sandbox id must not be empty".into()));
    }

    let mut identity = IdentityDescriptor::load(path)
        .map_err(|e| BackupError::IdentityUpdate(e.to_string()))?;
    let previous = std::mem::replace(&mut identity.sandbox_id, new_sandbox_id.to_string());

    let mode = fs::metadata(path).ok().and_then(|metadata| file_mode(&metadata));

    write_json_atomic(path, &identity, mode)
        .map_err(|e| BackupError::IdentityUpdate(e.to_string()))?;

    info!(from = %previous, to = %new_sandbox_id, "identity rewritten");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_rewrite_keeps_other_fields() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("automaton.json");
        fs::write(
            &path,
            r#"{"sandboxId":"old","name":"alpha","creator":{"address":"0x1"}}"#,
        )
        .unwrap();

        rewrite_sandbox_id(&path, "new").unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["sandboxId"], "new");
        assert_eq!(value["name"], "alpha");
        assert_eq!(value["creator"]["address"], "0x1");
    }

    #[cfg(unix)]
    #[test]
    fn test_rewrite_preserves_permissions() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("automaton.json");
        fs::write(&path, r#"{"sandboxId":"old"}"#).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o640)).unwrap();

        rewrite_sandbox_id(&path, "new").unwrap();

        let mode = fs::metadata(&path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, 0o640);
    }

    #[test]
    fn test_missing_descriptor_is_identity_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("automaton.json");

        let result = rewrite_sandbox_id(&path, "new");

        assert!(matches!(result, Err(BackupError::IdentityUpdate(_))));
        assert!(!path.exists());
    }

    #[test]
    fn test_malformed_descriptor_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("automaton.json");
        fs::write(&path, "not json").unwrap();

        assert!(rewrite_sandbox_id(&path, "new").is_err());
        assert_eq!(fs::read_to_string(&path).unwrap(), "not json");
    }
}
