//! Command-line behaviour of the `automaton-state` binary

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn home() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    fs::write(root.join("automaton.json"), r#"{"sandboxId":"sbx-cli"}"#).unwrap();
    fs::write(root.join("wallet.json"), r#"{"privateKey":"0x1"}"#).unwrap();
    fs::write(root.join("SOUL.md"), "# Soul\n").unwrap();
    fs::write(
        root.join("backup-settings.json"),
        r#"{"kdf":{"memory_cost":8192,"time_cost":1,"parallelism":1}}"#,
    )
    .unwrap();
    temp_dir
}

fn cmd(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("automaton-state").unwrap();
    cmd.env("AUTOMATON_HOME", home)
        .env_remove("AUTOMATON_BACKUP_DIR")
        .env_remove("AUTOMATON_BACKUP_KEY")
        .env_remove("AUTOMATON_SANDBOX_ID")
        .env_remove("AUTOMATON_LOG")
        .env_remove("RUST_LOG");
    cmd
}

#[test]
fn config_shows_paths() {
    let home = home();
    cmd(home.path())
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("sbx-cli"))
        .stdout(predicate::str::contains("keep 10"));
}

#[test]
fn list_without_backups() {
    let home = home();
    cmd(home.path())
        .args(["backup", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No backups found."));
}

#[test]
fn create_list_verify_latest() {
    let home = home();
    cmd(home.path())
        .args(["backup", "create"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Backup created: backup-"))
        .stdout(predicate::str::contains("Files: 3"));

    cmd(home.path())
        .args(["backup", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Total: 1 backup(s)"));

    cmd(home.path())
        .args(["backup", "verify", "latest"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Backup is valid"));
}

#[test]
fn encrypted_create_reads_key_from_env() {
    let home = home();
    cmd(home.path())
        .env("AUTOMATON_BACKUP_KEY", "hunter2")
        .args(["backup", "create", "--encrypt"])
        .assert()
        .success();

    cmd(home.path())
        .args(["backup", "info", "latest"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Encrypted: Yes"))
        .stdout(predicate::str::contains("wallet.json (encrypted)"));
}

#[test]
fn restore_requires_force_unless_dry_run() {
    let home = home();
    cmd(home.path()).args(["backup", "create"]).assert().success();
    fs::remove_file(home.path().join("SOUL.md")).unwrap();

    cmd(home.path())
        .args(["backup", "restore", "latest"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--force"));
    assert!(!home.path().join("SOUL.md").exists());

    cmd(home.path())
        .args(["backup", "restore", "latest", "--dry-run"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Would restore: SOUL.md"));
    assert!(!home.path().join("SOUL.md").exists());

    cmd(home.path())
        .args(["backup", "restore", "latest", "--categories", "soul", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Restored 1 file(s), skipped 2"));
    assert!(home.path().join("SOUL.md").exists());
}

#[test]
fn restore_rejects_unknown_category() {
    let home = home();
    cmd(home.path())
        .args(["backup", "restore", "latest", "--categories", "photos"])
        .assert()
        .failure();
}

#[test]
fn verify_fails_for_tampered_backup() {
    let home = home();
    cmd(home.path()).args(["backup", "create"]).assert().success();

    let backup = fs::read_dir(home.path().join("backups"))
        .unwrap()
        .next()
        .unwrap()
        .unwrap()
        .path();
    fs::write(backup.join("payload.zst"), b"tampered").unwrap();

    cmd(home.path())
        .args(["backup", "verify"])
        .arg(&backup)
        .assert()
        .failure()
        .stdout(predicate::str::contains("Checksum mismatch"));
}

#[test]
fn prune_deletes_only_with_force() {
    let home = home();
    for _ in 0..3 {
        cmd(home.path()).args(["backup", "create"]).assert().success();
    }

    cmd(home.path())
        .args(["backup", "prune", "--keep", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("To be deleted: 2"));

    cmd(home.path())
        .args(["backup", "prune", "--keep", "1", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted 2 backup(s)."));

    cmd(home.path())
        .args(["backup", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Total: 1 backup(s)"));
}

#[test]
fn bundle_moves_state_to_new_instance() {
    let source = home();
    let target = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let bundle = out.path().join("state.bundle");

    cmd(source.path())
        .env("AUTOMATON_BACKUP_KEY", "hunter2")
        .args(["bundle", "export", "--encrypt"])
        .arg(&bundle)
        .assert()
        .success()
        .stdout(predicate::str::contains("Files: 3"));

    cmd(target.path())
        .env("AUTOMATON_BACKUP_KEY", "hunter2")
        .args(["bundle", "import", "--sandbox-id", "sbx-new"])
        .arg(&bundle)
        .assert()
        .success()
        .stdout(predicate::str::contains("Migration succeeded"));

    assert_eq!(
        fs::read_to_string(target.path().join("wallet.json")).unwrap(),
        r#"{"privateKey":"0x1"}"#
    );
    cmd(target.path())
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("sbx-new"));
}

#[test]
fn bundle_import_without_key_fails() {
    let source = home();
    let target = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    let bundle = out.path().join("state.bundle");

    cmd(source.path())
        .env("AUTOMATON_BACKUP_KEY", "hunter2")
        .args(["bundle", "export", "--encrypt"])
        .arg(&bundle)
        .assert()
        .success();

    cmd(target.path())
        .args(["bundle", "import", "--sandbox-id", "sbx-new"])
        .arg(&bundle)
        .assert()
        .failure()
        .stdout(predicate::str::contains("without key"));
}

#[test]
fn migrate_export_import_verify() {
    let source = home();
    let target = TempDir::new().unwrap();

    cmd(source.path())
        .args(["migrate", "export"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Migration export created for sbx-cli"));

    let backup = fs::read_dir(source.path().join("backups"))
        .unwrap()
        .next()
        .unwrap()
        .unwrap()
        .path();

    cmd(target.path())
        .args(["migrate", "import", "--sandbox-id", "sbx-dst"])
        .arg(&backup)
        .assert()
        .success();

    cmd(target.path())
        .args(["migrate", "verify"])
        .arg(&backup)
        .assert()
        .success()
        .stdout(predicate::str::contains("Migration is complete."));
}
