//! Backup CLI commands
//!
//! Implements CLI commands for creating, inspecting, restoring and pruning
//! backups.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Subcommand;

use super::key::{encryption_key, KeyArgs};
use crate::backup::{BackupOptions, RestoreOptions};
use crate::error::{BackupError, BackupResult};
use crate::models::{BackupType, CategorySelection};
use crate::service::BackupService;

/// Backup subcommands
#[derive(Subcommand)]
pub enum BackupCommands {
    /// Create a new backup
    Create {
        /// Only capture files changed since the last backup
        #[arg(short, long)]
        incremental: bool,

        /// Encrypt secrets (passphrase from AUTOMATON_BACKUP_KEY or a prompt)
        #[arg(short, long)]
        encrypt: bool,

        /// Write into this backups root instead of the configured one
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Sandbox id to record (defaults to the current identity)
        #[arg(long, env = "AUTOMATON_SANDBOX_ID")]
        sandbox_id: Option<String>,
    },

    /// List backups of the current identity
    List {
        /// Show detailed information
        #[arg(short, long)]
        detailed: bool,
    },

    /// Verify a backup's checksum without restoring it
    Verify {
        /// Backup directory name or path (use 'latest' for most recent)
        backup: String,
    },

    /// Restore from a backup
    Restore {
        /// Backup directory name or path (use 'latest' for most recent)
        backup: String,

        /// Comma-separated categories to restore (default: all)
        #[arg(short, long)]
        categories: Option<CategorySelection>,

        /// Show what would be restored without writing anything
        #[arg(long)]
        dry_run: bool,

        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,

        #[command(flatten)]
        key: KeyArgs,
    },

    /// Show information about a specific backup
    Info {
        /// Backup directory name or path
        backup: String,
    },

    /// Delete the oldest backups beyond the retention count
    Prune {
        /// Number of backups to keep (default: retention setting)
        #[arg(short, long)]
        keep: Option<usize>,

        /// Skip confirmation prompt
        #[arg(short, long)]
        force: bool,
    },
}

/// Handle a backup command
pub fn handle_backup_command(service: &BackupService, cmd: BackupCommands) -> Result<()> {
    match cmd {
        BackupCommands::Create {
            incremental,
            encrypt,
            output,
            sandbox_id,
        } => {
            let sandbox_id = resolve_sandbox_id(service, sandbox_id)?;
            let options = BackupOptions {
                backup_type: if incremental {
                    BackupType::Incremental
                } else {
                    BackupType::Full
                },
                encryption_key: if encrypt { Some(encryption_key()?) } else { None },
                output_dir: output,
                encrypt_categories: Vec::new(),
            };

            println!("Creating backup...");
            let info = service.create_backup(&sandbox_id, &options)?;
            println!("Backup created: {}", info.name);
            println!("Type: {}", info.backup_type);
            println!("Files: {}", info.file_count);
            println!("Size: {}", format_size(info.size));
            println!("Location: {}", info.path.display());
        }

        BackupCommands::List { detailed } => {
            let backups = service.list_backups()?;

            if backups.is_empty() {
                println!("No backups found.");
                println!("Create one with: automaton-state backup create");
                return Ok(());
            }

            println!("Available Backups");
            println!("=================");
            println!();

            for (i, backup) in backups.iter().enumerate() {
                let age = chrono::Utc::now().signed_duration_since(backup.created_at);
                let age_str = format_duration(age);

                if detailed {
                    println!(
                        "{}. {} [{}]\n   Sandbox: {}\n   Created: {}\n   Files: {}\n   Size: {}\n   Age: {}\n",
                        i + 1,
                        backup.name,
                        backup.backup_type,
                        backup.sandbox_id,
                        backup.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
                        backup.file_count,
                        format_size(backup.size),
                        age_str,
                    );
                } else {
                    println!(
                        "  {}. {} [{}] ({} ago, {} files, {})",
                        i + 1,
                        backup.name,
                        backup.backup_type,
                        age_str,
                        backup.file_count,
                        format_size(backup.size),
                    );
                }
            }

            println!();
            println!("Total: {} backup(s)", backups.len());
        }

        BackupCommands::Verify { backup } => {
            let backup_path = resolve_backup_path(service, &backup)?;
            let report = service.verify_backup_integrity(&backup_path);

            println!("Backup: {}", backup_path.display());
            println!("Status: {}", report.summary());
            for error in &report.errors {
                println!("  - {}", error);
            }

            if !report.valid {
                bail!("backup failed verification");
            }
        }

        BackupCommands::Restore {
            backup,
            categories,
            dry_run,
            force,
            key,
        } => {
            let backup_path = resolve_backup_path(service, &backup)?;
            let manifest = service.load_manifest(&backup_path)?;

            println!("Backup Information");
            println!("==================");
            println!("Backup: {}", backup_path.display());
            println!("Sandbox: {}", manifest.sandbox_id);
            println!(
                "Created: {}",
                manifest.created_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            println!("Type: {}", manifest.backup_type);
            println!("Files: {}", manifest.files.len());
            println!();

            if !force && !dry_run {
                println!("WARNING: This will overwrite the captured files in the state directory!");
                println!("To preview, run again with --dry-run. To proceed, add --force:");
                println!("  automaton-state backup restore {} --force", backup);
                return Ok(());
            }

            let options = RestoreOptions {
                categories: categories.unwrap_or_default(),
                dry_run,
                decryption_key: key.decryption_key()?,
            };
            let result = service.restore_backup(&backup_path, &options)?;

            let verb = if dry_run { "Would restore" } else { "Restored" };
            for path in &result.restored_files {
                println!("  {}: {}", verb, path);
            }
            for error in &result.errors {
                println!("  Error: {}", error);
            }
            println!();
            println!("{}", result.summary());

            if !result.is_success() {
                bail!("{} file(s) could not be restored", result.errors.len());
            }
        }

        BackupCommands::Info { backup } => {
            let backup_path = resolve_backup_path(service, &backup)?;
            let manifest = service.load_manifest(&backup_path)?;

            println!("Backup Details");
            println!("==============");
            println!("Backup: {}", backup_path.display());
            println!("Sandbox: {}", manifest.sandbox_id);
            println!(
                "Created: {}",
                manifest.created_at.format("%Y-%m-%d %H:%M:%S UTC")
            );
            println!("Type: {}", manifest.backup_type);
            if let Some(base) = &manifest.base_manifest_ref {
                println!("Based on: {}", base);
            }
            println!(
                "Encrypted: {}",
                if manifest.encryption.is_some() { "Yes" } else { "No" }
            );
            println!("Payload: {}", format_size(manifest.payload_size));
            println!();
            println!("Contents ({} files, {}):", manifest.files.len(), format_size(manifest.total_size()));
            for entry in &manifest.files {
                println!(
                    "  {:<10} {:>10}  {}{}",
                    entry.category.as_str(),
                    format_size(entry.size_bytes),
                    entry.relative_path,
                    if entry.encrypted { " (encrypted)" } else { "" }
                );
            }
        }

        BackupCommands::Prune { keep, force } => {
            let keep = keep.unwrap_or(service.settings().retention.keep_count);
            let root = service.paths().backups_dir();
            let total = crate::backup::list_backups_in(root, None)?.len();
            let to_delete = total.saturating_sub(keep);

            if to_delete == 0 {
                println!("No backups to prune.");
                println!("Keeping {} backup(s); you have {}.", keep, total);
                return Ok(());
            }

            println!("Prune Summary");
            println!("=============");
            println!("Keep: {}", keep);
            println!("Current backups: {}", total);
            println!("To be deleted: {}", to_delete);
            println!();

            if !force {
                println!("To delete old backups, run again with --force flag:");
                println!("  automaton-state backup prune --keep {} --force", keep);
                return Ok(());
            }

            let deleted = service.prune_backups(root, keep)?;
            println!("Deleted {} backup(s).", deleted);
        }
    }

    Ok(())
}

/// The sandbox id to record: explicit, else the current identity
pub(crate) fn resolve_sandbox_id(
    service: &BackupService,
    explicit: Option<String>,
) -> BackupResult<String> {
    match explicit {
        Some(id) => Ok(id),
        None => service.paths().current_sandbox_id()?.ok_or_else(|| {
            BackupError::Config(format!(
                "No identity found at {}; pass --sandbox-id",
                service.paths().identity_file().display()
            ))
        }),
    }
}

/// Resolve a backup identifier to a full path
pub(crate) fn resolve_backup_path(service: &BackupService, backup: &str) -> BackupResult<PathBuf> {
    // Handle "latest" keyword
    if backup.eq_ignore_ascii_case("latest") {
        return service.latest_backup().map(|b| b.path);
    }

    // Check if it's a full path
    let path = PathBuf::from(backup);
    if path.is_dir() {
        return Ok(path);
    }

    // Check if it's a directory name in the backups root
    let backup_path = service.paths().backups_dir().join(backup);
    if backup_path.is_dir() {
        return Ok(backup_path);
    }

    Err(BackupError::backup_not_found(backup))
}

/// Format a duration in human-readable form
fn format_duration(duration: chrono::Duration) -> String {
    let total_seconds = duration.num_seconds().max(0);

    if total_seconds < 60 {
        return format!("{}s", total_seconds);
    }

    let minutes = total_seconds / 60;
    if minutes < 60 {
        return format!("{}m", minutes);
    }

    let hours = minutes / 60;
    if hours < 24 {
        return format!("{}h", hours);
    }

    let days = hours / 24;
    if days < 30 {
        return format!("{}d", days);
    }

    let months = days / 30;
    format!("{}mo", months)
}

/// Format a file size in human-readable form
pub(crate) fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.1} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
