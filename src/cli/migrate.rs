//! Migration and bundle CLI commands
//!
//! Moves state between instances, either as a backup directory or as a
//! single portable bundle file.

use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::Subcommand;

use super::backup::{format_size, resolve_backup_path, resolve_sandbox_id};
use super::key::{encryption_key, KeyArgs};
use crate::migration::{ImportRequest, MigrationResult};
use crate::service::BackupService;

/// Migration subcommands
#[derive(Subcommand)]
pub enum MigrateCommands {
    /// Export a full backup for another instance
    Export {
        /// Backups root to write into (default: configured one)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Encrypt secrets (passphrase from AUTOMATON_BACKUP_KEY or a prompt)
        #[arg(short, long)]
        encrypt: bool,

        /// Source sandbox id (defaults to the current identity)
        #[arg(long, env = "AUTOMATON_SANDBOX_ID")]
        sandbox_id: Option<String>,
    },

    /// Import a migration backup under a new identity
    Import {
        /// Backup directory name or path
        backup: String,

        /// Sandbox id of this instance
        #[arg(long)]
        sandbox_id: String,

        #[command(flatten)]
        key: KeyArgs,
    },

    /// Check that every file of a backup exists locally
    Verify {
        /// Backup directory name or path
        backup: String,
    },
}

/// Portable bundle subcommands
#[derive(Subcommand)]
pub enum BundleCommands {
    /// Write the durable state to one bundle file
    Export {
        /// Bundle file to write
        file: PathBuf,

        /// Encrypt secrets (passphrase from AUTOMATON_BACKUP_KEY or a prompt)
        #[arg(short, long)]
        encrypt: bool,

        /// Source sandbox id (defaults to the current identity)
        #[arg(long, env = "AUTOMATON_SANDBOX_ID")]
        sandbox_id: Option<String>,
    },

    /// Import a bundle file under a new identity
    Import {
        /// Bundle file to read
        file: PathBuf,

        /// Sandbox id of this instance
        #[arg(long)]
        sandbox_id: String,

        #[command(flatten)]
        key: KeyArgs,
    },
}

/// Handle a migrate command
pub fn handle_migrate_command(service: &BackupService, cmd: MigrateCommands) -> Result<()> {
    match cmd {
        MigrateCommands::Export {
            output,
            encrypt,
            sandbox_id,
        } => {
            let sandbox_id = resolve_sandbox_id(service, sandbox_id)?;
            let key = if encrypt { Some(encryption_key()?) } else { None };

            let export = service.export_for_migration(&sandbox_id, key, output)?;
            println!("Migration export created for {}", export.source_sandbox_id);
            println!("Files: {}", export.backup.file_count);
            println!("Size: {}", format_size(export.backup.size));
            println!("Location: {}", export.backup.path.display());
        }

        MigrateCommands::Import {
            backup,
            sandbox_id,
            key,
        } => {
            let backup_path = resolve_backup_path(service, &backup)?;
            let request = ImportRequest {
                backup_path,
                new_sandbox_id: sandbox_id,
                decryption_key: key.decryption_key()?,
            };
            report_import(&service.import_migration(&request))?;
        }

        MigrateCommands::Verify { backup } => {
            let backup_path = resolve_backup_path(service, &backup)?;
            let verification = service.verify_migration(&backup_path)?;

            println!("Present: {} file(s)", verification.present_files.len());
            for path in &verification.missing_files {
                println!("  Missing: {}", path);
            }

            if !verification.complete {
                bail!("{} file(s) missing", verification.missing_files.len());
            }
            println!("Migration is complete.");
        }
    }

    Ok(())
}

/// Handle a bundle command
pub fn handle_bundle_command(service: &BackupService, cmd: BundleCommands) -> Result<()> {
    match cmd {
        BundleCommands::Export {
            file,
            encrypt,
            sandbox_id,
        } => {
            let sandbox_id = resolve_sandbox_id(service, sandbox_id)?;
            let key = if encrypt { Some(encryption_key()?) } else { None };

            let export = service.export_portable(&sandbox_id, &file, key)?;
            println!("Bundle written: {}", export.file_path.display());
            println!("Sandbox: {}", export.sandbox_id);
            println!("Files: {}", export.file_count);
            println!("Size: {}", format_size(export.size_bytes));
        }

        BundleCommands::Import {
            file,
            sandbox_id,
            key,
        } => {
            let result = service.import_portable(&file, &sandbox_id, key.decryption_key()?);
            report_import(&result)?;
        }
    }

    Ok(())
}

fn report_import(result: &MigrationResult) -> Result<()> {
    if let Some(source) = &result.source_sandbox_id {
        println!("Source: {}", source);
    }
    println!("Target: {}", result.target_sandbox_id);
    for error in &result.errors {
        println!("  Error: {}", error);
    }
    println!("{}", result.summary());

    if !result.success {
        bail!("migration import failed");
    }
    Ok(())
}
