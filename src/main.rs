use anyhow::Result;
use clap::{Parser, Subcommand};

use automaton_state::cli::{
    handle_backup_command, handle_bundle_command, handle_migrate_command, BackupCommands,
    BundleCommands, MigrateCommands,
};
use automaton_state::{logging, BackupService, BackupSettings, InstancePaths};

#[derive(Parser)]
#[command(
    name = "automaton-state",
    author = "Kaylee Beyene",
    version,
    about = "Backup, restore and migrate an automaton's durable state",
    long_about = "automaton-state captures an autonomous instance's identity, credentials, \
                  memory and skills into incremental, tamper-evident backups, restores them \
                  selectively, and moves them to a new instance as a directory or a \
                  single portable bundle."
)]
struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Backup management commands
    #[command(subcommand)]
    Backup(BackupCommands),

    /// Move state to another instance
    #[command(subcommand)]
    Migrate(MigrateCommands),

    /// Single-file portable bundles
    #[command(subcommand)]
    Bundle(BundleCommands),

    /// Show current configuration and paths
    Config,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    // Initialize paths and settings
    let paths = InstancePaths::new()?;
    let settings = BackupSettings::load_or_default(&paths)?;
    let service = BackupService::new(paths, settings);

    match cli.command {
        Some(Commands::Backup(cmd)) => handle_backup_command(&service, cmd)?,
        Some(Commands::Migrate(cmd)) => handle_migrate_command(&service, cmd)?,
        Some(Commands::Bundle(cmd)) => handle_bundle_command(&service, cmd)?,
        Some(Commands::Config) => {
            let paths = service.paths();
            let settings = service.settings();

            println!("automaton-state Configuration");
            println!("=============================");
            println!("State directory:  {}", paths.state_root().display());
            println!("Backup directory: {}", paths.backups_dir().display());
            println!("Settings file:    {}", paths.settings_file().display());
            match paths.current_sandbox_id() {
                Ok(Some(id)) => println!("Sandbox id:       {}", id),
                Ok(None) => println!("Sandbox id:       (no identity yet)"),
                Err(e) => println!("Sandbox id:       unreadable ({})", e),
            }
            println!();
            println!("Settings:");
            println!("  Retention:          keep {}", settings.retention.keep_count);
            println!("  Compression level:  {}", settings.compression_level);
            let extra: Vec<_> = settings.encrypt_categories.iter().map(|c| c.as_str()).collect();
            println!(
                "  Encrypted:          secrets{}",
                if extra.is_empty() {
                    String::new()
                } else {
                    format!(", {}", extra.join(", "))
                }
            );
            println!(
                "  Key derivation:     argon2id (m={} KiB, t={}, p={})",
                settings.kdf.memory_cost, settings.kdf.time_cost, settings.kdf.parallelism
            );
        }
        None => {
            println!("automaton-state - durable-state backup and migration");
            println!();
            println!("Run 'automaton-state --help' for usage information.");
        }
    }

    Ok(())
}
