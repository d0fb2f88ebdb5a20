mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "cipt", version, about = "CIPT database migrations and data fixes")]
struct Cli {
    /// Config file (cipt.yaml, cipt.yml or cipt.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database file; overrides SQLITE_STORAGE and the config file
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Log level filter when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Apply, revert or inspect schema migrations
    Migrate {
        #[command(subcommand)]
        action: MigrateAction,
    },
    /// Run a one-shot data correction against an existing database
    Fix {
        #[command(subcommand)]
        action: FixAction,
    },
    /// Print the normalized 11-digit phone number
    Phone { input: String },
}

#[derive(Subcommand, Debug)]
enum MigrateAction {
    /// Apply pending migrations
    Up {
        /// Stop after this migration id
        #[arg(long)]
        to: Option<String>,
    },
    /// Revert the most recently applied migration
    Down,
    /// List every migration with its applied state
    Status {
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand, Debug)]
enum FixAction {
    /// Rewrite DAR status 'Vencida' to 'Vencido'
    UnifyStatus {
        db_path: Option<PathBuf>,
        #[arg(long)]
        dry_run: bool,
    },
    /// Issue a last DAR for the unpaid balance of events paid during a year
    FinalInstallment {
        year: Option<i32>,
        db_path: Option<PathBuf>,
        #[arg(long)]
        dry_run: bool,
    },
}

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match cli.command {
        Commands::Phone { input } => {
            println!("{}", cipt_common::normalize_msisdn(Some(&input)));
            Ok(())
        }
        Commands::Migrate { action } => {
            let config = commands::load_config(cli.config, cli.db)?;
            match action {
                MigrateAction::Up { to } => commands::migrate_up(&config, to.as_deref()),
                MigrateAction::Down => commands::migrate_down(&config),
                MigrateAction::Status { json } => commands::migrate_status(&config, json),
            }
        }
        Commands::Fix { action } => {
            let config = commands::load_config(cli.config, None)?;
            match action {
                FixAction::UnifyStatus { db_path, dry_run } => {
                    let path = db_path.or(cli.db).unwrap_or_else(|| config.storage_path.clone());
                    commands::fix_unify_status(&config, path, dry_run)
                }
                FixAction::FinalInstallment {
                    year,
                    db_path,
                    dry_run,
                } => {
                    let path = db_path
                        .or(cli.db)
                        .unwrap_or_else(|| PathBuf::from(commands::FIX_DEFAULT_DB));
                    commands::fix_final_installment(&config, path, year, dry_run)
                }
            }
        }
    }
}
