use anyhow::{Context, Result as AnyhowResult};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use webpad::config::StorageConfig;
use webpad::services::confirm::{ConfirmReply, NoPrompt, ScriptedPrompt, SharedConfirmPrompt};
use webpad::services::report::Reporter;
use webpad::services::storage::{FileKvStore, StorageManager};
use webpad::services::time_source::RealTimeSource;
use webpad::services::tracing_setup;

/// Inspect and maintain a code pad's persisted storage
#[derive(Parser, Debug)]
#[command(name = "webpad-storage")]
#[command(about = "Inspect and clean up persisted code pad storage", long_about = None)]
#[command(version)]
struct Args {
    /// Key/value store file (default: <data dir>/webpad/storage.json)
    #[arg(long, value_name = "PATH")]
    store: Option<PathBuf>,

    /// Path to a storage configuration file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Path to log file for diagnostics (default: system temp dir)
    #[arg(long, value_name = "PATH")]
    log_file: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a usage report with every snapshot collection
    Info,
    /// Classify usage against the capacity ceiling
    Health,
    /// List snapshot collections as JSON
    Configs,
    /// Keep only the newest snapshots of one configuration
    CleanupOld {
        #[arg(value_name = "CONFIG")]
        config: String,
    },
    /// Delete the snapshots of every configuration except one
    CleanupOthers {
        #[arg(value_name = "CONFIG")]
        config: String,
    },
    /// Delete all snapshots, saved files and the autosave
    CleanupAll {
        /// Confirm the deletion
        #[arg(long)]
        yes: bool,
    },
    /// Print the effective configuration as JSON
    DumpConfig,
}

/// Prints terminal messages to stdout/stderr
struct ConsoleReporter;

impl Reporter for ConsoleReporter {
    fn append_terminal(&self, message: &str, tag: &str) {
        match tag {
            "error" | "warning" => eprintln!("{}: {}", tag, message),
            _ => println!("{}", message),
        }
    }

    fn append_terminal_debug(&self, message: &str) {
        tracing::debug!("{}", message);
    }
}

fn default_store_path() -> AnyhowResult<PathBuf> {
    let data_dir = dirs::data_dir().context("Could not determine the user data directory")?;
    Ok(data_dir.join("webpad").join("storage.json"))
}

fn main() -> AnyhowResult<()> {
    let args = Args::parse();

    let log_file = args
        .log_file
        .clone()
        .unwrap_or_else(|| std::env::temp_dir().join("webpad-storage.log"));
    if !tracing_setup::init_global(&log_file) {
        eprintln!("Warning: logging to {} is disabled", log_file.display());
    }

    let config = match &args.config {
        Some(path) => StorageConfig::load_from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => StorageConfig::default(),
    };

    if let Command::DumpConfig = args.command {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    let store_path = match &args.store {
        Some(path) => path.clone(),
        None => default_store_path()?,
    };
    if let Some(parent) = store_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    tracing::info!("opening store {}", store_path.display());
    let store = FileKvStore::open(&store_path, Some(config.capacity_bytes))
        .with_context(|| format!("Failed to open store {}", store_path.display()))?;

    let prompt: SharedConfirmPrompt = match args.command {
        Command::CleanupAll { yes: true } => Arc::new(ScriptedPrompt::always(ConfirmReply::Bool(true))),
        _ => Arc::new(NoPrompt),
    };
    let manager = StorageManager::new(
        Arc::new(store),
        config,
        prompt,
        Arc::new(ConsoleReporter),
        RealTimeSource::shared(),
    );

    match args.command {
        Command::Info => {
            manager.show_storage_info()?;
        }
        Command::Health => {
            let health = manager.check_storage_health()?;
            println!("{}", serde_json::to_string_pretty(&health)?);
        }
        Command::Configs => {
            let configs = manager.get_all_snapshot_configs()?;
            println!("{}", serde_json::to_string_pretty(&configs)?);
        }
        Command::CleanupOld { config } => {
            let key = manager.config().layout.snapshot_key(&config);
            let removed = manager.cleanup_old_snapshots(&key)?;
            println!("Removed {} old snapshot(s) of '{}'", removed, config);
        }
        Command::CleanupOthers { config } => {
            let key = manager.config().layout.snapshot_key(&config);
            let removed = manager.cleanup_other_configs(&key)?;
            println!("Removed {} other snapshot collection(s)", removed);
        }
        Command::CleanupAll { yes } => {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .context("Failed to start async runtime")?;
            let deleted = runtime.block_on(manager.cleanup_all_storage_data())?;
            if !deleted {
                if !yes {
                    eprintln!("Nothing deleted; pass --yes to confirm");
                }
                std::process::exit(1);
            }
        }
        Command::DumpConfig => {}
    }

    Ok(())
}
