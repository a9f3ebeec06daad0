//! sysmwatch entry point.
//!
//! This file is intentionally thin: it loads `.env.local`, sets up tracing,
//! parses flags and dispatches. Wiring lives in `commands/`.

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use smw_config::NotifierKind;

#[derive(Parser)]
#[command(name = "sysmwatch")]
#[command(about = "Store/index consistency watcher", long_about = None)]
struct Cli {
    /// Layered config paths in merge order (base -> site -> local)
    #[arg(long = "config", global = true)]
    config_paths: Vec<PathBuf>,

    /// Starting watermark expression, e.g. "midnight UTC", "2 hours ago", "2024-01-01T00:00:00Z"
    #[arg(short = 'o', long, global = true)]
    oldest: Option<String>,

    /// pgpass-format file holding the store password
    #[arg(short = 'p', long, global = true)]
    pgpass: Option<PathBuf>,

    /// Store port
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Change notifier (timer | database | queue)
    #[arg(long, global = true)]
    notifier: Option<NotifierKind>,

    /// Timer poll interval in seconds
    #[arg(long, global = true)]
    interval_secs: Option<u64>,

    /// Row cap for one delta query
    #[arg(long, global = true)]
    max_rows: Option<i64>,

    /// Fail on unknown config keys instead of warning
    #[arg(long, global = true, default_value_t = false)]
    strict_config: bool,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the watcher until SIGINT/SIGTERM
    Watch,

    /// Run exactly one pass and print the report
    Check,

    /// Print Ticks from the configured notifier without reconciling
    Listen,

    /// Store connectivity + schema check
    Status,

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },
}

impl Cli {
    fn overrides(&self) -> commands::Overrides {
        commands::Overrides {
            oldest: self.oldest.clone(),
            pgpass: self.pgpass.clone(),
            port: self.port,
            notifier: self.notifier,
            interval_secs: self.interval_secs,
            max_rows: self.max_rows,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Silent if the file does not exist; production injects env vars directly.
    let _ = dotenvy::from_filename(".env.local");

    init_tracing();

    let cli = Cli::parse();

    match &cli.cmd {
        Commands::ConfigHash { paths } => {
            let loaded = smw_config::load_layered_yaml(paths.as_slice())?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }
        Commands::Watch => {
            let cfg = commands::load_config(&cli.config_paths, &cli.overrides(), cli.strict_config)?;
            commands::watch::watch(&cfg, cli.oldest.is_some()).await?;
        }
        Commands::Check => {
            let cfg = commands::load_config(&cli.config_paths, &cli.overrides(), cli.strict_config)?;
            commands::watch::check(&cfg, cli.oldest.is_some()).await?;
        }
        Commands::Listen => {
            let cfg = commands::load_config(&cli.config_paths, &cli.overrides(), cli.strict_config)?;
            commands::watch::listen(&cfg).await?;
        }
        Commands::Status => {
            let cfg = commands::load_config(&cli.config_paths, &cli.overrides(), cli.strict_config)?;
            let pool = commands::connect_store(&cfg).await?;
            let s = smw_db::status(&pool).await;
            pool.close().await;
            let s = s?;
            println!(
                "db_ok={} has_systemmetadata_table={}",
                s.ok, s.has_systemmetadata_table
            );
        }
    }

    Ok(())
}

/// Logs go to stderr; stdout carries reports only.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}
