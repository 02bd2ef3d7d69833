//! Unified trojan-stat CLI.
//!
//! - `trojan-stat stat` - Manage users of a SQLite store
//! - `trojan-stat check` - Validate a config file and open a backend with it
//!
//! The `stat` subcommand can also be run as the standalone
//! `trojan-statistic` binary.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use trojan_config::Context;
use trojan_stat::registries;

/// Trojan-stat unified CLI.
#[derive(Parser)]
#[command(
    name = "trojan-stat",
    version,
    about = "Accounting and access control for trojan relays",
    propagate_version = true
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage users, limits and counters.
    #[command(name = "stat", alias = "user")]
    Stat(trojan_statistic::cli::StatArgs),

    /// Bind a config file and open the selected backend.
    Check {
        /// Config file (json, jsonc, yaml, yml, toml).
        config: PathBuf,

        /// Backend to open with the config.
        #[arg(short, long, default_value = "memory")]
        backend: String,
    },
}

async fn check(path: PathBuf, backend: String) -> Result<(), Box<dyn std::error::Error>> {
    let (config, auth) = registries();
    let ctx = config.load_file(&Context::new(), &path)?;

    let authenticator = auth.create(&ctx, &backend).await?;
    let users = authenticator.list_users().await?;
    let caps = authenticator.capabilities();
    authenticator.close().await?;
    ctx.cancel();

    println!("Config OK: {}", path.display());
    println!("  Backend: {backend}");
    println!("  Users: {}", users.len());
    println!(
        "  Enforces: traffic={} speed_limit={} ip_limit={}",
        caps.traffic, caps.speed_limit, caps.ip_limit
    );
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Stat(args) => trojan_statistic::cli::run(args).await,
        Commands::Check { config, backend } => check(config, backend).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
