//! CLI module for trojan-statistic.
//!
//! Manages users of a SQLite store directly. A running relay picks the
//! changes up on its next sync. It can be used either as a standalone binary
//! or as a subcommand of the `trojan-stat` CLI.
//!
//! # Usage
//!
//! ```bash
//! # Add a user with a 10 MB/s upload cap and at most 2 client IPs
//! trojan-statistic user add -d users.db -p mypassword --send-limit 10MB --max-ip 2
//!
//! # List all users
//! trojan-statistic user list -d users.db
//!
//! # Change limits
//! trojan-statistic user limit -d users.db --hash <hash> --recv-limit 0
//!
//! # Remove a user
//! trojan-statistic user remove -d users.db -p mypassword
//! ```

use std::io;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tabled::{Table, Tabled};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};
use trojan_config::defaults;

use crate::error::AuthError;
use crate::registry::AuthRegistry;
use crate::sha224_hex;
use crate::sqlite::{SqliteConfig, SqliteStore};
use crate::store::{UserRecord, UserStore};

type CliResult = Result<(), Box<dyn std::error::Error>>;

/// Trojan statistics management CLI arguments.
#[derive(Parser, Debug, Clone)]
#[command(
    name = "trojan-statistic",
    version,
    about = "Manage trojan users, limits and traffic counters"
)]
pub struct StatArgs {
    /// Log filter (overridden by RUST_LOG).
    #[arg(long, global = true, default_value = "warn")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: StatCommands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum StatCommands {
    /// Manage users in a SQLite database.
    User(UserArgs),

    /// Show the identity hash of a password.
    Hash {
        /// Password to hash.
        password: String,
    },

    /// List the authenticator backends compiled into this build.
    Backends,
}

#[derive(Args, Debug, Clone)]
pub struct UserArgs {
    #[command(subcommand)]
    pub command: UserCommands,
}

/// User subcommands.
#[derive(Subcommand, Debug, Clone)]
pub enum UserCommands {
    /// Add a new user.
    Add {
        /// SQLite database path.
        #[arg(short, long, env = "TROJAN_STAT_DB", default_value = defaults::DEFAULT_SQLITE_DATABASE)]
        database: String,

        /// Identity hash.
        #[arg(long, group = "target")]
        hash: Option<String>,

        /// Password (will be hashed).
        #[arg(short, long, group = "target")]
        password: Option<String>,

        /// Upload speed limit per second (e.g. "10MB", "0" for unlimited).
        #[arg(long, default_value = "0")]
        send_limit: String,

        /// Download speed limit per second.
        #[arg(long, default_value = "0")]
        recv_limit: String,

        /// Maximum concurrent client IPs (0 for unlimited).
        #[arg(long, default_value_t = 0)]
        max_ip: usize,
    },

    /// Remove a user.
    Remove {
        /// SQLite database path.
        #[arg(short, long, env = "TROJAN_STAT_DB", default_value = defaults::DEFAULT_SQLITE_DATABASE)]
        database: String,

        /// Identity hash to remove.
        #[arg(long, group = "target")]
        hash: Option<String>,

        /// Password to remove (will be hashed).
        #[arg(short, long, group = "target")]
        password: Option<String>,
    },

    /// List all users.
    List {
        /// SQLite database path.
        #[arg(short, long, env = "TROJAN_STAT_DB", default_value = defaults::DEFAULT_SQLITE_DATABASE)]
        database: String,

        /// Output format (table, json).
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Change a user's limits.
    Limit {
        /// SQLite database path.
        #[arg(short, long, env = "TROJAN_STAT_DB", default_value = defaults::DEFAULT_SQLITE_DATABASE)]
        database: String,

        /// Identity hash.
        #[arg(long)]
        hash: String,

        /// New upload speed limit per second.
        #[arg(long)]
        send_limit: Option<String>,

        /// New download speed limit per second.
        #[arg(long)]
        recv_limit: Option<String>,

        /// New maximum concurrent client IPs.
        #[arg(long)]
        max_ip: Option<usize>,
    },
}

/// User row for display.
#[derive(Tabled, Serialize)]
struct UserDisplay {
    #[tabled(rename = "Hash")]
    hash: String,
    #[tabled(rename = "Sent")]
    sent: String,
    #[tabled(rename = "Received")]
    recv: String,
    #[tabled(rename = "Send Limit")]
    send_limit: String,
    #[tabled(rename = "Recv Limit")]
    recv_limit: String,
    #[tabled(rename = "Max IPs")]
    max_ip: String,
}

impl From<&UserRecord> for UserDisplay {
    fn from(record: &UserRecord) -> Self {
        Self {
            hash: record.hash.clone(),
            sent: format_bytes(record.sent),
            recv: format_bytes(record.recv),
            send_limit: format_rate(record.send_limit),
            recv_limit: format_rate(record.recv_limit),
            max_ip: if record.max_ip_num == 0 {
                "Unlimited".to_string()
            } else {
                record.max_ip_num.to_string()
            },
        }
    }
}

/// Run the statistics CLI with the given arguments.
///
/// This is the main entry point for the CLI, used by both the standalone
/// binary and the unified `trojan-stat` CLI.
pub async fn run(args: StatArgs) -> CliResult {
    init_tracing(&args.log_level);

    match args.command {
        StatCommands::User(user) => run_user(user.command).await,
        StatCommands::Hash { password } => {
            println!("{}", sha224_hex(&password));
            Ok(())
        }
        StatCommands::Backends => {
            for name in AuthRegistry::with_builtin().names() {
                println!("{name}");
            }
            Ok(())
        }
    }
}

async fn run_user(command: UserCommands) -> CliResult {
    match command {
        UserCommands::Add {
            database,
            hash,
            password,
            send_limit,
            recv_limit,
            max_ip,
        } => {
            let hash = identity(hash, password)?;
            let record = UserRecord::new(hash).with_limits(
                parse_size(&send_limit)?,
                parse_size(&recv_limit)?,
                max_ip,
            );
            add_user(&database, &record).await
        }
        UserCommands::Remove {
            database,
            hash,
            password,
        } => remove_user(&database, &identity(hash, password)?).await,
        UserCommands::List { database, format } => list_users(&database, &format).await,
        UserCommands::Limit {
            database,
            hash,
            send_limit,
            recv_limit,
            max_ip,
        } => {
            let send_limit = send_limit.as_deref().map(parse_size).transpose()?;
            let recv_limit = recv_limit.as_deref().map(parse_size).transpose()?;
            update_limits(&database, &hash, send_limit, recv_limit, max_ip).await
        }
    }
}

fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .unwrap_or_else(|_| EnvFilter::new("warn"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(io::stderr))
        .try_init();
}

/// Resolve `--hash` / `--password` to an identity hash.
fn identity(hash: Option<String>, password: Option<String>) -> Result<String, Box<dyn std::error::Error>> {
    match (hash, password) {
        (Some(hash), _) => Ok(hash),
        (None, Some(password)) => Ok(sha224_hex(&password)),
        (None, None) => Err("Must specify --hash or --password".into()),
    }
}

/// Open the store for a one-off command.
async fn connect(database: &str) -> Result<SqliteStore, AuthError> {
    SqliteStore::connect(&SqliteConfig::new(database).max_connections(1)).await
}

/// Parse a size string (e.g., "10MB", "512KB") to bytes.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn parse_size(s: &str) -> Result<u64, Box<dyn std::error::Error>> {
    let s = s.trim().to_uppercase();
    if s == "0" || s.is_empty() {
        return Ok(0);
    }

    let (num, unit) = if let Some(num) = s.strip_suffix("TB") {
        (num, 1u64 << 40)
    } else if let Some(num) = s.strip_suffix("GB") {
        (num, 1u64 << 30)
    } else if let Some(num) = s.strip_suffix("MB") {
        (num, 1u64 << 20)
    } else if let Some(num) = s.strip_suffix("KB") {
        (num, 1u64 << 10)
    } else if let Some(num) = s.strip_suffix('B') {
        (num, 1)
    } else {
        // Assume bytes if no unit
        (s.as_str(), 1)
    };

    let value: f64 = num.trim().parse()?;
    if !value.is_finite() || value < 0.0 {
        return Err(format!("Invalid size: {s}").into());
    }
    Ok((value * unit as f64) as u64)
}

/// Format bytes to human readable string.
#[allow(clippy::cast_precision_loss)]
fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;
    const TB: u64 = GB * 1024;

    if bytes >= TB {
        format!("{:.2} TB", bytes as f64 / TB as f64)
    } else if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// Format a speed limit (0 means unlimited).
fn format_rate(bytes: u64) -> String {
    if bytes == 0 {
        "Unlimited".to_string()
    } else {
        format!("{}/s", format_bytes(bytes))
    }
}

async fn add_user(database: &str, record: &UserRecord) -> CliResult {
    let store = connect(database).await?;
    match store.load_user(&record.hash).await {
        Ok(_) => return Err(format!("User {} already exists", record.hash).into()),
        Err(AuthError::NotFound) => {}
        Err(e) => return Err(e.into()),
    }
    store.save_user(record).await?;
    store.close().await?;

    println!("User added successfully.");
    println!("  Hash: {}", record.hash);
    println!("  Send limit: {}", format_rate(record.send_limit));
    println!("  Recv limit: {}", format_rate(record.recv_limit));
    println!("  Max IPs: {}", record.max_ip_num);
    Ok(())
}

async fn remove_user(database: &str, hash: &str) -> CliResult {
    let store = connect(database).await?;
    let existed = match store.load_user(hash).await {
        Ok(_) => true,
        Err(AuthError::NotFound) => false,
        Err(e) => return Err(e.into()),
    };
    store.delete_user(hash).await?;
    store.close().await?;

    if existed {
        println!("User removed successfully.");
    } else {
        println!("No user found matching the criteria.");
    }
    Ok(())
}

async fn list_users(database: &str, format: &str) -> CliResult {
    let store = connect(database).await?;
    let mut records = store.collect_users().await?;
    store.close().await?;

    if records.is_empty() {
        println!("No users found.");
        return Ok(());
    }
    records.sort_by(|a, b| a.hash.cmp(&b.hash));

    match format {
        "json" => {
            let rows: Vec<_> = records.iter().map(UserRow::from).collect();
            println!("{}", serde_json::to_string_pretty(&rows)?);
        }
        _ => {
            // Table format (default)
            let users: Vec<UserDisplay> = records.iter().map(UserDisplay::from).collect();
            println!("{}", Table::new(users));
        }
    }
    Ok(())
}

/// Raw user row for machine-readable output.
#[derive(Serialize)]
struct UserRow<'a> {
    hash: &'a str,
    sent: u64,
    recv: u64,
    send_limit: u64,
    recv_limit: u64,
    max_ip_num: usize,
}

impl<'a> From<&'a UserRecord> for UserRow<'a> {
    fn from(record: &'a UserRecord) -> Self {
        Self {
            hash: &record.hash,
            sent: record.sent,
            recv: record.recv,
            send_limit: record.send_limit,
            recv_limit: record.recv_limit,
            max_ip_num: record.max_ip_num,
        }
    }
}

async fn update_limits(
    database: &str,
    hash: &str,
    send_limit: Option<u64>,
    recv_limit: Option<u64>,
    max_ip: Option<usize>,
) -> CliResult {
    if send_limit.is_none() && recv_limit.is_none() && max_ip.is_none() {
        println!("No updates specified.");
        return Ok(());
    }

    let store = connect(database).await?;
    let mut record = match store.load_user(hash).await {
        Ok(record) => record,
        Err(AuthError::NotFound) => return Err(format!("No user with hash {hash}").into()),
        Err(e) => return Err(e.into()),
    };
    if let Some(limit) = send_limit {
        record.send_limit = limit;
    }
    if let Some(limit) = recv_limit {
        record.recv_limit = limit;
    }
    if let Some(max) = max_ip {
        record.max_ip_num = max;
    }
    store.save_user(&record).await?;
    store.close().await?;

    println!("User updated successfully.");
    Ok(())
}
