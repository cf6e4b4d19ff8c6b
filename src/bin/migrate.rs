//! Migration CLI.
//!
//! ```text
//! migrate create <description>     Create a new migration file
//! migrate status                   Show applied and pending migrations
//! migrate upgrade [version|latest] Apply pending migrations
//! ```
//!
//! Migration files live in `migrations/` and are embedded into the binary
//! at build time. Never modify an applied migration; the checksum guard
//! will refuse to start.

use anyhow::{bail, Context};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use diesel::{Connection, SqliteConnection};

use whatsapp_mcp::paths;
use whatsapp_mcp::store::migrator::Migrator;

#[derive(Parser)]
#[command(name = "migrate", about = "Manage database schema migrations")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a new migration file
    Create {
        /// Words of the description, joined with underscores
        #[arg(required = true)]
        description: Vec<String>,
    },
    /// Show migration status (applied and pending)
    Status,
    /// Apply migrations up to the given version, or all of them
    Upgrade {
        /// Target version number, or "latest"
        target: Option<String>,
    },
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    match cli.command {
        Command::Create { description } => create_migration(&description.join("_")),
        Command::Status => show_status(),
        Command::Upgrade { target } => {
            let target_version = match target.as_deref() {
                None | Some("latest") => 0,
                Some(raw) => raw
                    .parse::<i32>()
                    .with_context(|| format!("invalid target version '{raw}'"))?,
            };
            run_upgrade(target_version)
        }
    }
}

fn open_connection() -> anyhow::Result<SqliteConnection> {
    paths::ensure_data_directories().context("failed to create data directories")?;
    SqliteConnection::establish(paths::MESSAGES_DB_PATH)
        .with_context(|| format!("failed to open {}", paths::MESSAGES_DB_PATH))
}

fn sanitize_description(description: &str) -> String {
    description
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect::<String>()
        .trim_matches('_')
        .to_string()
}

/// Next version = highest `NNN_` prefix in the migrations directory + 1.
fn next_version(dir: &str) -> anyhow::Result<i32> {
    let mut highest = 0;
    for entry in std::fs::read_dir(dir).with_context(|| format!("failed to read {dir}"))? {
        let name = entry?.file_name();
        let name = name.to_string_lossy();
        if let Some((prefix, _)) = name.strip_suffix(".sql").and_then(|s| s.split_once('_')) {
            if prefix.len() == 3 {
                if let Ok(version) = prefix.parse::<i32>() {
                    highest = highest.max(version);
                }
            }
        }
    }
    Ok(highest + 1)
}

fn create_migration(description: &str) -> anyhow::Result<()> {
    let description = sanitize_description(description);
    if description.is_empty() {
        bail!("migration description must contain at least one alphanumeric character");
    }

    std::fs::create_dir_all(paths::MIGRATIONS_DIR)?;
    let version = next_version(paths::MIGRATIONS_DIR)?;
    let filename = format!("{version:03}_{description}.sql");
    let path = std::path::Path::new(paths::MIGRATIONS_DIR).join(&filename);

    let template = format!(
        "-- Migration {version:03}: {}\n--\n\
         -- Applied migrations must never be edited; create a new migration\n\
         -- instead.\n\n",
        description.replace('_', " ")
    );
    std::fs::write(&path, template)
        .with_context(|| format!("failed to write {}", path.display()))?;

    println!("Created migration: {}", path.display());
    println!();
    println!("Next steps:");
    println!("1. Edit the migration file and add your SQL statements");
    println!("2. Register it in store/migrator.rs MIGRATION_SOURCES");
    println!("3. Run `migrate upgrade` (or start the server) to apply it");
    Ok(())
}

fn show_status() -> anyhow::Result<()> {
    let mut conn = open_connection()?;
    let statuses = Migrator::new(&mut conn).status()?;

    println!("{:<8} {:<10} {:<20} DESCRIPTION", "VERSION", "STATE", "APPLIED AT");
    for status in statuses {
        let state = if status.applied { "applied" } else { "pending" };
        let applied_at = status
            .applied_at
            .and_then(|ts| DateTime::<Utc>::from_timestamp(ts, 0))
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<8} {:<10} {:<20} {}",
            status.version, state, applied_at, status.description
        );
    }
    Ok(())
}

fn run_upgrade(target_version: i32) -> anyhow::Result<()> {
    let mut conn = open_connection()?;
    Migrator::new(&mut conn).migrate_to(target_version)?;
    println!("Database schema is up to date");
    Ok(())
}
