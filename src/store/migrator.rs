//! Checksummed schema migrations.
//!
//! Migration files are embedded in the binary, named
//! `NNN_description.sql` with a dense version sequence starting at 1. Every
//! applied migration's SHA-256 is recorded and re-validated on startup, so
//! silent drift between an edited file and the deployed schema fails loudly
//! instead of diverging.

use diesel::connection::SimpleConnection;
use diesel::prelude::*;
use log::info;
use sha2::{Digest, Sha256};

use crate::store::error::{Result, StoreError};
use crate::store::schema::schema_migrations;

/// Embedded migration sources, in filename order.
pub const MIGRATION_SOURCES: &[(&str, &str)] = &[
    (
        "001_initial_schema.sql",
        include_str!("../../migrations/001_initial_schema.sql"),
    ),
    (
        "002_media_metadata.sql",
        include_str!("../../migrations/002_media_metadata.sql"),
    ),
    (
        "003_webhooks.sql",
        include_str!("../../migrations/003_webhooks.sql"),
    ),
];

#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i32,
    pub description: String,
    pub sql: String,
    pub checksum: String,
    pub filename: String,
}

#[derive(Debug, Clone)]
pub struct MigrationStatus {
    pub version: i32,
    pub description: String,
    pub filename: String,
    pub applied: bool,
    pub applied_at: Option<i64>,
}

/// Parses `NNN_description.sql` into `(version, description)`. Returns
/// `None` for files that do not match the pattern.
fn parse_filename(name: &str) -> Option<(i32, String)> {
    let stem = name.strip_suffix(".sql")?;
    let (version, description) = stem.split_once('_')?;
    if version.len() != 3 || !version.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let version: i32 = version.parse().ok()?;
    if version < 1 || description.is_empty() {
        return None;
    }
    Some((version, description.replace('_', " ")))
}

pub struct Migrator<'a> {
    conn: &'a mut SqliteConnection,
    sources: &'a [(&'a str, &'a str)],
}

impl<'a> Migrator<'a> {
    pub fn new(conn: &'a mut SqliteConnection) -> Self {
        Self {
            conn,
            sources: MIGRATION_SOURCES,
        }
    }

    /// Migrator over an explicit source list, for tests and tooling.
    pub fn with_sources(conn: &'a mut SqliteConnection, sources: &'a [(&'a str, &'a str)]) -> Self {
        Self { conn, sources }
    }

    /// Applies all pending migrations.
    pub fn migrate(&mut self) -> Result<()> {
        self.migrate_to(0)
    }

    /// Applies pending migrations up to `target_version`; zero or negative
    /// means latest.
    pub fn migrate_to(&mut self, target_version: i32) -> Result<()> {
        self.ensure_migrations_table()?;
        let current = self.current_version()?;
        let migrations = self.load_migrations()?;

        if target_version > 0 && !migrations.iter().any(|m| m.version == target_version) {
            return Err(StoreError::Migration(format!(
                "target version {target_version} does not exist"
            )));
        }

        self.validate_applied(&migrations, current)?;

        let pending: Vec<&Migration> = migrations
            .iter()
            .filter(|m| {
                m.version > current && (target_version <= 0 || m.version <= target_version)
            })
            .collect();

        if pending.is_empty() {
            info!("Database schema is up to date (version {current})");
            return Ok(());
        }

        info!("Applying {} pending migration(s)...", pending.len());
        for migration in pending {
            info!(
                "  - Migration {}: {}",
                migration.version, migration.description
            );
            self.apply(migration)?;
        }
        info!("Migrations completed successfully");
        Ok(())
    }

    /// Applied/pending state of every known migration.
    pub fn status(&mut self) -> Result<Vec<MigrationStatus>> {
        self.ensure_migrations_table()?;
        let migrations = self.load_migrations()?;
        let mut statuses = Vec::with_capacity(migrations.len());
        for migration in &migrations {
            let applied_at = schema_migrations::table
                .find(migration.version)
                .select(schema_migrations::applied_at)
                .first::<i64>(self.conn)
                .optional()?;
            statuses.push(MigrationStatus {
                version: migration.version,
                description: migration.description.clone(),
                filename: migration.filename.clone(),
                applied: applied_at.is_some(),
                applied_at,
            });
        }
        Ok(statuses)
    }

    fn ensure_migrations_table(&mut self) -> Result<()> {
        self.conn
            .batch_execute(
                "CREATE TABLE IF NOT EXISTS schema_migrations (
                    version INTEGER PRIMARY KEY,
                    description TEXT NOT NULL,
                    applied_at INTEGER NOT NULL,
                    checksum TEXT NOT NULL
                );",
            )
            .map_err(|e| StoreError::Migration(e.to_string()))
    }

    fn current_version(&mut self) -> Result<i32> {
        let version = schema_migrations::table
            .select(diesel::dsl::max(schema_migrations::version))
            .first::<Option<i32>>(self.conn)?
            .unwrap_or(0);
        Ok(version)
    }

    /// Parses and checksums the embedded sources, asserting the version
    /// sequence is `1, 2, …, N` with no gaps or duplicates.
    fn load_migrations(&self) -> Result<Vec<Migration>> {
        let mut migrations: Vec<Migration> = self
            .sources
            .iter()
            .filter_map(|(name, sql)| {
                let (version, description) = parse_filename(name)?;
                let checksum = hex::encode(Sha256::digest(sql.as_bytes()));
                Some(Migration {
                    version,
                    description,
                    sql: sql.to_string(),
                    checksum,
                    filename: name.to_string(),
                })
            })
            .collect();

        migrations.sort_by_key(|m| m.version);

        for (i, migration) in migrations.iter().enumerate() {
            let expected = i as i32 + 1;
            if migration.version != expected {
                return Err(StoreError::Migration(format!(
                    "migration version sequence error: expected {expected}, got {} ({})",
                    migration.version, migration.filename
                )));
            }
        }

        Ok(migrations)
    }

    /// Verifies recorded checksums for every already-applied migration.
    fn validate_applied(&mut self, migrations: &[Migration], current: i32) -> Result<()> {
        for migration in migrations.iter().filter(|m| m.version <= current) {
            let stored = schema_migrations::table
                .find(migration.version)
                .select(schema_migrations::checksum)
                .first::<String>(self.conn)
                .optional()?;

            let stored = stored.ok_or_else(|| {
                StoreError::Migration(format!(
                    "migration {} ({}) is missing from schema_migrations; \
                     database may be corrupted or partially migrated",
                    migration.version, migration.filename
                ))
            })?;

            if stored != migration.checksum {
                return Err(StoreError::Conflict(format!(
                    "migration {} ({}) has been modified after being applied \
                     (checksum mismatch). Never modify applied migrations - \
                     create a new migration instead",
                    migration.version, migration.filename
                )));
            }
        }
        Ok(())
    }

    /// Applies one migration inside its own transaction and records it.
    fn apply(&mut self, migration: &Migration) -> Result<()> {
        let applied_at = chrono::Utc::now().timestamp();
        self.conn
            .transaction::<_, diesel::result::Error, _>(|conn| {
                conn.batch_execute(&migration.sql)?;
                diesel::insert_into(schema_migrations::table)
                    .values((
                        schema_migrations::version.eq(migration.version),
                        schema_migrations::description.eq(&migration.description),
                        schema_migrations::applied_at.eq(applied_at),
                        schema_migrations::checksum.eq(&migration.checksum),
                    ))
                    .execute(conn)?;
                Ok(())
            })
            .map_err(|e| {
                StoreError::Migration(format!(
                    "failed to apply migration {} ({}): {e}",
                    migration.version, migration.filename
                ))
            })?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_parsing() {
        assert_eq!(
            parse_filename("001_initial_schema.sql"),
            Some((1, "initial schema".to_string()))
        );
        assert_eq!(
            parse_filename("012_add_reactions.sql"),
            Some((12, "add reactions".to_string()))
        );
        assert_eq!(parse_filename("1_short.sql"), None);
        assert_eq!(parse_filename("abc_bad.sql"), None);
        assert_eq!(parse_filename("001_missing_extension"), None);
        assert_eq!(parse_filename("000_zero.sql"), None);
    }

    #[test]
    fn embedded_sources_are_dense_from_one() {
        let versions: Vec<i32> = MIGRATION_SOURCES
            .iter()
            .filter_map(|(name, _)| parse_filename(name).map(|(v, _)| v))
            .collect();
        assert_eq!(versions, (1..=versions.len() as i32).collect::<Vec<_>>());
    }
}
