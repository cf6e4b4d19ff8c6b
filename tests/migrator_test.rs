use diesel::prelude::*;
use diesel::sql_types::Integer;
use tempfile::TempDir;

use whatsapp_mcp::store::migrator::Migrator;
use whatsapp_mcp::store::StoreError;

fn open_conn(dir: &TempDir) -> SqliteConnection {
    let path = dir.path().join("messages.db");
    SqliteConnection::establish(path.to_str().unwrap()).unwrap()
}

#[derive(QueryableByName, PartialEq, Debug)]
struct VersionRow {
    #[diesel(sql_type = Integer)]
    version: i32,
    #[diesel(sql_type = diesel::sql_types::Text)]
    checksum: String,
    #[diesel(sql_type = diesel::sql_types::BigInt)]
    applied_at: i64,
}

fn migration_rows(conn: &mut SqliteConnection) -> Vec<VersionRow> {
    diesel::sql_query("SELECT version, checksum, applied_at FROM schema_migrations ORDER BY version")
        .load(conn)
        .unwrap()
}

#[test]
fn migrate_applies_embedded_migrations() {
    let dir = TempDir::new().unwrap();
    let mut conn = open_conn(&dir);

    Migrator::new(&mut conn).migrate().unwrap();

    let rows = migration_rows(&mut conn);
    assert!(!rows.is_empty());
    assert_eq!(rows[0].version, 1);

    // All tables from the migrations exist.
    for table in ["chats", "messages", "push_names", "media_metadata", "webhook_registrations"] {
        diesel::sql_query(format!("SELECT COUNT(*) AS version FROM {table}"))
            .execute(&mut conn)
            .unwrap();
    }
}

#[test]
fn migrate_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let mut conn = open_conn(&dir);

    Migrator::new(&mut conn).migrate().unwrap();
    let first = migration_rows(&mut conn);

    Migrator::new(&mut conn).migrate().unwrap();
    let second = migration_rows(&mut conn);

    assert_eq!(first, second);
}

#[test]
fn checksum_mismatch_fails_startup() {
    let dir = TempDir::new().unwrap();
    let mut conn = open_conn(&dir);
    Migrator::new(&mut conn).migrate().unwrap();

    // Simulate an edited applied migration by corrupting its recorded hash.
    diesel::sql_query("UPDATE schema_migrations SET checksum = 'deadbeef' WHERE version = 1")
        .execute(&mut conn)
        .unwrap();

    let err = Migrator::new(&mut conn).migrate().unwrap_err();
    assert!(matches!(err, StoreError::Conflict(_)));
    assert!(err.to_string().contains("Never modify applied migrations"));
}

#[test]
fn version_sequence_must_be_dense() {
    let dir = TempDir::new().unwrap();
    let mut conn = open_conn(&dir);

    let sources: &[(&str, &str)] = &[
        ("001_first.sql", "CREATE TABLE a (x INTEGER);"),
        ("003_gap.sql", "CREATE TABLE b (x INTEGER);"),
    ];
    let err = Migrator::with_sources(&mut conn, sources)
        .migrate()
        .unwrap_err();
    assert!(matches!(err, StoreError::Migration(_)));

    let dup: &[(&str, &str)] = &[
        ("001_first.sql", "CREATE TABLE a (x INTEGER);"),
        ("001_again.sql", "CREATE TABLE b (x INTEGER);"),
    ];
    let err = Migrator::with_sources(&mut conn, dup).migrate().unwrap_err();
    assert!(matches!(err, StoreError::Migration(_)));
}

#[test]
fn migrate_to_stops_at_target() {
    let dir = TempDir::new().unwrap();
    let mut conn = open_conn(&dir);

    let sources: &[(&str, &str)] = &[
        ("001_first.sql", "CREATE TABLE a (x INTEGER);"),
        ("002_second.sql", "CREATE TABLE b (x INTEGER);"),
    ];

    Migrator::with_sources(&mut conn, sources)
        .migrate_to(1)
        .unwrap();
    assert!(diesel::sql_query("SELECT * FROM a").execute(&mut conn).is_ok());
    assert!(diesel::sql_query("SELECT * FROM b").execute(&mut conn).is_err());

    let statuses = Migrator::with_sources(&mut conn, sources).status().unwrap();
    assert!(statuses[0].applied);
    assert!(!statuses[1].applied);

    // Zero means latest.
    Migrator::with_sources(&mut conn, sources)
        .migrate_to(0)
        .unwrap();
    assert!(diesel::sql_query("SELECT * FROM b").execute(&mut conn).is_ok());
}

#[test]
fn migrate_to_unknown_target_is_rejected() {
    let dir = TempDir::new().unwrap();
    let mut conn = open_conn(&dir);

    let sources: &[(&str, &str)] = &[("001_first.sql", "CREATE TABLE a (x INTEGER);")];
    let err = Migrator::with_sources(&mut conn, sources)
        .migrate_to(7)
        .unwrap_err();
    assert!(matches!(err, StoreError::Migration(_)));
}

#[test]
fn failed_migration_rolls_back() {
    let dir = TempDir::new().unwrap();
    let mut conn = open_conn(&dir);

    let sources: &[(&str, &str)] = &[(
        "001_broken.sql",
        "CREATE TABLE a (x INTEGER); CREATE TABLE a (x INTEGER);",
    )];
    assert!(Migrator::with_sources(&mut conn, sources).migrate().is_err());

    // Neither the table nor the migration record survives.
    assert!(diesel::sql_query("SELECT * FROM a").execute(&mut conn).is_err());
    assert!(migration_rows(&mut conn).is_empty());
}
