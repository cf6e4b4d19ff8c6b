//! Message store: all persistent state behind one SQLite file.
//!
//! Writers are serialised by capping the connection pool at a single
//! connection; readers share it. Foreign keys, WAL and a 5 s busy timeout
//! are applied to every checked-out connection.

pub mod chats;
pub mod error;
pub mod media;
pub mod messages;
pub mod migrator;
pub mod models;
pub mod push_names;
pub mod schema;
pub mod webhooks;

use diesel::connection::SimpleConnection;
use diesel::r2d2::{ConnectionManager, CustomizeConnection, Pool, PooledConnection};
use diesel::sqlite::SqliteConnection;
use log::info;

pub use error::{Result, StoreError};
pub use models::*;

type SqlitePool = Pool<ConnectionManager<SqliteConnection>>;
pub(crate) type PooledSqlite = PooledConnection<ConnectionManager<SqliteConnection>>;

#[derive(Debug)]
struct ConnectionOptions;

impl CustomizeConnection<SqliteConnection, diesel::r2d2::Error> for ConnectionOptions {
    fn on_acquire(&self, conn: &mut SqliteConnection) -> std::result::Result<(), diesel::r2d2::Error> {
        conn.batch_execute(
            "PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL; PRAGMA busy_timeout = 5000;",
        )
        .map_err(diesel::r2d2::Error::QueryError)
    }
}

#[derive(Clone)]
pub struct MessageStore {
    pool: SqlitePool,
}

impl MessageStore {
    /// Opens (or creates) the store and applies pending migrations.
    pub fn open(database_url: &str) -> Result<Self> {
        let manager = ConnectionManager::<SqliteConnection>::new(database_url);
        let pool = Pool::builder()
            .max_size(1)
            .connection_customizer(Box::new(ConnectionOptions))
            .build(manager)
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let store = Self { pool };
        {
            let mut conn = store.conn()?;
            migrator::Migrator::new(&mut conn).migrate()?;
        }
        info!("Message store ready at {database_url}");
        Ok(store)
    }

    pub(crate) fn conn(&self) -> Result<PooledSqlite> {
        self.pool
            .get()
            .map_err(|e| StoreError::Connection(e.to_string()))
    }
}

/// True when the pattern should be matched with SQLite GLOB semantics
/// (case-sensitive, `*`/`?`/`[...]`) instead of a case-insensitive
/// substring LIKE.
pub fn is_glob_pattern(pattern: &str) -> bool {
    pattern.contains(['*', '?', '['])
}
