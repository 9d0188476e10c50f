use anyhow::{Context, Result};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use crate::core::config;
use crate::core::error::StoreResult;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

/// Create a new database connection pool
///
/// Initializes a pool of up to [`config::pool::MAX_SIZE`] connections, runs
/// schema migrations on the first connection, and configures every
/// connection with foreign-key enforcement and a busy timeout so that
/// concurrent writers queue instead of failing.
///
/// # Arguments
///
/// * `database_path` - Path to the SQLite database file
///
/// # Example
///
/// ```no_run
/// use lavkacore::storage::db;
///
/// let pool = db::create_pool("lavka.sqlite")?;
/// # anyhow::Ok(())
/// ```
pub fn create_pool(database_path: &str) -> Result<DbPool> {
    let manager = SqliteConnectionManager::file(database_path).with_init(|conn| {
        conn.execute_batch(&format!(
            "PRAGMA foreign_keys = ON; PRAGMA busy_timeout = {};",
            config::pool::BUSY_TIMEOUT_MS
        ))
    });
    let pool = Pool::builder()
        .max_size(config::pool::MAX_SIZE)
        .build(manager)
        .context("build connection pool")?;

    let mut conn = pool.get().context("get migration connection")?;
    super::migrations::run_migrations(&mut conn)?;
    log::info!("Database ready at {}", database_path);

    Ok(pool)
}

/// Create the pool at the path configured through `DATABASE_PATH`.
pub fn create_pool_from_env() -> Result<DbPool> {
    create_pool(&config::DATABASE_PATH)
}

/// Get a connection from the pool
///
/// The connection is returned to the pool when dropped.
pub fn get_connection(pool: &DbPool) -> Result<DbConnection, r2d2::Error> {
    pool.get()
}

/// Run `f` inside an exclusive write transaction.
///
/// `BEGIN IMMEDIATE` takes the SQLite write lock up front, so two calls for
/// the same database serialize here; with the busy timeout configured on
/// the pool the loser waits instead of erroring. On any error from `f` the
/// transaction is rolled back and the database is left exactly as it was
/// before the call.
pub(crate) fn with_tx<T>(
    conn: &Connection,
    f: impl FnOnce(&Connection) -> StoreResult<T>,
) -> StoreResult<T> {
    conn.execute_batch("BEGIN IMMEDIATE")?;
    match f(conn) {
        Ok(value) => {
            conn.execute_batch("COMMIT")?;
            Ok(value)
        }
        Err(err) => {
            let _ = conn.execute_batch("ROLLBACK");
            Err(err)
        }
    }
}
