//! Embedded schema migrations.

use anyhow::{Context, Result};
use rusqlite::Connection;
use std::sync::{Mutex, OnceLock, PoisonError};
use std::time::Duration;

mod embedded {
    use refinery::embed_migrations;

    embed_migrations!("./migrations");
}

static MIGRATION_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

/// Bring a connection's schema up to date.
///
/// Refinery opens its own transaction around each migration, so no outer
/// transaction is taken here. A process-wide mutex serializes concurrent
/// pool creations within the process; the busy timeout covers a second
/// process migrating the same database file. Migrations are idempotent —
/// a poisoned lock is safe to recover.
pub fn run_migrations(conn: &mut Connection) -> Result<()> {
    let mutex = MIGRATION_LOCK.get_or_init(|| Mutex::new(()));
    let _guard = mutex.lock().unwrap_or_else(PoisonError::into_inner);

    conn.busy_timeout(Duration::from_secs(30))
        .context("set SQLite busy timeout")?;

    let report = embedded::migrations::runner()
        .run(conn)
        .context("apply migrations")?;
    let applied = report.applied_migrations().len();
    if applied > 0 {
        log::info!("Applied {} schema migration(s)", applied);
    }
    Ok(())
}
