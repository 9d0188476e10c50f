//! The administrator allow-list.
//!
//! `admin_users` rows are provisioned out-of-band (deploy scripts, a
//! one-off SQL shell); the core only ever reads them. Whether a given
//! operation *requires* admin rights is the caller's policy — the catalog
//! store itself does not consult this gate.

use rusqlite::{params, Connection};

use crate::core::error::StoreResult;

/// Check if a Telegram identity is an administrator. Pure lookup, no side
/// effects.
pub fn is_admin(conn: &Connection, telegram_id: i64) -> StoreResult<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM admin_users WHERE telegram_id = ?1)",
        params![telegram_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}
