//! User rows keyed by the Telegram identity.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::core::error::{StoreError, StoreResult};

/// Структура, представляющая пользователя магазина.
#[derive(Debug, Clone, Serialize)]
pub struct User {
    pub id: i64,
    /// Полное имя (из профиля Telegram)
    pub full_name: String,
    /// Имя пользователя (username) в Telegram, если доступно
    pub username: Option<String>,
    /// URL аватара, если доступен
    pub avatar_url: Option<String>,
    /// Telegram ID пользователя — внешняя идентичность чата
    pub telegram_id: i64,
}

fn parse_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
    Ok(User {
        id: row.get(0)?,
        full_name: row.get(1)?,
        username: row.get(2)?,
        avatar_url: row.get(3)?,
        telegram_id: row.get(4)?,
    })
}

/// Create or update a user from their chat profile.
///
/// The first sighting of a `telegram_id` inserts a row; later calls update
/// the mutable profile fields (full name, username, avatar) and keep the
/// row id stable.
pub fn upsert_user(
    conn: &Connection,
    telegram_id: i64,
    full_name: &str,
    username: Option<&str>,
    avatar_url: Option<&str>,
) -> StoreResult<User> {
    if full_name.trim().is_empty() {
        return Err(StoreError::Validation("full_name must not be empty".to_string()));
    }

    conn.execute(
        "INSERT INTO users (telegram_id, full_name, username, avatar_url)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(telegram_id) DO UPDATE SET
           full_name = excluded.full_name,
           username = excluded.username,
           avatar_url = excluded.avatar_url",
        params![telegram_id, full_name, username, avatar_url],
    )?;

    get_user_by_telegram_id(conn, telegram_id)
}

/// Look a user up by their Telegram ID.
pub fn get_user_by_telegram_id(conn: &Connection, telegram_id: i64) -> StoreResult<User> {
    conn.query_row(
        "SELECT id, full_name, username, avatar_url, telegram_id
         FROM users WHERE telegram_id = ?1",
        params![telegram_id],
        parse_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("user with telegram id {}", telegram_id)))
}

/// Check a user row exists by internal id. Used by the cart and favorites
/// stores for referential validity before inserting.
pub(crate) fn user_exists(conn: &Connection, user_id: i64) -> StoreResult<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM users WHERE id = ?1)",
        params![user_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

#[cfg(test)]
pub(crate) fn make_conn() -> Connection {
    let mut conn = Connection::open_in_memory().unwrap();
    super::migrations::run_migrations(&mut conn).unwrap();
    conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
    conn
}
