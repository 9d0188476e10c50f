//! Per-user favorites: a plain (user, item) junction table.
//!
//! Membership only — no ordering, no quantity. Both directions of the
//! association are answered by indexed queries on this table instead of
//! back-references on the entities.

use rusqlite::{params, Connection};

use crate::core::error::{StoreError, StoreResult};
use crate::storage::catalog::{self, Item};
use crate::storage::users;

/// Mark an item as a user's favorite. Idempotent: favoriting twice keeps a
/// single row.
pub fn add_favorite(conn: &Connection, user_id: i64, item_id: i64) -> StoreResult<()> {
    if !users::user_exists(conn, user_id)? {
        return Err(StoreError::NotFound(format!("user {}", user_id)));
    }
    if !catalog::item_exists(conn, item_id)? {
        return Err(StoreError::NotFound(format!("item {}", item_id)));
    }

    conn.execute(
        "INSERT INTO favorites (user_id, item_id) VALUES (?1, ?2)
         ON CONFLICT(user_id, item_id) DO NOTHING",
        params![user_id, item_id],
    )?;
    Ok(())
}

/// Unmark a favorite. Idempotent: removing a non-favorite is not an error.
pub fn remove_favorite(conn: &Connection, user_id: i64, item_id: i64) -> StoreResult<()> {
    conn.execute(
        "DELETE FROM favorites WHERE user_id = ?1 AND item_id = ?2",
        params![user_id, item_id],
    )?;
    Ok(())
}

/// The user's favorite items, in item-id order.
pub fn list_favorites(conn: &Connection, user_id: i64) -> StoreResult<Vec<Item>> {
    // Column order must match catalog::parse_item.
    let mut stmt = conn.prepare(
        "SELECT i.id, i.title, i.description, i.sku, i.price, i.display_order,
                i.album_id, i.is_orderable, i.is_visible
         FROM items i
         JOIN favorites f ON f.item_id = i.id
         WHERE f.user_id = ?1
         ORDER BY i.id ASC",
    )?;
    let rows = stmt.query_map(params![user_id], catalog::parse_item)?;

    let mut items = Vec::new();
    for row in rows {
        items.push(row?);
    }
    Ok(items)
}
