//! The cart ledger and its checkout transition.
//!
//! Each entry is either *open* (`checkout_timestamp` NULL, mutable) or
//! *checked out* (timestamp set, immutable history). The only transition is
//! open → checked out, stamped once for the whole cart; cancellation is
//! modeled as deleting an open entry, not as a state.
//!
//! An entry stores only `item_id` and `quantity`; price is resolved
//! against the live item at read time. A price change therefore
//! retroactively alters historical totals; if the
//! surrounding system needs point-in-time receipts it must snapshot a
//! `unit_price_at_checkout` itself (known follow-up, not silently fixed
//! here).

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;

use crate::core::error::{StoreError, StoreResult};
use crate::storage::db::with_tx;
use crate::storage::{catalog, users};

/// One cart row. Serializes to the field-name → value mapping handed to
/// callers for receipt rendering.
#[derive(Debug, Clone, Serialize)]
pub struct CartEntry {
    pub id: i64,
    pub user_id: i64,
    pub item_id: i64,
    pub quantity: i64,
    pub created_at: String,
    pub checkout_timestamp: Option<String>,
}

impl CartEntry {
    /// True while the entry has not been checked out.
    pub fn is_open(&self) -> bool {
        self.checkout_timestamp.is_none()
    }
}

/// An open cart entry joined with the live item it points at.
#[derive(Debug, Clone, Serialize)]
pub struct CartLine {
    pub entry: CartEntry,
    pub item_title: String,
    /// Unit price of the item *at read time* — see the module docs.
    pub unit_price: f64,
}

impl CartLine {
    pub fn line_total(&self) -> f64 {
        self.unit_price * self.entry.quantity as f64
    }
}

const CART_COLS: &str = "id, user_id, item_id, quantity, created_at, checkout_timestamp";

fn parse_entry(row: &rusqlite::Row<'_>) -> rusqlite::Result<CartEntry> {
    Ok(CartEntry {
        id: row.get(0)?,
        user_id: row.get(1)?,
        item_id: row.get(2)?,
        quantity: row.get(3)?,
        created_at: row.get(4)?,
        checkout_timestamp: row.get(5)?,
    })
}

/// Add an item to a user's cart.
///
/// If an open entry for (user, item) already exists its quantity is
/// incremented by `quantity` in a single upsert against the partial unique
/// index, so concurrent adds collapse into one row instead of racing.
///
/// Fails with `Conflict` when the item (or the album it belongs to) is not
/// orderable, with `NotFound` when the user or item is missing, and with
/// `Validation` when `quantity < 1`.
pub fn add_to_cart(
    conn: &Connection,
    user_id: i64,
    item_id: i64,
    quantity: i64,
) -> StoreResult<CartEntry> {
    if quantity < 1 {
        return Err(StoreError::Validation(format!(
            "quantity must be at least 1, got {}",
            quantity
        )));
    }

    with_tx(conn, |tx| {
        if !users::user_exists(tx, user_id)? {
            return Err(StoreError::NotFound(format!("user {}", user_id)));
        }
        let item = catalog::get_item(tx, item_id)?;
        let album_orderable = match item.album_id {
            Some(album_id) => catalog::get_album(tx, album_id)?.is_orderable,
            None => true,
        };
        if !item.is_orderable || !album_orderable {
            return Err(StoreError::Conflict(format!(
                "item {} is not orderable",
                item_id
            )));
        }

        tx.execute(
            "INSERT INTO cart (user_id, item_id, quantity) VALUES (?1, ?2, ?3)
             ON CONFLICT(user_id, item_id) WHERE checkout_timestamp IS NULL
             DO UPDATE SET quantity = quantity + excluded.quantity",
            params![user_id, item_id, quantity],
        )?;

        open_entry(tx, user_id, item_id)?
            .ok_or_else(|| StoreError::NotFound(format!("open cart entry for item {}", item_id)))
    })
}

/// Set the quantity of an open entry to an absolute value.
///
/// Quantity zero is not a removal — use [`remove_from_cart`]. Mutating a
/// checked-out entry is a `Conflict`; a pair with no history at all is
/// `NotFound`.
pub fn update_quantity(
    conn: &Connection,
    user_id: i64,
    item_id: i64,
    new_quantity: i64,
) -> StoreResult<CartEntry> {
    if new_quantity < 1 {
        return Err(StoreError::Validation(format!(
            "quantity must be at least 1, got {} (remove the entry instead)",
            new_quantity
        )));
    }

    with_tx(conn, |tx| {
        let affected = tx.execute(
            "UPDATE cart SET quantity = ?1
             WHERE user_id = ?2 AND item_id = ?3 AND checkout_timestamp IS NULL",
            params![new_quantity, user_id, item_id],
        )?;
        if affected == 0 {
            return Err(no_open_entry_error(tx, user_id, item_id)?);
        }

        open_entry(tx, user_id, item_id)?
            .ok_or_else(|| StoreError::NotFound(format!("open cart entry for item {}", item_id)))
    })
}

/// Remove an open entry from the cart. Checked-out entries are immutable
/// history and removing them is a `Conflict`.
pub fn remove_from_cart(conn: &Connection, user_id: i64, item_id: i64) -> StoreResult<()> {
    with_tx(conn, |tx| {
        let affected = tx.execute(
            "DELETE FROM cart
             WHERE user_id = ?1 AND item_id = ?2 AND checkout_timestamp IS NULL",
            params![user_id, item_id],
        )?;
        if affected == 0 {
            return Err(no_open_entry_error(tx, user_id, item_id)?);
        }
        Ok(())
    })
}

/// A user's open cart joined with live item titles and prices, oldest
/// addition first.
pub fn list_open_cart(conn: &Connection, user_id: i64) -> StoreResult<Vec<CartLine>> {
    let mut stmt = conn.prepare(
        "SELECT c.id, c.user_id, c.item_id, c.quantity, c.created_at, c.checkout_timestamp,
                i.title, i.price
         FROM cart c JOIN items i ON i.id = c.item_id
         WHERE c.user_id = ?1 AND c.checkout_timestamp IS NULL
         ORDER BY c.created_at ASC, c.id ASC",
    )?;
    let rows = stmt.query_map(params![user_id], |row| {
        Ok(CartLine {
            entry: parse_entry(row)?,
            item_title: row.get(6)?,
            unit_price: row.get(7)?,
        })
    })?;

    let mut lines = Vec::new();
    for row in rows {
        lines.push(row?);
    }
    Ok(lines)
}

/// Check out a user's whole open cart.
///
/// Atomically stamps one shared checkout timestamp on every open entry, so
/// the set can later be grouped into a single order/receipt. An empty cart
/// is a `Conflict` and leaves the ledger untouched.
pub fn checkout(conn: &Connection, user_id: i64) -> StoreResult<Vec<CartEntry>> {
    // Microsecond precision so two consecutive checkouts of one user can
    // never share a stamp; entries of the same checkout are found by it.
    let stamp = Utc::now().format("%Y-%m-%d %H:%M:%S%.6f").to_string();

    with_tx(conn, |tx| {
        let affected = tx.execute(
            "UPDATE cart SET checkout_timestamp = ?1
             WHERE user_id = ?2 AND checkout_timestamp IS NULL",
            params![stamp, user_id],
        )?;
        if affected == 0 {
            return Err(StoreError::Conflict(format!(
                "cart of user {} is empty, nothing to check out",
                user_id
            )));
        }

        let mut stmt = tx.prepare(&format!(
            "SELECT {} FROM cart
             WHERE user_id = ?1 AND checkout_timestamp = ?2
             ORDER BY created_at ASC, id ASC",
            CART_COLS
        ))?;
        let rows = stmt.query_map(params![user_id, stamp], parse_entry)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        log::info!(
            "User {} checked out {} cart entries at {}",
            user_id,
            entries.len(),
            stamp
        );
        Ok(entries)
    })
}

fn open_entry(conn: &Connection, user_id: i64, item_id: i64) -> StoreResult<Option<CartEntry>> {
    conn.query_row(
        &format!(
            "SELECT {} FROM cart
             WHERE user_id = ?1 AND item_id = ?2 AND checkout_timestamp IS NULL",
            CART_COLS
        ),
        params![user_id, item_id],
        parse_entry,
    )
    .optional()
    .map_err(StoreError::from)
}

/// Distinguish "never existed" from "already checked out" for a (user,
/// item) pair with no open entry.
fn no_open_entry_error(conn: &Connection, user_id: i64, item_id: i64) -> StoreResult<StoreError> {
    let has_history: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM cart
         WHERE user_id = ?1 AND item_id = ?2 AND checkout_timestamp IS NOT NULL)",
        params![user_id, item_id],
        |row| row.get(0),
    )?;
    Ok(if has_history {
        StoreError::Conflict(format!(
            "cart entry for item {} is already checked out",
            item_id
        ))
    } else {
        StoreError::NotFound(format!("open cart entry for item {}", item_id))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::catalog::{self, CatalogRef};
    use crate::storage::users::{self, make_conn};

    fn seed(conn: &Connection) -> (i64, i64) {
        let user = users::upsert_user(conn, 5, "Dasha", None, None).unwrap();
        let album = catalog::create_album(conn, "Prints", None, 0).unwrap();
        let item =
            catalog::create_item(conn, "Postcard", 2.5, Some(album.id), None, None, 0).unwrap();
        (user.id, item.id)
    }

    // ── add_to_cart ──────────────────────────────────────────────────────────

    #[test]
    fn add_creates_open_entry() {
        let conn = make_conn();
        let (user_id, item_id) = seed(&conn);
        let entry = add_to_cart(&conn, user_id, item_id, 2).unwrap();
        assert_eq!(entry.quantity, 2);
        assert!(entry.is_open());
    }

    #[test]
    fn add_upserts_into_single_open_entry() {
        let conn = make_conn();
        let (user_id, item_id) = seed(&conn);
        let first = add_to_cart(&conn, user_id, item_id, 2).unwrap();
        let second = add_to_cart(&conn, user_id, item_id, 1).unwrap();

        assert_eq!(first.id, second.id, "same (user, item) must reuse the open row");
        assert_eq!(second.quantity, 3, "quantity must accumulate");

        let open_rows: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM cart WHERE user_id = ?1 AND checkout_timestamp IS NULL",
                params![user_id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(open_rows, 1);
    }

    #[test]
    fn add_rejects_zero_quantity() {
        let conn = make_conn();
        let (user_id, item_id) = seed(&conn);
        let err = add_to_cart(&conn, user_id, item_id, 0).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[test]
    fn add_for_missing_user_or_item_is_not_found() {
        let conn = make_conn();
        let (user_id, item_id) = seed(&conn);
        assert!(matches!(
            add_to_cart(&conn, user_id + 99, item_id, 1).unwrap_err(),
            StoreError::NotFound(_)
        ));
        assert!(matches!(
            add_to_cart(&conn, user_id, item_id + 99, 1).unwrap_err(),
            StoreError::NotFound(_)
        ));
    }

    #[test]
    fn add_conflicts_on_non_orderable_item() {
        let conn = make_conn();
        let (user_id, item_id) = seed(&conn);
        catalog::set_orderable(&conn, CatalogRef::Item(item_id), false).unwrap();

        let err = add_to_cart(&conn, user_id, item_id, 1).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn add_conflicts_when_album_not_orderable() {
        let conn = make_conn();
        let (user_id, item_id) = seed(&conn);
        let album_id = catalog::get_item(&conn, item_id).unwrap().album_id.unwrap();
        catalog::set_orderable(&conn, CatalogRef::Album(album_id), false).unwrap();

        let err = add_to_cart(&conn, user_id, item_id, 1).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn hidden_item_is_still_orderable() {
        // Visibility and orderability are independent: hidden items can be
        // ordered via direct link.
        let conn = make_conn();
        let (user_id, item_id) = seed(&conn);
        catalog::set_visibility(&conn, CatalogRef::Item(item_id), false).unwrap();
        assert!(add_to_cart(&conn, user_id, item_id, 1).is_ok());
    }

    // ── update_quantity ──────────────────────────────────────────────────────

    #[test]
    fn update_quantity_sets_absolute_value() {
        let conn = make_conn();
        let (user_id, item_id) = seed(&conn);
        add_to_cart(&conn, user_id, item_id, 2).unwrap();

        let entry = update_quantity(&conn, user_id, item_id, 7).unwrap();
        assert_eq!(entry.quantity, 7);
    }

    #[test]
    fn update_quantity_rejects_zero() {
        let conn = make_conn();
        let (user_id, item_id) = seed(&conn);
        add_to_cart(&conn, user_id, item_id, 2).unwrap();

        let err = update_quantity(&conn, user_id, item_id, 0).unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
        // Entry unchanged after the failed call
        assert_eq!(list_open_cart(&conn, user_id).unwrap()[0].entry.quantity, 2);
    }

    #[test]
    fn update_quantity_without_entry_is_not_found() {
        let conn = make_conn();
        let (user_id, item_id) = seed(&conn);
        let err = update_quantity(&conn, user_id, item_id, 3).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn update_quantity_on_checked_out_entry_conflicts() {
        let conn = make_conn();
        let (user_id, item_id) = seed(&conn);
        add_to_cart(&conn, user_id, item_id, 2).unwrap();
        checkout(&conn, user_id).unwrap();

        let err = update_quantity(&conn, user_id, item_id, 5).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        // History is unchanged after the failed call
        let quantity: i64 = conn
            .query_row(
                "SELECT quantity FROM cart WHERE user_id = ?1 AND item_id = ?2",
                params![user_id, item_id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(quantity, 2);
    }

    // ── remove_from_cart ─────────────────────────────────────────────────────

    #[test]
    fn remove_deletes_open_entry() {
        let conn = make_conn();
        let (user_id, item_id) = seed(&conn);
        add_to_cart(&conn, user_id, item_id, 1).unwrap();

        remove_from_cart(&conn, user_id, item_id).unwrap();
        assert!(list_open_cart(&conn, user_id).unwrap().is_empty());
    }

    #[test]
    fn remove_without_entry_is_not_found() {
        let conn = make_conn();
        let (user_id, item_id) = seed(&conn);
        let err = remove_from_cart(&conn, user_id, item_id).unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn remove_checked_out_entry_conflicts() {
        let conn = make_conn();
        let (user_id, item_id) = seed(&conn);
        add_to_cart(&conn, user_id, item_id, 1).unwrap();
        checkout(&conn, user_id).unwrap();

        let err = remove_from_cart(&conn, user_id, item_id).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    // ── list_open_cart ───────────────────────────────────────────────────────

    #[test]
    fn list_open_cart_resolves_live_price() {
        let conn = make_conn();
        let (user_id, item_id) = seed(&conn);
        add_to_cart(&conn, user_id, item_id, 3).unwrap();

        let lines = list_open_cart(&conn, user_id).unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].item_title, "Postcard");
        assert_eq!(lines[0].unit_price, 2.5);
        assert_eq!(lines[0].line_total(), 7.5);
    }

    #[test]
    fn list_open_cart_orders_by_creation() {
        let conn = make_conn();
        let (user_id, first_item) = seed(&conn);
        let second_item =
            catalog::create_item(&conn, "Sticker", 1.0, None, None, None, 0).unwrap();
        add_to_cart(&conn, user_id, first_item, 1).unwrap();
        add_to_cart(&conn, user_id, second_item.id, 1).unwrap();

        let lines = list_open_cart(&conn, user_id).unwrap();
        let items: Vec<_> = lines.iter().map(|l| l.entry.item_id).collect();
        assert_eq!(items, vec![first_item, second_item.id]);
    }

    // ── checkout ─────────────────────────────────────────────────────────────

    #[test]
    fn checkout_stamps_shared_timestamp_and_empties_cart() {
        let conn = make_conn();
        let (user_id, first_item) = seed(&conn);
        let second_item =
            catalog::create_item(&conn, "Sticker", 1.0, None, None, None, 0).unwrap();
        add_to_cart(&conn, user_id, first_item, 2).unwrap();
        add_to_cart(&conn, user_id, second_item.id, 1).unwrap();

        let entries = checkout(&conn, user_id).unwrap();
        assert_eq!(entries.len(), 2);
        let stamp = entries[0].checkout_timestamp.clone().unwrap();
        assert!(
            entries.iter().all(|e| e.checkout_timestamp.as_deref() == Some(stamp.as_str())),
            "all entries of one checkout must share the timestamp"
        );
        assert!(list_open_cart(&conn, user_id).unwrap().is_empty());
    }

    #[test]
    fn checkout_of_empty_cart_conflicts() {
        let conn = make_conn();
        let (user_id, _) = seed(&conn);
        let err = checkout(&conn, user_id).unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[test]
    fn checkout_does_not_touch_other_users() {
        let conn = make_conn();
        let (user_id, item_id) = seed(&conn);
        let other = users::upsert_user(&conn, 6, "Stan", None, None).unwrap();
        add_to_cart(&conn, user_id, item_id, 1).unwrap();
        add_to_cart(&conn, other.id, item_id, 4).unwrap();

        checkout(&conn, user_id).unwrap();

        let other_cart = list_open_cart(&conn, other.id).unwrap();
        assert_eq!(other_cart.len(), 1);
        assert_eq!(other_cart[0].entry.quantity, 4);
    }

    #[test]
    fn add_after_checkout_opens_a_fresh_entry() {
        let conn = make_conn();
        let (user_id, item_id) = seed(&conn);
        add_to_cart(&conn, user_id, item_id, 2).unwrap();
        checkout(&conn, user_id).unwrap();

        let entry = add_to_cart(&conn, user_id, item_id, 1).unwrap();
        assert_eq!(entry.quantity, 1, "checked-out history must not absorb new adds");

        let total_rows: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM cart WHERE user_id = ?1 AND item_id = ?2",
                params![user_id, item_id],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(total_rows, 2, "history row plus the new open row");
    }

    // ── receipt payload ──────────────────────────────────────────────────────

    #[test]
    fn checked_out_entry_serializes_with_schema_field_names() {
        let conn = make_conn();
        let (user_id, item_id) = seed(&conn);
        add_to_cart(&conn, user_id, item_id, 3).unwrap();
        let entries = checkout(&conn, user_id).unwrap();

        let value = serde_json::to_value(&entries[0]).unwrap();
        assert_eq!(value["user_id"], user_id);
        assert_eq!(value["item_id"], item_id);
        assert_eq!(value["quantity"], 3);
        assert!(value["checkout_timestamp"].is_string());
        assert!(value["created_at"].is_string());
    }
}
