//! Catalog storage: albums, items and their photos.
//!
//! Visibility and orderability are decoupled on purpose: an item can be
//! browsable but not orderable (sold out for now), or hidden yet still
//! orderable via a direct link. `display_order` is a plain integer sort
//! key, ties broken by id, so reordering one row never rewrites others.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::collections::HashMap;

use crate::core::error::{StoreError, StoreResult};
use crate::storage::db::with_tx;

/// Альбом — группа изделий в каталоге.
#[derive(Debug, Clone, Serialize)]
pub struct Album {
    pub id: i64,
    pub title: String,
    pub display_order: i64,
    pub notes: Option<String>,
    pub is_orderable: bool,
    pub is_visible: bool,
}

/// Изделие (товар) в каталоге.
#[derive(Debug, Clone, Serialize)]
pub struct Item {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub sku: Option<String>,
    pub price: f64,
    pub display_order: i64,
    pub album_id: Option<i64>,
    pub is_orderable: bool,
    pub is_visible: bool,
}

/// Фотография изделия.
#[derive(Debug, Clone, Serialize)]
pub struct Photo {
    pub id: i64,
    pub item_id: i64,
    pub url: String,
    pub description: Option<String>,
    pub display_order: i64,
}

/// An album together with its visible items, as rendered by the shop page.
#[derive(Debug, Clone, Serialize)]
pub struct AlbumListing {
    pub album: Album,
    pub items: Vec<Item>,
}

/// Reference to a togglable catalog entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogRef {
    Album(i64),
    Item(i64),
}

impl CatalogRef {
    fn table(self) -> &'static str {
        match self {
            CatalogRef::Album(_) => "albums",
            CatalogRef::Item(_) => "items",
        }
    }

    fn id(self) -> i64 {
        match self {
            CatalogRef::Album(id) => id,
            CatalogRef::Item(id) => id,
        }
    }
}

fn parse_album(row: &rusqlite::Row<'_>) -> rusqlite::Result<Album> {
    Ok(Album {
        id: row.get(0)?,
        title: row.get(1)?,
        display_order: row.get(2)?,
        notes: row.get(3)?,
        is_orderable: row.get::<_, i64>(4)? != 0,
        is_visible: row.get::<_, i64>(5)? != 0,
    })
}

pub(crate) fn parse_item(row: &rusqlite::Row<'_>) -> rusqlite::Result<Item> {
    Ok(Item {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        sku: row.get(3)?,
        price: row.get(4)?,
        display_order: row.get(5)?,
        album_id: row.get(6)?,
        is_orderable: row.get::<_, i64>(7)? != 0,
        is_visible: row.get::<_, i64>(8)? != 0,
    })
}

fn parse_photo(row: &rusqlite::Row<'_>) -> rusqlite::Result<Photo> {
    Ok(Photo {
        id: row.get(0)?,
        item_id: row.get(1)?,
        url: row.get(2)?,
        description: row.get(3)?,
        display_order: row.get(4)?,
    })
}

const ALBUM_COLS: &str = "id, title, display_order, notes, is_orderable, is_visible";
const ITEM_COLS: &str =
    "id, title, description, sku, price, display_order, album_id, is_orderable, is_visible";

/// Create an album.
pub fn create_album(
    conn: &Connection,
    title: &str,
    notes: Option<&str>,
    display_order: i64,
) -> StoreResult<Album> {
    if title.trim().is_empty() {
        return Err(StoreError::Validation("album title must not be empty".to_string()));
    }

    conn.execute(
        "INSERT INTO albums (title, notes, display_order) VALUES (?1, ?2, ?3)",
        params![title, notes, display_order],
    )?;
    get_album(conn, conn.last_insert_rowid())
}

/// Create an item, optionally attached to an album.
pub fn create_item(
    conn: &Connection,
    title: &str,
    price: f64,
    album_id: Option<i64>,
    sku: Option<&str>,
    description: Option<&str>,
    display_order: i64,
) -> StoreResult<Item> {
    if title.trim().is_empty() {
        return Err(StoreError::Validation("item title must not be empty".to_string()));
    }
    if price < 0.0 {
        return Err(StoreError::Validation(format!("price must not be negative: {}", price)));
    }
    if let Some(album_id) = album_id {
        if !album_exists(conn, album_id)? {
            return Err(StoreError::NotFound(format!("album {}", album_id)));
        }
    }

    conn.execute(
        "INSERT INTO items (title, price, album_id, sku, description, display_order)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![title, price, album_id, sku, description, display_order],
    )?;
    get_item(conn, conn.last_insert_rowid())
}

/// Attach a photo to an item.
pub fn add_photo(
    conn: &Connection,
    item_id: i64,
    url: &str,
    description: Option<&str>,
    display_order: i64,
) -> StoreResult<Photo> {
    if url.trim().is_empty() {
        return Err(StoreError::Validation("photo url must not be empty".to_string()));
    }
    if !item_exists(conn, item_id)? {
        return Err(StoreError::NotFound(format!("item {}", item_id)));
    }

    conn.execute(
        "INSERT INTO photos (item_id, url, description, display_order) VALUES (?1, ?2, ?3, ?4)",
        params![item_id, url, description, display_order],
    )?;
    let id = conn.last_insert_rowid();
    conn.query_row(
        "SELECT id, item_id, url, description, display_order FROM photos WHERE id = ?1",
        params![id],
        parse_photo,
    )
    .map_err(StoreError::from)
}

/// Get an album by id.
pub fn get_album(conn: &Connection, album_id: i64) -> StoreResult<Album> {
    conn.query_row(
        &format!("SELECT {} FROM albums WHERE id = ?1", ALBUM_COLS),
        params![album_id],
        parse_album,
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("album {}", album_id)))
}

/// Get an item by id.
pub fn get_item(conn: &Connection, item_id: i64) -> StoreResult<Item> {
    conn.query_row(
        &format!("SELECT {} FROM items WHERE id = ?1", ITEM_COLS),
        params![item_id],
        parse_item,
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("item {}", item_id)))
}

/// Photos of an item, in display order.
pub fn list_photos(conn: &Connection, item_id: i64) -> StoreResult<Vec<Photo>> {
    let mut stmt = conn.prepare(
        "SELECT id, item_id, url, description, display_order FROM photos
         WHERE item_id = ?1 ORDER BY display_order ASC, id ASC",
    )?;
    let rows = stmt.query_map(params![item_id], parse_photo)?;

    let mut photos = Vec::new();
    for row in rows {
        photos.push(row?);
    }
    Ok(photos)
}

/// Show or hide an album/item. Idempotent: setting the current state again
/// is not an error.
pub fn set_visibility(conn: &Connection, entity: CatalogRef, is_visible: bool) -> StoreResult<()> {
    set_flag(conn, entity, "is_visible", is_visible)
}

/// Allow or forbid new cart additions for an album/item. Independent of
/// visibility.
pub fn set_orderable(conn: &Connection, entity: CatalogRef, is_orderable: bool) -> StoreResult<()> {
    set_flag(conn, entity, "is_orderable", is_orderable)
}

fn set_flag(conn: &Connection, entity: CatalogRef, column: &str, value: bool) -> StoreResult<()> {
    let affected = conn.execute(
        &format!("UPDATE {} SET {} = ?1 WHERE id = ?2", entity.table(), column),
        params![value as i64, entity.id()],
    )?;
    if affected == 0 {
        return Err(StoreError::NotFound(format!("{} {}", entity.table(), entity.id())));
    }
    Ok(())
}

/// The browsable catalog: albums with their items, both ordered by
/// (display_order, id).
///
/// With `include_hidden = false`, hidden albums and hidden items are
/// omitted, and items of a hidden album are omitted regardless of their own
/// flag. Items without an album do not appear here at all — the shop page
/// is album-driven; such items stay reachable via [`get_item`].
pub fn list_catalog(conn: &Connection, include_hidden: bool) -> StoreResult<Vec<AlbumListing>> {
    let album_filter = if include_hidden { "" } else { " WHERE is_visible = 1" };
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM albums{} ORDER BY display_order ASC, id ASC",
        ALBUM_COLS, album_filter
    ))?;
    let rows = stmt.query_map([], parse_album)?;

    let mut albums = Vec::new();
    for row in rows {
        albums.push(row?);
    }

    let item_filter = if include_hidden { "" } else { " AND is_visible = 1" };
    let mut stmt = conn.prepare(&format!(
        "SELECT {} FROM items WHERE album_id IS NOT NULL{} ORDER BY display_order ASC, id ASC",
        ITEM_COLS, item_filter
    ))?;
    let rows = stmt.query_map([], parse_item)?;

    let mut by_album: HashMap<i64, Vec<Item>> = HashMap::new();
    for row in rows {
        let item = row?;
        if let Some(album_id) = item.album_id {
            by_album.entry(album_id).or_default().push(item);
        }
    }

    Ok(albums
        .into_iter()
        .map(|album| {
            let items = by_album.remove(&album.id).unwrap_or_default();
            AlbumListing { album, items }
        })
        .collect())
}

/// Delete an item, cascading to its photos, favorites rows and *open* cart
/// entries.
///
/// Fails with [`StoreError::Conflict`] while any checked-out cart entry
/// references the item: checkout history is immutable and must keep its
/// item reference.
pub fn delete_item(conn: &Connection, item_id: i64) -> StoreResult<()> {
    with_tx(conn, |tx| {
        if !item_exists(tx, item_id)? {
            return Err(StoreError::NotFound(format!("item {}", item_id)));
        }

        let checked_out: i64 = tx.query_row(
            "SELECT COUNT(*) FROM cart WHERE item_id = ?1 AND checkout_timestamp IS NOT NULL",
            params![item_id],
            |row| row.get(0),
        )?;
        if checked_out > 0 {
            return Err(StoreError::Conflict(format!(
                "item {} is referenced by {} checked-out cart entries",
                item_id, checked_out
            )));
        }

        tx.execute("DELETE FROM photos WHERE item_id = ?1", params![item_id])?;
        tx.execute("DELETE FROM favorites WHERE item_id = ?1", params![item_id])?;
        tx.execute(
            "DELETE FROM cart WHERE item_id = ?1 AND checkout_timestamp IS NULL",
            params![item_id],
        )?;
        tx.execute("DELETE FROM items WHERE id = ?1", params![item_id])?;

        log::info!("Deleted item {} with its photos, favorites and open cart rows", item_id);
        Ok(())
    })
}

/// Delete an album. Fails with [`StoreError::Conflict`] while any item
/// still references it, so purchasable goods are never orphaned silently.
pub fn delete_album(conn: &Connection, album_id: i64) -> StoreResult<()> {
    with_tx(conn, |tx| {
        if !album_exists(tx, album_id)? {
            return Err(StoreError::NotFound(format!("album {}", album_id)));
        }

        let referencing: i64 = tx.query_row(
            "SELECT COUNT(*) FROM items WHERE album_id = ?1",
            params![album_id],
            |row| row.get(0),
        )?;
        if referencing > 0 {
            return Err(StoreError::Conflict(format!(
                "album {} still has {} items",
                album_id, referencing
            )));
        }

        tx.execute("DELETE FROM albums WHERE id = ?1", params![album_id])?;
        Ok(())
    })
}

fn album_exists(conn: &Connection, album_id: i64) -> StoreResult<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM albums WHERE id = ?1)",
        params![album_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

pub(crate) fn item_exists(conn: &Connection, item_id: i64) -> StoreResult<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM items WHERE id = ?1)",
        params![item_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}
