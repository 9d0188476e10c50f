//! Database pool, migrations, and the stores
//!
//! One module per store: `users`, `catalog`, `cart`, `favorites`, `admin`.
//! All query functions take a plain `&rusqlite::Connection` so they work
//! both with pooled connections and with in-memory test connections.

pub mod admin;
pub mod cart;
pub mod catalog;
pub mod db;
pub mod favorites;
pub mod migrations;
pub mod users;

// Re-exports for convenience
pub use db::{create_pool, get_connection, DbConnection, DbPool};
