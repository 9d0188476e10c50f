//! Lavka core — the data and ordering layer behind the Telegram shop.
//!
//! This library owns the catalog (albums, items, photos), per-user
//! favorites, the shopping cart with its checkout transition, and the
//! administrator allow-list. The bot handlers and the mini-app routes call
//! into it; nothing here knows about Telegram or HTTP.
//!
//! # Module Structure
//!
//! - `core`: error taxonomy and environment configuration
//! - `storage`: connection pool, migrations, and one module per store

#![allow(clippy::too_many_arguments)]

pub mod core;
pub mod storage;

// Re-export commonly used types for convenience
pub use crate::core::{StoreError, StoreResult};
pub use crate::storage::{create_pool, get_connection, DbConnection, DbPool};
