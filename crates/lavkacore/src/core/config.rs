use once_cell::sync::Lazy;
use std::env;

/// Configuration for the storage core

/// Path to the SQLite database file
/// Read once at startup from the DATABASE_PATH environment variable
/// Defaults to "lavka.sqlite" in the working directory
pub static DATABASE_PATH: Lazy<String> =
    Lazy::new(|| env::var("DATABASE_PATH").unwrap_or_else(|_| "lavka.sqlite".to_string()));

/// Connection pool configuration
pub mod pool {
    /// Maximum number of pooled SQLite connections
    pub const MAX_SIZE: u32 = 10;

    /// SQLite busy timeout in milliseconds. Writers queue on the database
    /// lock instead of failing fast, which is what keeps concurrent
    /// same-user cart calls serialized rather than erroring.
    pub const BUSY_TIMEOUT_MS: u32 = 5_000;
}
