//! Error taxonomy and configuration

pub mod config;
pub mod error;

// Re-exports for convenience
pub use error::{StoreError, StoreResult};
