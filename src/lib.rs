//! Restaurant API Library
//!
//! API key authentication and layered rate limiting in front of a
//! restaurant search REST API.

pub mod api;
pub mod auth;
pub mod commands;
pub mod core;
pub mod db;

// Re-export commonly used types
pub use api::ApiServer;
pub use crate::core::{Config, Logger};
pub use db::DatabaseManager;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
