//! Core application layer
//!
//! - Configuration management
//! - Structured logging
//! - Error handling and response formatting
//! - Rate limiter bank

pub mod config;
pub mod error;
pub mod logging;
pub mod rate_limiter;

pub use config::Config;
pub use error::{AppError, AuthFailure, ErrorContext, ErrorResponse, Result};
pub use logging::Logger;
pub use rate_limiter::{RateLimitDecision, RateLimitPolicy, RateLimiterBank};
