//! Authentication module
//!
//! - API key generation, hashing and rotation
//! - Credential extraction and principal resolution
//! - Authentication middleware and the `/api/auth` handlers

pub mod api_key;
pub mod authenticator;
pub mod handlers;
pub mod middleware;
pub mod models;

pub use api_key::{ApiKey, ApiKeyHasher, ApiKeyService};
pub use authenticator::ApiKeyAuthenticator;
pub use middleware::authenticate;
pub use models::Principal;
