//! REST API module
//!
//! - Routing and request handling
//! - Trace ID and rate limiting middleware
//! - JSON-rejecting extractors and request/response models

pub mod extract;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod server;

pub use handlers::AppState;
pub use middleware::{trace_id_middleware, TraceId, TRACE_ID_HEADER};
pub use server::ApiServer;
