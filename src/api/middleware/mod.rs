pub mod rate_limit;
pub mod trace;

pub use rate_limit::{rate_limit, rate_limit_headers, RateLimitExceeded, RateLimitInfo};
pub use trace::{trace_id_middleware, TraceId, TRACE_ID_HEADER};
