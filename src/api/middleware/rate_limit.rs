//! Layered rate limiting for `/api` requests
//!
//! Every `/api` request is charged against one or two policies from the
//! [`RateLimiterBank`]: login and registration attempts are keyed by client
//! address, writes and general traffic by caller identity. Runs before
//! authentication, so a throttled request never reaches Argon2.
//!
//! Two layers: [`rate_limit`] admits or rejects and leaves a
//! [`RateLimitInfo`] on admitted requests; [`rate_limit_headers`], layered
//! inside it, turns that annotation into `X-RateLimit-*` response headers.

use crate::api::handlers::AppState;
use crate::core::rate_limiter::{
    identity_key, policy_description, RateLimitDecision, RateLimitPolicy,
};
use axum::{
    extract::{ConnectInfo, Request, State},
    http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde_json::json;
use std::net::{IpAddr, SocketAddr};
use std::time::Instant;

pub const RATE_LIMIT_LIMIT_HEADER: &str = "x-ratelimit-limit";
pub const RATE_LIMIT_REMAINING_HEADER: &str = "x-ratelimit-remaining";
pub const RATE_LIMIT_TYPE_HEADER: &str = "x-ratelimit-type";
pub const RATE_LIMIT_POLICY_HEADER: &str = "x-ratelimit-policy";

/// Headers browsers may read from `/api` responses
pub const EXPOSED_HEADERS: &str =
    "X-RateLimit-Limit, X-RateLimit-Remaining, X-RateLimit-Type, X-RateLimit-Policy, Retry-After";

const API_PREFIX: &str = "/api";
const LOGIN_PATH: &str = "/api/auth/login";
const REGISTER_PATH: &str = "/api/auth/register";
const AUTH_PREFIX: &str = "/api/auth/";

/// Annotation left on admitted requests for the response phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitInfo {
    pub remaining: u32,
    pub limit: u32,
    pub policy: RateLimitPolicy,
}

impl From<&RateLimitDecision> for RateLimitInfo {
    fn from(decision: &RateLimitDecision) -> Self {
        Self {
            remaining: decision.remaining,
            limit: decision.limit,
            policy: decision.policy,
        }
    }
}

/// A request refused by one of the policies
#[derive(Debug, Clone)]
pub struct RateLimitExceeded {
    pub policy: RateLimitPolicy,
    pub limit: u32,
    pub retry_after_secs: u64,
}

impl RateLimitExceeded {
    fn from_decision(decision: &RateLimitDecision, now: Instant) -> Self {
        Self {
            policy: decision.policy,
            limit: decision.limit,
            retry_after_secs: decision.retry_after_secs(now),
        }
    }
}

impl IntoResponse for RateLimitExceeded {
    fn into_response(self) -> Response {
        let now = Utc::now();
        let details = format!(
            "Too many requests. Limit: {} ({}) for {}. Try again in {} seconds.",
            self.limit,
            self.policy.description(),
            self.policy.name(),
            self.retry_after_secs
        );

        let body = json!({
            "error": true,
            "code": 429,
            "message": "Rate limit exceeded",
            "details": details,
            "limit_type": self.policy.name(),
            "retry_after": now.timestamp() + self.retry_after_secs as i64,
            "timestamp": now.format("%Y-%m-%d %H:%M:%S").to_string(),
        });

        let mut response = (StatusCode::TOO_MANY_REQUESTS, Json(body)).into_response();
        let headers = response.headers_mut();
        headers.insert(RATE_LIMIT_LIMIT_HEADER, HeaderValue::from(self.limit));
        headers.insert(RATE_LIMIT_REMAINING_HEADER, HeaderValue::from_static("0"));
        headers.insert(
            RATE_LIMIT_TYPE_HEADER,
            HeaderValue::from_static(self.policy.name()),
        );
        headers.insert(
            axum::http::header::RETRY_AFTER,
            HeaderValue::from(self.retry_after_secs),
        );
        response
    }
}

fn is_write(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

/// Client address used as the rate-limit key
///
/// Proxy headers are honored only when `trust_proxy_headers` is set;
/// otherwise the socket peer address is used, falling back to loopback when
/// no connection info is available.
pub fn client_ip(request: &Request, trust_proxy_headers: bool) -> IpAddr {
    if trust_proxy_headers {
        if let Some(ip) = forwarded_ip(request.headers()) {
            return ip;
        }
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::from([127, 0, 0, 1]))
}

fn forwarded_ip(headers: &HeaderMap) -> Option<IpAddr> {
    let from_forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .and_then(|first| first.trim().parse().ok());

    from_forwarded.or_else(|| {
        headers
            .get("x-real-ip")
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.trim().parse().ok())
    })
}

/// Rate limiting middleware
pub async fn rate_limit(State(state): State<AppState>, mut request: Request, next: Next) -> Response {
    let path = request.uri().path().to_string();
    if !path.starts_with(API_PREFIX) {
        return next.run(request).await;
    }

    if !state.config.rate_limit.enabled {
        return next.run(request).await;
    }

    let ip = client_ip(&request, state.config.rate_limit.trust_proxy_headers).to_string();
    let limiter = &state.rate_limiter;

    let decision = if path.contains(LOGIN_PATH) {
        limiter.consume(RateLimitPolicy::Login, &ip).await
    } else if path.contains(REGISTER_PATH) {
        limiter.consume(RateLimitPolicy::Registration, &ip).await
    } else {
        let principal = state.authenticator.identify(request.headers()).await;
        let identity = identity_key(principal.as_ref().map(|p| p.id), &ip);

        let write_decision = if is_write(request.method()) && !path.contains(AUTH_PREFIX) {
            Some(
                limiter
                    .consume(RateLimitPolicy::WriteOperations, &identity)
                    .await,
            )
        } else {
            None
        };

        match write_decision {
            Some(decision) if !decision.allowed => decision,
            _ => match principal {
                Some(_) => {
                    limiter
                        .consume(RateLimitPolicy::AuthenticatedUser, &identity)
                        .await
                }
                None => limiter.consume(RateLimitPolicy::AnonymousUser, &ip).await,
            },
        }
    };

    if !decision.allowed {
        tracing::warn!(
            policy = decision.policy.name(),
            client_ip = %ip,
            path = %path,
            "Rate limit exceeded"
        );
        let mut response = RateLimitExceeded::from_decision(&decision, Instant::now()).into_response();
        expose_headers(&mut response);
        return response;
    }

    request
        .extensions_mut()
        .insert(RateLimitInfo::from(&decision));
    next.run(request).await
}

/// Response phase: write the limit headers recorded by [`rate_limit`]
pub async fn rate_limit_headers(request: Request, next: Next) -> Response {
    if !request.uri().path().starts_with(API_PREFIX) {
        return next.run(request).await;
    }

    let info = request.extensions().get::<RateLimitInfo>().copied();
    let mut response = next.run(request).await;
    if let Some(info) = info {
        annotate(&mut response, &info);
    }
    expose_headers(&mut response);
    response
}

fn annotate(response: &mut Response, info: &RateLimitInfo) {
    let headers = response.headers_mut();
    headers.insert(RATE_LIMIT_LIMIT_HEADER, HeaderValue::from(info.limit));
    headers.insert(RATE_LIMIT_REMAINING_HEADER, HeaderValue::from(info.remaining));
    headers.insert(
        RATE_LIMIT_TYPE_HEADER,
        HeaderValue::from_static(info.policy.name()),
    );
    headers.insert(
        RATE_LIMIT_POLICY_HEADER,
        HeaderValue::from_static(policy_description(info.policy.name())),
    );
}

fn expose_headers(response: &mut Response) {
    response.headers_mut().insert(
        HeaderName::from_static("access-control-expose-headers"),
        HeaderValue::from_static(EXPOSED_HEADERS),
    );
}
