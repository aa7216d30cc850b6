//! HTTP server
//!
//! Builds the router with its middleware stack, serves it with connect-info
//! so the rate limiter sees peer addresses, runs the limiter reaper and
//! shuts down gracefully on Ctrl+C or SIGTERM.

use crate::api::handlers::AppState;
use crate::api::middleware::{rate_limit, rate_limit_headers, trace_id_middleware};
use crate::api::routes::build_api_routes;
use crate::core::config::{Config, ServerConfig};
use crate::core::rate_limiter::RateLimiterBank;
use crate::db::DatabaseManager;
use axum::{
    error_handling::HandleErrorLayer,
    http::StatusCode,
    middleware,
    response::{IntoResponse, Response},
    Json, Router,
};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::{signal, task::JoinHandle};
use tower::{timeout::TimeoutLayer, BoxError, ServiceBuilder};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

/// HTTP API Server
pub struct ApiServer {
    router: Router,
    config: ServerConfig,
    state: AppState,
}

impl ApiServer {
    pub fn new(config: Config, db: Arc<DatabaseManager>) -> anyhow::Result<Self> {
        let server_config = config.server.clone();
        let state = AppState::new(config, db)?;
        let router = Self::build_router(state.clone());

        Ok(Self {
            router,
            config: server_config,
            state,
        })
    }

    /// Routes wrapped in the middleware stack
    ///
    /// Request order: trace ID, rate limiting, rate-limit headers,
    /// authentication, handler.
    pub fn build_router(state: AppState) -> Router {
        let timeout = Duration::from_secs(state.config.server.request_timeout);
        let cors = Self::build_cors_layer(&state.config.security.allowed_origins);

        build_api_routes(state.clone())
            .layer(middleware::from_fn(rate_limit_headers))
            .layer(middleware::from_fn_with_state(state.clone(), rate_limit))
            .layer(middleware::from_fn(trace_id_middleware))
            .layer(
                ServiceBuilder::new()
                    .layer(TraceLayer::new_for_http())
                    .layer(cors)
                    .layer(HandleErrorLayer::new(handle_timeout_error))
                    .layer(TimeoutLayer::new(timeout)),
            )
    }

    /// Build CORS layer from allowed origins configuration
    fn build_cors_layer(allowed_origins: &[String]) -> CorsLayer {
        let cors = CorsLayer::new().allow_methods(Any).allow_headers(Any);

        if allowed_origins.iter().any(|origin| origin == "*") {
            cors.allow_origin(Any)
        } else {
            let origins: Vec<_> = allowed_origins
                .iter()
                .filter_map(|origin| origin.parse().ok())
                .collect();
            cors.allow_origin(origins)
        }
    }

    /// Start the HTTP server and the limiter reaper; returns after graceful shutdown
    pub async fn serve(self) -> anyhow::Result<()> {
        let addr = format!("{}:{}", self.config.host, self.config.port);
        let socket_addr: SocketAddr = addr.parse()?;

        info!(
            host = %self.config.host,
            port = self.config.port,
            request_timeout = self.config.request_timeout,
            rate_limit_enabled = self.state.config.rate_limit.enabled,
            "Starting HTTP server"
        );

        let reaper = spawn_rate_limit_reaper(
            self.state.rate_limiter.clone(),
            Duration::from_secs(self.state.config.rate_limit.cleanup_interval),
        );

        let listener = tokio::net::TcpListener::bind(socket_addr).await?;
        info!(addr = %socket_addr, "HTTP server listening");

        let result = axum::serve(
            listener,
            self.router
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await;

        reaper.abort();
        result?;

        info!("HTTP server shut down gracefully");
        Ok(())
    }
}

/// Periodically drop rate-limit buckets whose window has passed
fn spawn_rate_limit_reaper(limiter: Arc<RateLimiterBank>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.tick().await;
        loop {
            interval.tick().await;
            let removed = limiter.cleanup_expired().await;
            if removed > 0 {
                tracing::debug!(removed, "Expired rate limit buckets removed");
            }
        }
    })
}

async fn handle_timeout_error(err: BoxError) -> Response {
    if err.is::<tower::timeout::error::Elapsed>() {
        (
            StatusCode::REQUEST_TIMEOUT,
            Json(json!({
                "error": "RequestTimeout",
                "code": StatusCode::REQUEST_TIMEOUT.as_u16(),
                "message": "Request timed out",
            })),
        )
            .into_response()
    } else {
        tracing::error!(error = %err, "Unhandled middleware error");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({
                "error": "InternalError",
                "code": StatusCode::INTERNAL_SERVER_ERROR.as_u16(),
                "message": "Internal server error",
            })),
        )
            .into_response()
    }
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }

    info!("Initiating graceful shutdown...");
}
