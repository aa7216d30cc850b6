use super::AppState;
use crate::api::models::{ComponentHealth, ComponentStatus, ComponentsHealth, HealthResponse, HealthStatus};
use crate::api::extract::Json;
use axum::{extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;

/// Handler for GET /health - liveness and database reachability
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let database = check_database_health(&state).await;
    let rate_limiter = ComponentHealth {
        status: ComponentStatus::Healthy,
        message: None,
        details: Some(serde_json::json!({
            "enabled": state.config.rate_limit.enabled,
            "active_buckets": state.rate_limiter.bucket_count().await,
        })),
    };

    let status = if database.status == ComponentStatus::Healthy {
        HealthStatus::Healthy
    } else {
        HealthStatus::Unhealthy
    };
    let code = match status {
        HealthStatus::Healthy => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    let response = HealthResponse {
        status,
        components: ComponentsHealth {
            database,
            rate_limiter,
        },
        version: env!("CARGO_PKG_VERSION"),
        timestamp: Utc::now().to_rfc3339(),
    };

    (code, Json(response))
}

async fn check_database_health(state: &AppState) -> ComponentHealth {
    let probe = state
        .db
        .execute(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM restaurants", [], |row| row.get(0))?;
            Ok(count)
        })
        .await;

    match probe {
        Ok(restaurants) => ComponentHealth {
            status: ComponentStatus::Healthy,
            message: Some("Database is operational".to_string()),
            details: Some(serde_json::json!({
                "restaurants": restaurants,
                "pool_size": state.db.pool_size(),
            })),
        },
        Err(e) => {
            tracing::error!(error = %e, "Database health check failed");
            ComponentHealth {
                status: ComponentStatus::Unhealthy,
                message: Some(format!("Database error: {}", e)),
                details: None,
            }
        }
    }
}
