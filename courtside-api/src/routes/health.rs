use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use diesel::prelude::*;
use std::sync::Arc;

use courtside_shared::{HealthCheck, HealthResponse, HealthStatus};

use crate::AppState;

fn database_check(state: &AppState) -> Result<(), String> {
    let mut conn = state.db.get().map_err(|e| e.to_string())?;
    diesel::sql_query("SELECT 1")
        .execute(&mut conn)
        .map(|_| ())
        .map_err(|e| e.to_string())
}

/// Probes the database and Redis.
pub async fn health_check(State(state): State<Arc<AppState>>) -> Response {
    let checks = vec![
        HealthCheck::from_result("database", database_check(&state)),
        HealthCheck::from_result("redis", state.redis.ping().await),
    ];

    let response = HealthResponse::healthy("courtside-api", env!("CARGO_PKG_VERSION"))
        .with_checks(checks);

    let status = match response.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status, Json(response)).into_response()
}

/// Returns Prometheus metrics.
pub async fn metrics(State(state): State<Arc<AppState>>) -> String {
    state.metrics_handle.render()
}
