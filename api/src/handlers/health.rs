use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};

use crate::handlers::ErrorResponse;
use crate::state::AppState;

/// Health check endpoint; pings the metadata store
#[tracing::instrument(skip(state))]
pub async fn health_check(State(state): State<AppState>) -> Result<impl IntoResponse, ErrorResponse> {
    state.db_pool.health_check().await.map_err(|e| {
        ErrorResponse::new("service_unavailable", format!("Metadata store unavailable: {}", e))
    })?;

    Ok((StatusCode::OK, Json(serde_json::json!({ "status": "ok" }))))
}

/// Liveness probe
pub async fn ping() -> &'static str {
    "pong"
}
