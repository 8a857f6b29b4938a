use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::sync::Arc;

#[derive(Clone)]
pub struct HealthState {
    pub db: SqlitePool,
}

/// Liveness: the process is up
pub async fn health() -> Json<Value> {
    Json(json!({
        "status": "healthy",
        "service": "identity-auth",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Readiness: the database answers
pub async fn ready(State(state): State<Arc<HealthState>>) -> Result<Json<Value>, StatusCode> {
    let db_ok = sqlx::query("SELECT 1").fetch_one(&state.db).await.is_ok();

    if !db_ok {
        tracing::warn!("Readiness check failed: database unavailable");
        return Err(StatusCode::SERVICE_UNAVAILABLE);
    }

    Ok(Json(json!({
        "status": "ready",
        "database": "connected"
    })))
}

pub fn router(db: SqlitePool) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/ready", get(ready))
        .with_state(Arc::new(HealthState { db }))
}
