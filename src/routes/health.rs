use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};
use std::time::Duration;

use crate::{error::AppError, state::AppState};

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    // Short timeout so the healthcheck answers even if the first connection hangs.
    let db = match tokio::time::timeout(Duration::from_secs(3), state.store.ping()).await {
        Ok(Ok(())) => "ok",
        Ok(Err(AppError::Dependency(_))) => "unconfigured",
        Ok(Err(error)) => {
            tracing::error!(error = %error, "Health check DB query failed");
            "error"
        }
        Err(_) => {
            tracing::error!("Health check DB query timed out (3s)");
            "error"
        }
    };

    let status = if db == "error" { "degraded" } else { "ok" };
    Json(json!({
        "status": status,
        "now": Utc::now().to_rfc3339(),
        "db": db
    }))
}
