use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde_json::{json, Value};

use crate::{
    auth::require_scope,
    error::AppResult,
    schemas::{validate_input, CreateReclamoInput, ReclamoPath, ReclamosQuery, UpdateReclamoInput},
    services::reclamos,
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/reclamos",
            axum::routing::get(list_reclamos).post(create_reclamo),
        )
        .route(
            "/reclamos/{reclamo_id}",
            axum::routing::get(get_reclamo).patch(update_reclamo),
        )
        .route(
            "/reclamos/{reclamo_id}/recordatorio",
            axum::routing::post(send_reminder),
        )
}

async fn list_reclamos(
    State(state): State<AppState>,
    Query(query): Query<ReclamosQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let scope = require_scope(&state, &headers).await?;
    let rows = reclamos::list_reclamos(&state, &scope, query).await?;
    Ok(Json(json!({ "data": rows })))
}

async fn create_reclamo(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreateReclamoInput>,
) -> AppResult<impl IntoResponse> {
    let scope = require_scope(&state, &headers).await?;
    validate_input(&payload)?;
    let created = reclamos::create_reclamo(&state, &scope, payload).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_reclamo(
    State(state): State<AppState>,
    Path(path): Path<ReclamoPath>,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    let scope = require_scope(&state, &headers).await?;
    let detalle = reclamos::get_reclamo(&state, &scope, path.reclamo_id).await?;
    Ok(Json(detalle))
}

async fn update_reclamo(
    State(state): State<AppState>,
    Path(path): Path<ReclamoPath>,
    headers: HeaderMap,
    Json(payload): Json<UpdateReclamoInput>,
) -> AppResult<impl IntoResponse> {
    let scope = require_scope(&state, &headers).await?;
    validate_input(&payload)?;
    let updated = reclamos::update_reclamo(&state, &scope, path.reclamo_id, payload).await?;
    Ok(Json(updated))
}

async fn send_reminder(
    State(state): State<AppState>,
    Path(path): Path<ReclamoPath>,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    let scope = require_scope(&state, &headers).await?;
    reclamos::send_reminder(&state, &scope, path.reclamo_id).await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "queued": true }))))
}
