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
    schemas::{
        validate_input, AgendaQuery, BloqueoPath, CreateBloqueoInput, ProfesionalPath, TenantQuery,
    },
    services::availability,
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route(
            "/agenda/{profesional_id}/bloqueos",
            axum::routing::get(list_blocks).post(create_manual_block),
        )
        .route(
            "/agenda/bloqueos/{bloqueo_id}",
            axum::routing::delete(delete_manual_block),
        )
}

async fn list_blocks(
    State(state): State<AppState>,
    Path(path): Path<ProfesionalPath>,
    Query(query): Query<AgendaQuery>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let scope = require_scope(&state, &headers).await?;
    let blocks = availability::list_blocks(&state, &scope, path.profesional_id, query).await?;
    Ok(Json(json!({ "data": blocks })))
}

async fn create_manual_block(
    State(state): State<AppState>,
    Path(path): Path<ProfesionalPath>,
    headers: HeaderMap,
    Json(payload): Json<CreateBloqueoInput>,
) -> AppResult<impl IntoResponse> {
    let scope = require_scope(&state, &headers).await?;
    validate_input(&payload)?;
    let block =
        availability::create_manual_block(&state, &scope, path.profesional_id, payload).await?;
    Ok((StatusCode::CREATED, Json(block)))
}

async fn delete_manual_block(
    State(state): State<AppState>,
    Path(path): Path<BloqueoPath>,
    Query(query): Query<TenantQuery>,
    headers: HeaderMap,
) -> AppResult<impl IntoResponse> {
    let scope = require_scope(&state, &headers).await?;
    availability::delete_manual_block(&state, &scope, path.bloqueo_id, query.empresa_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
