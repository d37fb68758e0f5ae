use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};

use crate::{
    auth::require_scope,
    error::AppResult,
    models::Usuario,
    schemas::{AptoRecibirInput, ProfesionalPath},
    services::profesionales,
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new().route(
        "/profesionales/{profesional_id}/apto-recibir",
        axum::routing::patch(set_apto_recibir),
    )
}

async fn set_apto_recibir(
    State(state): State<AppState>,
    Path(path): Path<ProfesionalPath>,
    headers: HeaderMap,
    Json(payload): Json<AptoRecibirInput>,
) -> AppResult<Json<Usuario>> {
    let scope = require_scope(&state, &headers).await?;
    let usuario =
        profesionales::set_apto_recibir(&state, &scope, path.profesional_id, payload).await?;
    Ok(Json(usuario))
}
