use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};

use crate::{
    auth::require_scope,
    error::AppResult,
    models::TenantConfig,
    schemas::{validate_input, TenantQuery, UpdateTenantConfigInput},
    services::tenant_config,
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new().route(
        "/empresa/config",
        axum::routing::get(get_tenant_config).patch(update_tenant_config),
    )
}

async fn get_tenant_config(
    State(state): State<AppState>,
    Query(query): Query<TenantQuery>,
    headers: HeaderMap,
) -> AppResult<Json<TenantConfig>> {
    let scope = require_scope(&state, &headers).await?;
    let config = tenant_config::get_tenant_config(&state, &scope, query.empresa_id).await?;
    Ok(Json(config))
}

async fn update_tenant_config(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<UpdateTenantConfigInput>,
) -> AppResult<Json<TenantConfig>> {
    let scope = require_scope(&state, &headers).await?;
    validate_input(&payload)?;
    let config = tenant_config::update_tenant_config(&state, &scope, payload).await?;
    Ok(Json(config))
}
