use axum::{routing::get, Router};

use crate::state::AppState;

pub mod agenda;
pub mod empresa;
pub mod health;
pub mod profesionales;
pub mod reclamos;

pub fn v1_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .merge(reclamos::router())
        .merge(agenda::router())
        .merge(profesionales::router())
        .merge(empresa::router())
}
