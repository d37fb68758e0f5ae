use axum::http::{
    header::{HeaderName, ACCEPT, AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use tower_http::cors::{Any, CorsLayer};

use crate::{auth::DEV_USER_HEADER, config::AppConfig, middleware::request_id::REQUEST_ID_HEADER};

pub fn build_cors_layer(config: &AppConfig) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers(allowed_headers(config))
        .expose_headers([HeaderName::from_static(REQUEST_ID_HEADER)]);

    match allowed_origins(config) {
        None => layer.allow_origin(Any).allow_credentials(false),
        Some(origins) => layer.allow_origin(origins).allow_credentials(true),
    }
}

fn allowed_headers(config: &AppConfig) -> Vec<HeaderName> {
    let mut headers = vec![
        ACCEPT,
        AUTHORIZATION,
        CONTENT_TYPE,
        HeaderName::from_static(REQUEST_ID_HEADER),
    ];
    if config.auth_dev_overrides_enabled() {
        headers.push(HeaderName::from_static(DEV_USER_HEADER));
    }
    headers
}

/// `None` means any origin. Unparseable entries are dropped with a warning.
fn allowed_origins(config: &AppConfig) -> Option<Vec<HeaderValue>> {
    if config.cors_origins.iter().any(|origin| origin.trim() == "*") {
        return None;
    }
    let origins = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.trim().parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring invalid CORS origin");
                None
            }
        })
        .collect();
    Some(origins)
}
