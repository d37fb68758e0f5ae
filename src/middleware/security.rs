use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use http::{header::HOST, HeaderValue};

use crate::{error::AppError, state::AppState};

/// Rejects requests whose `Host` is not in `TRUSTED_HOSTS`. A `*` entry
/// disables the check.
pub async fn enforce_trusted_hosts(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    if host_allowed(&state.config.trusted_hosts, request.headers().get(HOST)) {
        return next.run(request).await;
    }

    tracing::warn!(
        host = ?request.headers().get(HOST),
        "rejected request for untrusted host"
    );
    AppError::Forbidden("Forbidden: untrusted host.".to_string()).into_response()
}

fn host_allowed(trusted: &[String], host: Option<&HeaderValue>) -> bool {
    if trusted.is_empty() || trusted.iter().any(|entry| entry.trim() == "*") {
        return true;
    }
    let Some(host) = host.and_then(|value| value.to_str().ok()) else {
        return false;
    };
    let hostname = host
        .rsplit_once(':')
        .filter(|(_, port)| port.chars().all(|c| c.is_ascii_digit()))
        .map_or(host, |(name, _)| name)
        .trim()
        .to_ascii_lowercase();

    trusted.iter().any(|entry| {
        let entry = entry.trim().to_ascii_lowercase();
        match entry.strip_prefix("*.") {
            Some(suffix) => hostname.ends_with(&format!(".{suffix}")),
            None => hostname == entry,
        }
    })
}
