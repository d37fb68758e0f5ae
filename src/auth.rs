use axum::http::HeaderMap;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::{
    config::AppConfig,
    error::{AppError, AppResult},
    models::{DbId, Role},
    state::AppState,
    tenancy::{resolve_scope, Scope},
};

/// Names the acting user directly when dev overrides are enabled.
pub const DEV_USER_HEADER: &str = "x-user-id";

/// HS256 access-token claims.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub empresa_id: Option<DbId>,
    pub exp: usize,
}

/// Who the caller claims to be. Only trusted after [`resolve_scope`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: DbId,
    pub role: Option<Role>,
    pub empresa_id: Option<DbId>,
}

pub async fn require_scope(state: &AppState, headers: &HeaderMap) -> AppResult<Scope> {
    let identity = identity_from_headers(&state.config, headers)?;
    resolve_scope(state, &identity).await
}

pub fn identity_from_headers(config: &AppConfig, headers: &HeaderMap) -> AppResult<Identity> {
    if config.auth_dev_overrides_enabled() {
        let dev_user: Option<DbId> =
            header_str(headers, DEV_USER_HEADER).and_then(|raw| raw.parse().ok());
        if let Some(user_id) = dev_user {
            return Ok(Identity {
                user_id,
                role: None,
                empresa_id: None,
            });
        }
    }

    let token = bearer_token(headers).ok_or_else(|| {
        AppError::Unauthorized("Unauthorized: missing bearer token.".to_string())
    })?;
    let secret = config
        .jwt_secret
        .as_deref()
        .filter(|secret| !secret.is_empty())
        .ok_or_else(|| AppError::Dependency("JWT_SECRET is not configured.".to_string()))?;

    let claims = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::new(Algorithm::HS256),
    )
    .map_err(|error| {
        tracing::debug!(error = %error, "rejected access token");
        AppError::Unauthorized("Unauthorized: invalid or expired token.".to_string())
    })?
    .claims;

    let user_id = claims.sub.trim().parse::<DbId>().map_err(|_| {
        AppError::Unauthorized("Unauthorized: invalid token subject.".to_string())
    })?;
    let role = match claims.role.as_deref() {
        Some(raw) => Some(Role::parse(raw).ok_or_else(|| {
            AppError::Unauthorized("Unauthorized: invalid token role.".to_string())
        })?),
        None => None,
    };

    Ok(Identity {
        user_id,
        role,
        empresa_id: claims.empresa_id,
    })
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let raw = header_str(headers, "authorization")?;
    let (scheme, token) = raw.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    Some(token.trim()).filter(|token| !token.is_empty())
}
