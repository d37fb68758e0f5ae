use std::time::Duration;

use sqlx::{postgres::PgPoolOptions, PgPool};

use crate::config::AppConfig;

/// Builds the connection pool without connecting. Connections are opened on
/// first use so the process starts even while the database is unreachable.
///
/// Returns `None` when `DATABASE_URL` is unset; handlers then answer with a
/// dependency error.
pub fn build_pool(config: &AppConfig) -> Result<Option<PgPool>, sqlx::Error> {
    let Some(database_url) = config
        .database_url
        .as_deref()
        .filter(|url| !url.trim().is_empty())
    else {
        tracing::warn!("DATABASE_URL is not set; database-backed endpoints will fail");
        return Ok(None);
    };

    let pool = PgPoolOptions::new()
        .max_connections(config.db_pool_max_connections)
        .min_connections(config.db_pool_min_connections)
        .acquire_timeout(Duration::from_secs(config.db_pool_acquire_timeout_seconds))
        .idle_timeout(Duration::from_secs(config.db_pool_idle_timeout_seconds))
        .connect_lazy(database_url)?;
    Ok(Some(pool))
}
