use std::{sync::Arc, time::Duration};

use moka::future::Cache;

use crate::{
    config::AppConfig,
    error::{AppError, AppResult},
    models::{DbId, TenantConfig},
    repository::store::{Store, TenantConfigPatch},
    schemas::UpdateTenantConfigInput,
    state::AppState,
    tenancy::{Capability, Scope},
};

/// Cached lookup of per-company settings.
#[derive(Clone)]
pub struct TenantConfigResolver {
    store: Arc<dyn Store>,
    cache: Cache<DbId, TenantConfig>,
}

impl TenantConfigResolver {
    pub fn new(store: Arc<dyn Store>, config: &AppConfig) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.tenant_config_cache_max_entries)
            .time_to_live(Duration::from_secs(config.tenant_config_cache_ttl_seconds))
            .build();
        Self { store, cache }
    }

    /// A company without a configuration row is a data error, not a client one.
    pub async fn resolve(&self, empresa_id: DbId) -> AppResult<TenantConfig> {
        if let Some(config) = self.cache.get(&empresa_id).await {
            return Ok(config);
        }

        let config = self
            .store
            .tenant_config(empresa_id)
            .await?
            .ok_or_else(|| {
                tracing::error!(empresa_id, "company has no configuration row");
                AppError::Internal(format!("Company {empresa_id} has no configuration."))
            })?;
        self.cache.insert(empresa_id, config.clone()).await;
        Ok(config)
    }

    pub async fn invalidate(&self, empresa_id: DbId) {
        self.cache.invalidate(&empresa_id).await;
    }
}

pub async fn get_tenant_config(
    state: &AppState,
    scope: &Scope,
    empresa_id: Option<DbId>,
) -> AppResult<TenantConfig> {
    scope.require(Capability::ViewTenantConfig)?;
    let empresa_id = scope.tenant_for(empresa_id)?;
    state.tenant_configs.resolve(empresa_id).await
}

pub async fn update_tenant_config(
    state: &AppState,
    scope: &Scope,
    input: UpdateTenantConfigInput,
) -> AppResult<TenantConfig> {
    scope.require(Capability::ManageTenantConfig)?;
    let empresa_id = scope.tenant_for(input.empresa_id)?;

    let patch = TenantConfigPatch {
        requiere_domicilio: input.requiere_domicilio,
        requiere_url: input.requiere_url,
        requiere_fecha_final: input.requiere_fecha_final,
        etiqueta_reclamo: label(input.etiqueta_reclamo, "etiqueta_reclamo")?,
        etiqueta_reclamos: label(input.etiqueta_reclamos, "etiqueta_reclamos")?,
        etiqueta_profesional: label(input.etiqueta_profesional, "etiqueta_profesional")?,
        etiqueta_profesionales: label(input.etiqueta_profesionales, "etiqueta_profesionales")?,
    };

    let updated = state
        .store
        .update_tenant_config(empresa_id, &patch)
        .await?
        .ok_or_else(|| AppError::NotFound("Company configuration not found.".to_string()))?;
    state.tenant_configs.invalidate(empresa_id).await;

    tracing::info!(empresa_id, user_id = scope.user_id, "company configuration updated");
    Ok(updated)
}

fn label(value: Option<String>, field: &str) -> AppResult<Option<String>> {
    match value.map(|value| value.trim().to_string()) {
        Some(value) if value.is_empty() => Err(AppError::Validation(format!(
            "{field} cannot be blank."
        ))),
        other => Ok(other),
    }
}
