use std::sync::Arc;

use chrono::{NaiveDateTime, Utc};

use crate::{
    config::AppConfig,
    db::build_pool,
    repository::{pg_store::PgStore, store::Store},
    services::{
        notifications::{build_notifier, Notifier},
        tenant_config::TenantConfigResolver,
    },
};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub store: Arc<dyn Store>,
    pub tenant_configs: TenantConfigResolver,
    pub notifier: Arc<dyn Notifier>,
}

impl AppState {
    pub fn build(config: AppConfig) -> Result<Self, Box<dyn std::error::Error>> {
        let pool = build_pool(&config)?;
        let store: Arc<dyn Store> = Arc::new(PgStore::new(pool));
        let notifier = build_notifier(&config)?;
        Ok(Self::from_parts(config, store, notifier))
    }

    pub fn from_parts(
        config: AppConfig,
        store: Arc<dyn Store>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let tenant_configs = TenantConfigResolver::new(store.clone(), &config);
        Self {
            config: Arc::new(config),
            store,
            tenant_configs,
            notifier,
        }
    }

    /// Wall clock in the platform timezone, used for past-schedule checks.
    pub fn local_now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.config.timezone).naive_local()
    }
}
