//! Fixtures shared by the in-crate test modules.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, NaiveTime, Utc};

use crate::{
    auth::Identity,
    config::AppConfig,
    models::{Reclamo, ReclamoAgenda, ReclamoDetalle, ReclamoEstado},
    repository::memory_store::MemoryStore,
    services::notifications::{Notification, Notifier, NotifyError},
    state::AppState,
    tenancy::{resolve_scope, Scope},
};

pub const TEST_JWT_SECRET: &str = "test-secret";

pub fn test_config() -> AppConfig {
    let mut config = AppConfig::from_env();
    config.environment = "test".to_string();
    config.dev_auth_overrides_enabled = true;
    config.jwt_secret = Some(TEST_JWT_SECRET.to_string());
    config.database_url = None;
    config.notification_webhook_url = None;
    config.trusted_hosts = vec!["localhost".to_string()];
    config
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    /// Waits for background dispatches to land.
    pub async fn wait_for(&self, count: usize) -> Vec<Notification> {
        for _ in 0..100 {
            let sent = self.sent();
            if sent.len() >= count {
                return sent;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.sent()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(notification.clone());
        }
        Ok(())
    }
}

pub struct FailingNotifier;

#[async_trait]
impl Notifier for FailingNotifier {
    async fn notify(&self, _notification: &Notification) -> Result<(), NotifyError> {
        Err(NotifyError::Rejected(503))
    }
}

pub fn seeded_state() -> (AppState, MemoryStore, Arc<RecordingNotifier>) {
    let store = MemoryStore::seeded();
    let notifier = Arc::new(RecordingNotifier::default());
    let state = AppState::from_parts(test_config(), Arc::new(store.clone()), notifier.clone());
    (state, store, notifier)
}

pub fn state_with_notifier(notifier: Arc<dyn Notifier>) -> (AppState, MemoryStore) {
    let store = MemoryStore::seeded();
    let state = AppState::from_parts(test_config(), Arc::new(store.clone()), notifier);
    (state, store)
}

pub async fn scope_of(state: &AppState, user_id: i64) -> Scope {
    let identity = Identity {
        user_id,
        role: None,
        empresa_id: None,
    };
    resolve_scope(state, &identity)
        .await
        .unwrap_or_else(|error| panic!("user {user_id} has no scope: {error}"))
}

/// A day safely in the future of the platform clock.
pub fn future_day() -> NaiveDate {
    Utc::now().date_naive() + ChronoDuration::days(30)
}

pub fn hm(hour: u32, minute: u32) -> NaiveTime {
    NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
}

pub fn sample_detalle() -> ReclamoDetalle {
    let fecha = NaiveDate::from_ymd_opt(2030, 5, 1).unwrap();
    ReclamoDetalle {
        reclamo: Reclamo {
            id: 7,
            empresa_id: 1000,
            titulo: "Pérdida de agua".to_string(),
            detalle: "Gotea la canilla".to_string(),
            url: None,
            domicilio: None,
            estado: ReclamoEstado::Abierto,
            creador_id: 2,
            especialidad_id: 100,
            profesional_id: 10,
            cliente_id: 200,
            nota_cierre: None,
            presupuesto: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        },
        agenda: ReclamoAgenda {
            id: 70,
            reclamo_id: 7,
            empresa_id: 1000,
            profesional_id: 10,
            fecha,
            hora_inicio: hm(10, 0),
            hora_fin: hm(11, 0),
        },
    }
}
