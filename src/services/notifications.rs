use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::Serialize;
use sha2::Sha256;
use tokio::task::JoinHandle;

use crate::{
    config::AppConfig,
    models::{DbId, ReclamoDetalle, TenantConfig},
};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-signature";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Asignado,
    Actualizado,
    Recordatorio,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub empresa_id: DbId,
    pub usuario_id: DbId,
    pub reclamo_id: DbId,
    pub title: String,
    pub body: String,
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("notification request failed: {0}")]
    Transport(String),
    #[error("notification endpoint answered with status {0}")]
    Rejected(u16),
}

/// Delivers a notification to the professional it addresses.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError>;
}

/// Posts notifications as JSON to an outbound webhook.
///
/// When a secret is configured the raw body is signed with HMAC-SHA256 and
/// the lowercase hex digest is sent in the `x-signature` header.
pub struct WebhookNotifier {
    http_client: Client,
    url: String,
    secret: Option<String>,
}

impl WebhookNotifier {
    pub fn new(http_client: Client, url: String, secret: Option<String>) -> Self {
        Self {
            http_client,
            url,
            secret,
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        let body = serde_json::to_vec(notification)
            .map_err(|error| NotifyError::Transport(error.to_string()))?;

        let mut request = self
            .http_client
            .post(&self.url)
            .header("Content-Type", "application/json");
        if let Some(secret) = self.secret.as_deref() {
            request = request.header(SIGNATURE_HEADER, sign_payload(secret, &body));
        }

        let response = request.body(body).send().await.map_err(|error| {
            tracing::error!(error = %error, "Notification webhook request failed");
            NotifyError::Transport(error.to_string())
        })?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(NotifyError::Rejected(status.as_u16()))
        }
    }
}

/// Fallback when no webhook is configured: notifications only reach the log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        tracing::info!(
            kind = ?notification.kind,
            empresa_id = notification.empresa_id,
            usuario_id = notification.usuario_id,
            reclamo_id = notification.reclamo_id,
            title = %notification.title,
            "notification"
        );
        Ok(())
    }
}

pub fn build_notifier(config: &AppConfig) -> Result<Arc<dyn Notifier>, reqwest::Error> {
    let Some(url) = config
        .notification_webhook_url
        .as_deref()
        .filter(|url| !url.is_empty())
    else {
        tracing::warn!("NOTIFICATION_WEBHOOK_URL not configured; notifications are only logged");
        return Ok(Arc::new(LogNotifier));
    };

    let http_client = Client::builder()
        .timeout(Duration::from_secs(config.notification_timeout_seconds))
        .build()?;
    Ok(Arc::new(WebhookNotifier::new(
        http_client,
        url.to_string(),
        config.notification_webhook_secret.clone(),
    )))
}

pub fn sign_payload(secret: &str, body: &[u8]) -> String {
    // HMAC accepts keys of any length.
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    mac.finalize()
        .into_bytes()
        .iter()
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

/// Sends the notification in the background. Must only be called once the
/// write it describes has committed; a delivery failure is logged and never
/// reaches the caller.
pub fn dispatch_after_commit(
    notifier: Arc<dyn Notifier>,
    notification: Notification,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(error) = notifier.notify(&notification).await {
            tracing::warn!(
                %error,
                kind = ?notification.kind,
                reclamo_id = notification.reclamo_id,
                usuario_id = notification.usuario_id,
                "notification delivery failed"
            );
        }
    })
}

fn schedule_text(detalle: &ReclamoDetalle) -> String {
    format!(
        "{} de {} a {}",
        detalle.agenda.fecha.format("%d/%m/%Y"),
        detalle.agenda.hora_inicio.format("%H:%M"),
        detalle.agenda.hora_fin.format("%H:%M"),
    )
}

fn notification(
    kind: NotificationKind,
    detalle: &ReclamoDetalle,
    title: String,
    body: String,
) -> Notification {
    Notification {
        kind,
        empresa_id: detalle.reclamo.empresa_id,
        usuario_id: detalle.reclamo.profesional_id,
        reclamo_id: detalle.reclamo.id,
        title,
        body,
    }
}

pub fn assigned(config: &TenantConfig, detalle: &ReclamoDetalle) -> Notification {
    notification(
        NotificationKind::Asignado,
        detalle,
        format!("Nuevo {} asignado", config.etiqueta_reclamo),
        format!(
            "Se te asignó el {} #{} \"{}\" para el {}.",
            config.etiqueta_reclamo,
            detalle.reclamo.id,
            detalle.reclamo.titulo,
            schedule_text(detalle)
        ),
    )
}

pub fn updated(config: &TenantConfig, detalle: &ReclamoDetalle) -> Notification {
    notification(
        NotificationKind::Actualizado,
        detalle,
        format!("{} #{} actualizado", config.etiqueta_reclamo, detalle.reclamo.id),
        format!(
            "El {} \"{}\" está {} y agendado el {}.",
            config.etiqueta_reclamo,
            detalle.reclamo.titulo,
            detalle.reclamo.estado,
            schedule_text(detalle)
        ),
    )
}

pub fn reminder(config: &TenantConfig, detalle: &ReclamoDetalle) -> Notification {
    notification(
        NotificationKind::Recordatorio,
        detalle,
        format!("Recordatorio de {}", config.etiqueta_reclamo),
        format!(
            "Recordá el {} #{} \"{}\" agendado el {}.",
            config.etiqueta_reclamo,
            detalle.reclamo.id,
            detalle.reclamo.titulo,
            schedule_text(detalle)
        ),
    )
}
