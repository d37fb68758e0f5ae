use chrono::{NaiveDate, NaiveTime};
use serde::Deserialize;
use validator::Validate;

use crate::{
    error::AppError,
    models::{DbId, ReclamoEstado},
};

pub fn validate_input<T: Validate>(input: &T) -> Result<(), AppError> {
    input
        .validate()
        .map_err(|errors| AppError::Validation(format!("Validation failed: {errors}")))
}

pub fn non_empty_opt(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToOwned::to_owned)
}

/// Accepts `YYYY-MM-DD`.
pub fn parse_date(field: &str, raw: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|_| AppError::Validation(format!("{field} must be a date (YYYY-MM-DD).")))
}

/// Accepts `HH:MM` and `HH:MM:SS`.
pub fn parse_time(field: &str, raw: &str) -> Result<NaiveTime, AppError> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M"))
        .map_err(|_| AppError::Validation(format!("{field} must be a time (HH:MM).")))
}

pub fn parse_opt_date(field: &str, raw: Option<&str>) -> Result<Option<NaiveDate>, AppError> {
    non_empty_opt(raw)
        .map(|value| parse_date(field, &value))
        .transpose()
}

pub fn parse_opt_time(field: &str, raw: Option<&str>) -> Result<Option<NaiveTime>, AppError> {
    non_empty_opt(raw)
        .map(|value| parse_time(field, &value))
        .transpose()
}

/// Rejects anything that is not an absolute URL.
pub fn ensure_url(raw: &str) -> Result<(), AppError> {
    url::Url::parse(raw)
        .map(|_| ())
        .map_err(|_| AppError::Validation("url must be an absolute URL.".to_string()))
}

pub fn clamp_limit(limit: i64) -> i64 {
    limit.clamp(1, 500)
}

fn default_limit_100() -> i64 {
    100
}

// Every field is optional on the wire so that missing mandatory fields are
// reported together, after the specialty check.
#[derive(Debug, Clone, Default, Deserialize, serde::Serialize, Validate)]
pub struct CreateReclamoInput {
    pub empresa_id: Option<DbId>,
    #[validate(length(max = 255))]
    pub titulo: Option<String>,
    #[validate(length(max = 5000))]
    pub detalle: Option<String>,
    #[validate(length(max = 2048))]
    pub url: Option<String>,
    #[validate(length(max = 500))]
    pub domicilio: Option<String>,
    pub especialidad_id: Option<DbId>,
    pub profesional_id: Option<DbId>,
    pub cliente_id: Option<DbId>,
    pub fecha: Option<String>,
    pub hora_inicio: Option<String>,
    pub hora_fin: Option<String>,
    #[validate(length(max = 64))]
    pub presupuesto: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, serde::Serialize, Validate)]
pub struct UpdateReclamoInput {
    #[validate(length(min = 1, max = 255))]
    pub titulo: Option<String>,
    #[validate(length(min = 1, max = 5000))]
    pub detalle: Option<String>,
    #[validate(length(max = 2048))]
    pub url: Option<String>,
    #[validate(length(max = 500))]
    pub domicilio: Option<String>,
    #[validate(length(max = 64))]
    pub presupuesto: Option<String>,
    pub estado: Option<ReclamoEstado>,
    #[serde(rename = "reclamo_nota_cierre", alias = "nota_cierre")]
    #[validate(length(max = 5000))]
    pub nota_cierre: Option<String>,
    pub fecha: Option<String>,
    pub hora_inicio: Option<String>,
    pub hora_fin: Option<String>,
}

impl UpdateReclamoInput {
    pub fn touches_schedule(&self) -> bool {
        self.fecha.is_some() || self.hora_inicio.is_some() || self.hora_fin.is_some()
    }

    /// Anything beyond the lifecycle fields.
    pub fn touches_details(&self) -> bool {
        self.titulo.is_some()
            || self.detalle.is_some()
            || self.url.is_some()
            || self.domicilio.is_some()
            || self.presupuesto.is_some()
            || self.touches_schedule()
    }
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct ReclamosQuery {
    pub empresa_id: Option<DbId>,
    pub profesional_id: Option<DbId>,
    pub cliente_id: Option<DbId>,
    pub estado: Option<ReclamoEstado>,
    #[serde(default = "default_limit_100")]
    pub limit: i64,
}

#[derive(Debug, Clone, Default, Deserialize, serde::Serialize, Validate)]
pub struct CreateBloqueoInput {
    pub empresa_id: Option<DbId>,
    pub fecha: String,
    pub hora_inicio: String,
    pub hora_fin: Option<String>,
    #[validate(length(max = 500))]
    pub nota: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, serde::Serialize)]
pub struct AgendaQuery {
    pub empresa_id: Option<DbId>,
    pub desde: Option<String>,
    pub hasta: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, serde::Serialize)]
pub struct TenantQuery {
    pub empresa_id: Option<DbId>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct AptoRecibirInput {
    pub empresa_id: Option<DbId>,
    pub apto_recibir: bool,
}

#[derive(Debug, Clone, Default, Deserialize, serde::Serialize, Validate)]
pub struct UpdateTenantConfigInput {
    pub empresa_id: Option<DbId>,
    pub requiere_domicilio: Option<bool>,
    pub requiere_url: Option<bool>,
    pub requiere_fecha_final: Option<bool>,
    #[validate(length(max = 60))]
    pub etiqueta_reclamo: Option<String>,
    #[validate(length(max = 60))]
    pub etiqueta_reclamos: Option<String>,
    #[validate(length(max = 60))]
    pub etiqueta_profesional: Option<String>,
    #[validate(length(max = 60))]
    pub etiqueta_profesionales: Option<String>,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct ReclamoPath {
    pub reclamo_id: DbId,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct ProfesionalPath {
    pub profesional_id: DbId,
}

#[derive(Debug, Clone, Deserialize, serde::Serialize)]
pub struct BloqueoPath {
    pub bloqueo_id: DbId,
}
