use std::fmt;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

pub type DbId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Superadmin,
    Owner,
    Operador,
    Profesional,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Superadmin => "superadmin",
            Self::Owner => "owner",
            Self::Operador => "operador",
            Self::Profesional => "profesional",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "superadmin" => Some(Self::Superadmin),
            "owner" => Some(Self::Owner),
            "operador" => Some(Self::Operador),
            "profesional" => Some(Self::Profesional),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Role {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("unknown role '{value}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmpresaEstado {
    Activa,
    Suspendida,
}

impl TryFrom<String> for EmpresaEstado {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "activa" => Ok(Self::Activa),
            "suspendida" => Ok(Self::Suspendida),
            _ => Err(format!("unknown company state '{value}'")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsuarioEstado {
    Activo,
    Bloqueado,
}

impl TryFrom<String> for UsuarioEstado {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.trim().to_ascii_lowercase().as_str() {
            "activo" => Ok(Self::Activo),
            "bloqueado" => Ok(Self::Bloqueado),
            _ => Err(format!("unknown user state '{value}'")),
        }
    }
}

/// Ticket lifecycle state. Wire values are the upper-case Spanish labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ReclamoEstado {
    #[serde(rename = "ABIERTO")]
    Abierto,
    #[serde(rename = "EN PROCESO")]
    EnProceso,
    #[serde(rename = "EN PAUSA")]
    EnPausa,
    #[serde(rename = "CERRADO")]
    Cerrado,
    #[serde(rename = "CANCELADO")]
    Cancelado,
    #[serde(rename = "RE-ABIERTO")]
    Reabierto,
}

impl ReclamoEstado {
    pub const ALL: [ReclamoEstado; 6] = [
        Self::Abierto,
        Self::EnProceso,
        Self::EnPausa,
        Self::Cerrado,
        Self::Cancelado,
        Self::Reabierto,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Abierto => "ABIERTO",
            Self::EnProceso => "EN PROCESO",
            Self::EnPausa => "EN PAUSA",
            Self::Cerrado => "CERRADO",
            Self::Cancelado => "CANCELADO",
            Self::Reabierto => "RE-ABIERTO",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Cerrado | Self::Cancelado)
    }

    /// Terminal states need a closing note on entry.
    pub fn requires_closing_note(self) -> bool {
        self.is_terminal()
    }

    /// Whether `self -> next` is an edge of the lifecycle graph.
    ///
    /// Same-state moves are not edges; callers decide how to treat them.
    pub fn can_transition_to(self, next: ReclamoEstado) -> bool {
        use ReclamoEstado::*;
        match (self, next) {
            (Abierto | Reabierto, EnProceso) => true,
            (EnProceso, EnPausa) | (EnPausa, EnProceso) => true,
            (from, Cerrado | Cancelado) => !from.is_terminal(),
            (Cerrado | Cancelado, Reabierto) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ReclamoEstado {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for ReclamoEstado {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::ALL
            .into_iter()
            .find(|estado| estado.as_str() == value.trim())
            .ok_or_else(|| format!("unknown ticket state '{value}'"))
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Empresa {
    pub id: DbId,
    pub nombre: String,
    #[sqlx(try_from = "String")]
    pub estado: EmpresaEstado,
}

/// Per-company policy flags and display labels.
#[derive(Debug, Clone, PartialEq, Serialize, sqlx::FromRow)]
pub struct TenantConfig {
    pub empresa_id: DbId,
    pub requiere_domicilio: bool,
    pub requiere_url: bool,
    pub requiere_fecha_final: bool,
    pub etiqueta_reclamo: String,
    pub etiqueta_reclamos: String,
    pub etiqueta_profesional: String,
    pub etiqueta_profesionales: String,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Usuario {
    pub id: DbId,
    pub empresa_id: Option<DbId>,
    pub nombre: String,
    pub email: String,
    #[sqlx(try_from = "String")]
    pub rol: Role,
    #[sqlx(try_from = "String")]
    pub estado: UsuarioEstado,
    pub apto_recibir: bool,
}

impl Usuario {
    pub fn is_profesional_of(&self, empresa_id: DbId) -> bool {
        self.rol == Role::Profesional && self.empresa_id == Some(empresa_id)
    }
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Especialidad {
    pub id: DbId,
    pub empresa_id: DbId,
    pub nombre: String,
    pub activa: bool,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Cliente {
    pub id: DbId,
    pub empresa_id: DbId,
    pub nombre: String,
    pub dni: String,
    pub email: String,
    pub activo: bool,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Reclamo {
    pub id: DbId,
    pub empresa_id: DbId,
    pub titulo: String,
    pub detalle: String,
    pub url: Option<String>,
    pub domicilio: Option<String>,
    #[sqlx(try_from = "String")]
    pub estado: ReclamoEstado,
    pub creador_id: DbId,
    pub especialidad_id: DbId,
    pub profesional_id: DbId,
    pub cliente_id: DbId,
    pub nota_cierre: Option<String>,
    pub presupuesto: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The calendar slot reserved for one ticket.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ReclamoAgenda {
    pub id: DbId,
    pub reclamo_id: DbId,
    pub empresa_id: DbId,
    pub profesional_id: DbId,
    pub fecha: NaiveDate,
    pub hora_inicio: NaiveTime,
    pub hora_fin: NaiveTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReclamoDetalle {
    #[serde(flatten)]
    pub reclamo: Reclamo,
    pub agenda: ReclamoAgenda,
}

/// A manual time block on a professional's calendar.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Bloqueo {
    pub id: DbId,
    pub empresa_id: DbId,
    pub profesional_id: DbId,
    pub fecha: NaiveDate,
    pub hora_inicio: NaiveTime,
    pub hora_fin: NaiveTime,
    pub nota: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BlockOrigin {
    Manual,
    Reclamo,
}

/// One row of the combined calendar: manual blocks and ticket slots.
#[derive(Debug, Clone, Serialize)]
pub struct LedgerBlock {
    pub origen: BlockOrigin,
    pub id: DbId,
    pub reclamo_id: Option<DbId>,
    pub profesional_id: DbId,
    pub fecha: NaiveDate,
    pub hora_inicio: NaiveTime,
    pub hora_fin: NaiveTime,
    pub nota: Option<String>,
}

impl From<&Bloqueo> for LedgerBlock {
    fn from(block: &Bloqueo) -> Self {
        Self {
            origen: BlockOrigin::Manual,
            id: block.id,
            reclamo_id: None,
            profesional_id: block.profesional_id,
            fecha: block.fecha,
            hora_inicio: block.hora_inicio,
            hora_fin: block.hora_fin,
            nota: block.nota.clone(),
        }
    }
}

impl From<&ReclamoAgenda> for LedgerBlock {
    fn from(slot: &ReclamoAgenda) -> Self {
        Self {
            origen: BlockOrigin::Reclamo,
            id: slot.id,
            reclamo_id: Some(slot.reclamo_id),
            profesional_id: slot.profesional_id,
            fecha: slot.fecha,
            hora_inicio: slot.hora_inicio,
            hora_fin: slot.hora_fin,
            nota: None,
        }
    }
}

/// A same-day, half-open `[inicio, fin)` interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub fecha: NaiveDate,
    pub inicio: NaiveTime,
    pub fin: NaiveTime,
}

impl Interval {
    /// Touching endpoints do not overlap.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.fecha == other.fecha && other.inicio < self.fin && other.fin > self.inicio
    }
}
