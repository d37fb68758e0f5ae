use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{
    error::AppResult,
    models::{
        Bloqueo, Cliente, DbId, Empresa, Especialidad, Interval, LedgerBlock, ReclamoDetalle,
        ReclamoEstado, TenantConfig, Usuario,
    },
};

/// The unit of calendar locking: one professional's day within one company.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CalendarKey {
    pub empresa_id: DbId,
    pub profesional_id: DbId,
    pub fecha: NaiveDate,
}

impl CalendarKey {
    pub fn lock_name(&self) -> String {
        format!(
            "agenda:{}:{}:{}",
            self.empresa_id, self.profesional_id, self.fecha
        )
    }
}

#[derive(Debug, Clone)]
pub struct NewBloqueo {
    pub interval: Interval,
    pub nota: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewReclamo {
    pub titulo: String,
    pub detalle: String,
    pub url: Option<String>,
    pub domicilio: Option<String>,
    pub creador_id: DbId,
    pub especialidad_id: DbId,
    pub cliente_id: DbId,
    pub presupuesto: Option<String>,
    pub interval: Interval,
}

/// Column changes for an existing ticket. `None` leaves the column as is.
#[derive(Debug, Clone, Default)]
pub struct ReclamoPatch {
    pub titulo: Option<String>,
    pub detalle: Option<String>,
    pub url: Option<String>,
    pub domicilio: Option<String>,
    pub presupuesto: Option<String>,
    pub estado: Option<ReclamoEstado>,
    pub nota_cierre: Option<String>,
    pub agenda: Option<Interval>,
}

#[derive(Debug, Clone, Default)]
pub struct ReclamoFilter {
    pub empresa_id: Option<DbId>,
    pub profesional_id: Option<DbId>,
    pub cliente_id: Option<DbId>,
    pub estado: Option<ReclamoEstado>,
    pub limit: i64,
}

#[derive(Debug, Clone, Default)]
pub struct TenantConfigPatch {
    pub requiere_domicilio: Option<bool>,
    pub requiere_url: Option<bool>,
    pub requiere_fecha_final: Option<bool>,
    pub etiqueta_reclamo: Option<String>,
    pub etiqueta_reclamos: Option<String>,
    pub etiqueta_profesional: Option<String>,
    pub etiqueta_profesionales: Option<String>,
}

/// Read access to tenant data plus the entry point for calendar writes.
///
/// Lookups that take an `empresa_id` only return rows of that company.
#[async_trait]
pub trait Store: Send + Sync {
    /// Cheap round trip used by the health check.
    async fn ping(&self) -> AppResult<()>;

    async fn empresa(&self, empresa_id: DbId) -> AppResult<Option<Empresa>>;

    async fn tenant_config(&self, empresa_id: DbId) -> AppResult<Option<TenantConfig>>;

    async fn update_tenant_config(
        &self,
        empresa_id: DbId,
        patch: &TenantConfigPatch,
    ) -> AppResult<Option<TenantConfig>>;

    async fn usuario(&self, usuario_id: DbId) -> AppResult<Option<Usuario>>;

    async fn set_apto_recibir(
        &self,
        empresa_id: DbId,
        profesional_id: DbId,
        apto: bool,
    ) -> AppResult<Option<Usuario>>;

    async fn especialidad(
        &self,
        empresa_id: DbId,
        especialidad_id: DbId,
    ) -> AppResult<Option<Especialidad>>;

    async fn cliente(&self, empresa_id: DbId, cliente_id: DbId) -> AppResult<Option<Cliente>>;

    /// True when the professional holds the specialty and the specialty is active.
    async fn has_especialidad_assignment(
        &self,
        empresa_id: DbId,
        profesional_id: DbId,
        especialidad_id: DbId,
    ) -> AppResult<bool>;

    async fn reclamo(
        &self,
        empresa_id: Option<DbId>,
        reclamo_id: DbId,
    ) -> AppResult<Option<ReclamoDetalle>>;

    async fn list_reclamos(&self, filter: &ReclamoFilter) -> AppResult<Vec<ReclamoDetalle>>;

    async fn list_blocks(
        &self,
        empresa_id: DbId,
        profesional_id: DbId,
        desde: Option<NaiveDate>,
        hasta: Option<NaiveDate>,
    ) -> AppResult<Vec<LedgerBlock>>;

    async fn bloqueo(&self, empresa_id: DbId, bloqueo_id: DbId) -> AppResult<Option<Bloqueo>>;

    async fn delete_bloqueo(&self, empresa_id: DbId, bloqueo_id: DbId) -> AppResult<bool>;

    /// Opens a transaction holding the exclusive lock for `key`.
    async fn begin_calendar(&self, key: CalendarKey) -> AppResult<Box<dyn CalendarTx>>;
}

/// Writes against one locked calendar day.
///
/// Dropping the transaction without calling [`CalendarTx::commit`] discards
/// every write made through it.
#[async_trait]
pub trait CalendarTx: Send {
    fn key(&self) -> CalendarKey;

    /// Reads a ticket of the locked company under the lock. The ticket row is
    /// held until the transaction ends, so two updates of the same ticket
    /// serialize even when they lock different calendar days.
    async fn reclamo(&mut self, reclamo_id: DbId) -> AppResult<Option<ReclamoDetalle>>;

    /// Half-open overlap test against manual blocks and ticket slots of the
    /// locked day. `exclude_reclamo` skips that ticket's own slot.
    async fn has_overlap(
        &mut self,
        interval: &Interval,
        exclude_reclamo: Option<DbId>,
    ) -> AppResult<bool>;

    async fn insert_bloqueo(&mut self, new: &NewBloqueo) -> AppResult<Bloqueo>;

    /// Inserts the ticket and its slot together.
    async fn insert_reclamo(&mut self, new: &NewReclamo) -> AppResult<ReclamoDetalle>;

    async fn update_reclamo(
        &mut self,
        reclamo_id: DbId,
        patch: &ReclamoPatch,
    ) -> AppResult<Option<ReclamoDetalle>>;

    async fn commit(self: Box<Self>) -> AppResult<()>;
}
