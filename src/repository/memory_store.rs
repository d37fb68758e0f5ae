//! In-process `Store` used by the test suite.
//!
//! A single async mutex guards every table, and a calendar transaction owns
//! that mutex from `begin_calendar` until commit or drop, so concurrent
//! writers queue exactly as they would behind the Postgres advisory lock.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::{
    error::{AppError, AppResult},
    models::{
        Bloqueo, Cliente, DbId, Empresa, EmpresaEstado, Especialidad, Interval, LedgerBlock,
        Reclamo, ReclamoAgenda, ReclamoDetalle, ReclamoEstado, Role, TenantConfig, Usuario,
        UsuarioEstado,
    },
    repository::store::{
        CalendarKey, CalendarTx, NewBloqueo, NewReclamo, ReclamoFilter, ReclamoPatch, Store,
        TenantConfigPatch,
    },
};

#[derive(Debug, Clone, Default)]
pub struct Tables {
    pub empresas: HashMap<DbId, Empresa>,
    pub configs: HashMap<DbId, TenantConfig>,
    pub usuarios: HashMap<DbId, Usuario>,
    pub especialidades: HashMap<DbId, Especialidad>,
    /// (empresa, profesional, especialidad)
    pub asignaciones: HashSet<(DbId, DbId, DbId)>,
    pub clientes: HashMap<DbId, Cliente>,
    pub reclamos: BTreeMap<DbId, Reclamo>,
    /// Keyed by reclamo id.
    pub agenda: BTreeMap<DbId, ReclamoAgenda>,
    pub bloqueos: BTreeMap<DbId, Bloqueo>,
    next_id: DbId,
}

impl Tables {
    fn next_id(&mut self) -> DbId {
        self.next_id += 1;
        10_000 + self.next_id
    }

    pub fn add_empresa(&mut self, id: DbId, nombre: &str, config: TenantConfig) {
        self.empresas.insert(
            id,
            Empresa {
                id,
                nombre: nombre.to_string(),
                estado: EmpresaEstado::Activa,
            },
        );
        self.configs.insert(id, TenantConfig { empresa_id: id, ..config });
    }

    pub fn add_usuario(&mut self, id: DbId, empresa_id: Option<DbId>, rol: Role, apto: bool) {
        self.usuarios.insert(
            id,
            Usuario {
                id,
                empresa_id,
                nombre: format!("usuario {id}"),
                email: format!("u{id}@example.com"),
                rol,
                estado: UsuarioEstado::Activo,
                apto_recibir: apto,
            },
        );
    }

    pub fn add_especialidad(&mut self, id: DbId, empresa_id: DbId, activa: bool) {
        self.especialidades.insert(
            id,
            Especialidad {
                id,
                empresa_id,
                nombre: format!("especialidad {id}"),
                activa,
            },
        );
    }

    pub fn add_cliente(&mut self, id: DbId, empresa_id: DbId) {
        self.clientes.insert(
            id,
            Cliente {
                id,
                empresa_id,
                nombre: format!("cliente {id}"),
                dni: format!("{}", 30_000_000 + id),
                email: format!("c{id}@example.com"),
                activo: true,
            },
        );
    }

    fn blocks_of_day(&self, key: &CalendarKey) -> Vec<(Interval, Option<DbId>)> {
        let manual = self
            .bloqueos
            .values()
            .filter(|block| {
                block.empresa_id == key.empresa_id
                    && block.profesional_id == key.profesional_id
                    && block.fecha == key.fecha
            })
            .map(|block| {
                (
                    Interval {
                        fecha: block.fecha,
                        inicio: block.hora_inicio,
                        fin: block.hora_fin,
                    },
                    None,
                )
            });
        let slots = self
            .agenda
            .values()
            .filter(|slot| {
                slot.empresa_id == key.empresa_id
                    && slot.profesional_id == key.profesional_id
                    && slot.fecha == key.fecha
            })
            .map(|slot| {
                (
                    Interval {
                        fecha: slot.fecha,
                        inicio: slot.hora_inicio,
                        fin: slot.hora_fin,
                    },
                    Some(slot.reclamo_id),
                )
            });
        manual.chain(slots).collect()
    }

    fn detalle(&self, empresa_id: Option<DbId>, reclamo_id: DbId) -> Option<ReclamoDetalle> {
        let reclamo = self
            .reclamos
            .get(&reclamo_id)
            .filter(|reclamo| empresa_id.map_or(true, |id| reclamo.empresa_id == id))?;
        let agenda = self.agenda.get(&reclamo_id)?;
        Some(ReclamoDetalle {
            reclamo: reclamo.clone(),
            agenda: agenda.clone(),
        })
    }
}

pub fn default_config() -> TenantConfig {
    TenantConfig {
        empresa_id: 0,
        requiere_domicilio: false,
        requiere_url: false,
        requiere_fecha_final: false,
        etiqueta_reclamo: "Reclamo".to_string(),
        etiqueta_reclamos: "Reclamos".to_string(),
        etiqueta_profesional: "Profesional".to_string(),
        etiqueta_profesionales: "Profesionales".to_string(),
    }
}

/// Two active companies and one suspended company.
///
/// Company 1000 has permissive policy flags; company 2000 requires address,
/// URL and explicit end times and uses custom labels.
pub fn seeded_tables() -> Tables {
    let mut tables = Tables::default();

    tables.add_empresa(1000, "Servicios Norte", default_config());
    tables.add_usuario(1, Some(1000), Role::Owner, false);
    tables.add_usuario(2, Some(1000), Role::Operador, false);
    tables.add_usuario(10, Some(1000), Role::Profesional, true);
    tables.add_usuario(11, Some(1000), Role::Profesional, false);
    tables.add_usuario(12, Some(1000), Role::Profesional, true);
    tables.add_especialidad(100, 1000, true);
    tables.add_especialidad(101, 1000, false);
    tables.asignaciones.insert((1000, 10, 100));
    tables.asignaciones.insert((1000, 10, 101));
    tables.asignaciones.insert((1000, 11, 100));
    tables.add_cliente(200, 1000);

    tables.add_empresa(
        2000,
        "Servicios Sur",
        TenantConfig {
            requiere_domicilio: true,
            requiere_url: true,
            requiere_fecha_final: true,
            etiqueta_reclamo: "Pedido".to_string(),
            etiqueta_reclamos: "Pedidos".to_string(),
            etiqueta_profesional: "Técnico".to_string(),
            etiqueta_profesionales: "Técnicos".to_string(),
            ..default_config()
        },
    );
    tables.add_usuario(21, Some(2000), Role::Owner, false);
    tables.add_usuario(20, Some(2000), Role::Profesional, true);
    tables.add_especialidad(400, 2000, true);
    tables.asignaciones.insert((2000, 20, 400));
    tables.add_cliente(300, 2000);

    tables.add_empresa(3000, "Servicios Suspendidos", default_config());
    if let Some(empresa) = tables.empresas.get_mut(&3000) {
        empresa.estado = EmpresaEstado::Suspendida;
    }
    tables.add_usuario(31, Some(3000), Role::Owner, false);

    tables.add_usuario(99, None, Role::Superadmin, false);

    tables
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    tables: Arc<Mutex<Tables>>,
    fail_next_slot_insert: Arc<AtomicBool>,
}

impl MemoryStore {
    pub fn new(tables: Tables) -> Self {
        Self {
            tables: Arc::new(Mutex::new(tables)),
            fail_next_slot_insert: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn seeded() -> Self {
        Self::new(seeded_tables())
    }

    pub async fn with_tables<R>(&self, f: impl FnOnce(&mut Tables) -> R) -> R {
        let mut tables = self.tables.lock().await;
        f(&mut tables)
    }

    /// Makes the next ticket insert fail after the ticket row, before the slot row.
    pub fn fail_next_slot_insert(&self) {
        self.fail_next_slot_insert.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }

    async fn empresa(&self, empresa_id: DbId) -> AppResult<Option<Empresa>> {
        Ok(self.tables.lock().await.empresas.get(&empresa_id).cloned())
    }

    async fn tenant_config(&self, empresa_id: DbId) -> AppResult<Option<TenantConfig>> {
        Ok(self.tables.lock().await.configs.get(&empresa_id).cloned())
    }

    async fn update_tenant_config(
        &self,
        empresa_id: DbId,
        patch: &TenantConfigPatch,
    ) -> AppResult<Option<TenantConfig>> {
        let mut tables = self.tables.lock().await;
        let Some(config) = tables.configs.get_mut(&empresa_id) else {
            return Ok(None);
        };
        if let Some(value) = patch.requiere_domicilio {
            config.requiere_domicilio = value;
        }
        if let Some(value) = patch.requiere_url {
            config.requiere_url = value;
        }
        if let Some(value) = patch.requiere_fecha_final {
            config.requiere_fecha_final = value;
        }
        if let Some(value) = &patch.etiqueta_reclamo {
            config.etiqueta_reclamo = value.clone();
        }
        if let Some(value) = &patch.etiqueta_reclamos {
            config.etiqueta_reclamos = value.clone();
        }
        if let Some(value) = &patch.etiqueta_profesional {
            config.etiqueta_profesional = value.clone();
        }
        if let Some(value) = &patch.etiqueta_profesionales {
            config.etiqueta_profesionales = value.clone();
        }
        Ok(Some(config.clone()))
    }

    async fn usuario(&self, usuario_id: DbId) -> AppResult<Option<Usuario>> {
        Ok(self.tables.lock().await.usuarios.get(&usuario_id).cloned())
    }

    async fn set_apto_recibir(
        &self,
        empresa_id: DbId,
        profesional_id: DbId,
        apto: bool,
    ) -> AppResult<Option<Usuario>> {
        let mut tables = self.tables.lock().await;
        let Some(usuario) = tables
            .usuarios
            .get_mut(&profesional_id)
            .filter(|usuario| usuario.is_profesional_of(empresa_id))
        else {
            return Ok(None);
        };
        usuario.apto_recibir = apto;
        Ok(Some(usuario.clone()))
    }

    async fn especialidad(
        &self,
        empresa_id: DbId,
        especialidad_id: DbId,
    ) -> AppResult<Option<Especialidad>> {
        Ok(self
            .tables
            .lock()
            .await
            .especialidades
            .get(&especialidad_id)
            .filter(|especialidad| especialidad.empresa_id == empresa_id)
            .cloned())
    }

    async fn cliente(&self, empresa_id: DbId, cliente_id: DbId) -> AppResult<Option<Cliente>> {
        Ok(self
            .tables
            .lock()
            .await
            .clientes
            .get(&cliente_id)
            .filter(|cliente| cliente.empresa_id == empresa_id)
            .cloned())
    }

    async fn has_especialidad_assignment(
        &self,
        empresa_id: DbId,
        profesional_id: DbId,
        especialidad_id: DbId,
    ) -> AppResult<bool> {
        let tables = self.tables.lock().await;
        let active = tables
            .especialidades
            .get(&especialidad_id)
            .is_some_and(|especialidad| {
                especialidad.empresa_id == empresa_id && especialidad.activa
            });
        Ok(active
            && tables
                .asignaciones
                .contains(&(empresa_id, profesional_id, especialidad_id)))
    }

    async fn reclamo(
        &self,
        empresa_id: Option<DbId>,
        reclamo_id: DbId,
    ) -> AppResult<Option<ReclamoDetalle>> {
        Ok(self.tables.lock().await.detalle(empresa_id, reclamo_id))
    }

    async fn list_reclamos(&self, filter: &ReclamoFilter) -> AppResult<Vec<ReclamoDetalle>> {
        let tables = self.tables.lock().await;
        let mut rows = tables
            .reclamos
            .values()
            .filter(|reclamo| filter.empresa_id.map_or(true, |id| reclamo.empresa_id == id))
            .filter(|reclamo| {
                filter
                    .profesional_id
                    .map_or(true, |id| reclamo.profesional_id == id)
            })
            .filter(|reclamo| filter.cliente_id.map_or(true, |id| reclamo.cliente_id == id))
            .filter(|reclamo| filter.estado.map_or(true, |estado| reclamo.estado == estado))
            .filter_map(|reclamo| tables.detalle(None, reclamo.id))
            .collect::<Vec<_>>();
        rows.sort_by(|a, b| {
            (b.agenda.fecha, b.agenda.hora_inicio).cmp(&(a.agenda.fecha, a.agenda.hora_inicio))
        });
        rows.truncate(filter.limit.clamp(1, 1000) as usize);
        Ok(rows)
    }

    async fn list_blocks(
        &self,
        empresa_id: DbId,
        profesional_id: DbId,
        desde: Option<NaiveDate>,
        hasta: Option<NaiveDate>,
    ) -> AppResult<Vec<LedgerBlock>> {
        let tables = self.tables.lock().await;
        let in_range = |fecha: NaiveDate| {
            desde.map_or(true, |desde| fecha >= desde) && hasta.map_or(true, |hasta| fecha <= hasta)
        };
        let mut blocks = tables
            .bloqueos
            .values()
            .filter(|block| {
                block.empresa_id == empresa_id && block.profesional_id == profesional_id
            })
            .filter(|block| in_range(block.fecha))
            .map(LedgerBlock::from)
            .chain(
                tables
                    .agenda
                    .values()
                    .filter(|slot| {
                        slot.empresa_id == empresa_id && slot.profesional_id == profesional_id
                    })
                    .filter(|slot| in_range(slot.fecha))
                    .map(LedgerBlock::from),
            )
            .collect::<Vec<_>>();
        blocks.sort_by_key(|block| (block.fecha, block.hora_inicio));
        Ok(blocks)
    }

    async fn bloqueo(&self, empresa_id: DbId, bloqueo_id: DbId) -> AppResult<Option<Bloqueo>> {
        Ok(self
            .tables
            .lock()
            .await
            .bloqueos
            .get(&bloqueo_id)
            .filter(|block| block.empresa_id == empresa_id)
            .cloned())
    }

    async fn delete_bloqueo(&self, empresa_id: DbId, bloqueo_id: DbId) -> AppResult<bool> {
        let mut tables = self.tables.lock().await;
        let owned = tables
            .bloqueos
            .get(&bloqueo_id)
            .is_some_and(|block| block.empresa_id == empresa_id);
        if owned {
            tables.bloqueos.remove(&bloqueo_id);
        }
        Ok(owned)
    }

    async fn begin_calendar(&self, key: CalendarKey) -> AppResult<Box<dyn CalendarTx>> {
        let guard = self.tables.clone().lock_owned().await;
        let snapshot = guard.clone();
        let fail_slot_insert = self.fail_next_slot_insert.swap(false, Ordering::SeqCst);
        Ok(Box::new(MemoryCalendarTx {
            guard,
            snapshot: Some(snapshot),
            key,
            fail_slot_insert,
        }))
    }
}

struct MemoryCalendarTx {
    guard: OwnedMutexGuard<Tables>,
    snapshot: Option<Tables>,
    key: CalendarKey,
    fail_slot_insert: bool,
}

impl Drop for MemoryCalendarTx {
    fn drop(&mut self) {
        if let Some(snapshot) = self.snapshot.take() {
            *self.guard = snapshot;
        }
    }
}

#[async_trait]
impl CalendarTx for MemoryCalendarTx {
    fn key(&self) -> CalendarKey {
        self.key
    }

    async fn reclamo(&mut self, reclamo_id: DbId) -> AppResult<Option<ReclamoDetalle>> {
        Ok(self.guard.detalle(Some(self.key.empresa_id), reclamo_id))
    }

    async fn has_overlap(
        &mut self,
        interval: &Interval,
        exclude_reclamo: Option<DbId>,
    ) -> AppResult<bool> {
        Ok(self
            .guard
            .blocks_of_day(&self.key)
            .iter()
            .filter(|(_, reclamo_id)| exclude_reclamo.is_none() || *reclamo_id != exclude_reclamo)
            .any(|(existing, _)| existing.overlaps(interval)))
    }

    async fn insert_bloqueo(&mut self, new: &NewBloqueo) -> AppResult<Bloqueo> {
        let id = self.guard.next_id();
        let block = Bloqueo {
            id,
            empresa_id: self.key.empresa_id,
            profesional_id: self.key.profesional_id,
            fecha: new.interval.fecha,
            hora_inicio: new.interval.inicio,
            hora_fin: new.interval.fin,
            nota: new.nota.clone(),
            created_at: Utc::now(),
        };
        self.guard.bloqueos.insert(id, block.clone());
        Ok(block)
    }

    async fn insert_reclamo(&mut self, new: &NewReclamo) -> AppResult<ReclamoDetalle> {
        let now = Utc::now();
        let reclamo_id = self.guard.next_id();
        self.guard.reclamos.insert(
            reclamo_id,
            Reclamo {
                id: reclamo_id,
                empresa_id: self.key.empresa_id,
                titulo: new.titulo.clone(),
                detalle: new.detalle.clone(),
                url: new.url.clone(),
                domicilio: new.domicilio.clone(),
                estado: ReclamoEstado::Abierto,
                creador_id: new.creador_id,
                especialidad_id: new.especialidad_id,
                profesional_id: self.key.profesional_id,
                cliente_id: new.cliente_id,
                nota_cierre: None,
                presupuesto: new.presupuesto.clone(),
                created_at: now,
                updated_at: now,
            },
        );

        if self.fail_slot_insert {
            return Err(AppError::Internal("simulated slot insert failure".to_string()));
        }

        let slot_id = self.guard.next_id();
        self.guard.agenda.insert(
            reclamo_id,
            ReclamoAgenda {
                id: slot_id,
                reclamo_id,
                empresa_id: self.key.empresa_id,
                profesional_id: self.key.profesional_id,
                fecha: new.interval.fecha,
                hora_inicio: new.interval.inicio,
                hora_fin: new.interval.fin,
            },
        );

        self.guard
            .detalle(Some(self.key.empresa_id), reclamo_id)
            .ok_or_else(|| AppError::Internal("Could not read back created ticket.".to_string()))
    }

    async fn update_reclamo(
        &mut self,
        reclamo_id: DbId,
        patch: &ReclamoPatch,
    ) -> AppResult<Option<ReclamoDetalle>> {
        let empresa_id = self.key.empresa_id;
        let Some(reclamo) = self
            .guard
            .reclamos
            .get_mut(&reclamo_id)
            .filter(|reclamo| reclamo.empresa_id == empresa_id)
        else {
            return Ok(None);
        };

        if let Some(value) = &patch.titulo {
            reclamo.titulo = value.clone();
        }
        if let Some(value) = &patch.detalle {
            reclamo.detalle = value.clone();
        }
        if let Some(value) = &patch.url {
            reclamo.url = Some(value.clone());
        }
        if let Some(value) = &patch.domicilio {
            reclamo.domicilio = Some(value.clone());
        }
        if let Some(value) = &patch.presupuesto {
            reclamo.presupuesto = Some(value.clone());
        }
        if let Some(estado) = patch.estado {
            reclamo.estado = estado;
        }
        if let Some(value) = &patch.nota_cierre {
            reclamo.nota_cierre = Some(value.clone());
        }
        reclamo.updated_at = Utc::now();

        if let Some(interval) = &patch.agenda {
            if let Some(slot) = self.guard.agenda.get_mut(&reclamo_id) {
                slot.fecha = interval.fecha;
                slot.hora_inicio = interval.inicio;
                slot.hora_fin = interval.fin;
            }
        }

        Ok(self.guard.detalle(Some(empresa_id), reclamo_id))
    }

    async fn commit(mut self: Box<Self>) -> AppResult<()> {
        self.snapshot = None;
        Ok(())
    }
}
