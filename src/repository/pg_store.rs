use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder, Transaction};

use crate::{
    error::{AppError, AppResult},
    models::{
        Bloqueo, Cliente, DbId, Empresa, Especialidad, Interval, LedgerBlock, Reclamo,
        ReclamoAgenda, ReclamoDetalle, TenantConfig, Usuario,
    },
    repository::store::{
        CalendarKey, CalendarTx, NewBloqueo, NewReclamo, ReclamoFilter, ReclamoPatch, Store,
        TenantConfigPatch,
    },
};

const USUARIO_COLUMNS: &str = "id, empresa_id, nombre, email, rol, estado, apto_recibir";
const TENANT_CONFIG_COLUMNS: &str = "empresa_id, requiere_domicilio, requiere_url, \
     requiere_fecha_final, etiqueta_reclamo, etiqueta_reclamos, etiqueta_profesional, \
     etiqueta_profesionales";
const BLOQUEO_COLUMNS: &str =
    "id, empresa_id, profesional_id, fecha, hora_inicio, hora_fin, nota, created_at";
const RECLAMO_SELECT: &str = "SELECT r.id, r.empresa_id, r.titulo, r.detalle, r.url, \
     r.domicilio, r.estado, r.creador_id, r.especialidad_id, r.profesional_id, r.cliente_id, \
     r.nota_cierre, r.presupuesto, r.created_at, r.updated_at, \
     a.id AS agenda_id, a.fecha, a.hora_inicio, a.hora_fin \
     FROM reclamos r JOIN reclamo_agenda a ON a.reclamo_id = r.id";

#[derive(sqlx::FromRow)]
struct ReclamoRow {
    #[sqlx(flatten)]
    reclamo: Reclamo,
    agenda_id: DbId,
    fecha: NaiveDate,
    hora_inicio: NaiveTime,
    hora_fin: NaiveTime,
}

impl From<ReclamoRow> for ReclamoDetalle {
    fn from(row: ReclamoRow) -> Self {
        let agenda = ReclamoAgenda {
            id: row.agenda_id,
            reclamo_id: row.reclamo.id,
            empresa_id: row.reclamo.empresa_id,
            profesional_id: row.reclamo.profesional_id,
            fecha: row.fecha,
            hora_inicio: row.hora_inicio,
            hora_fin: row.hora_fin,
        };
        ReclamoDetalle {
            reclamo: row.reclamo,
            agenda,
        }
    }
}

/// Postgres-backed store. Without a pool every call fails with `Dependency`.
#[derive(Clone)]
pub struct PgStore {
    pool: Option<PgPool>,
}

impl PgStore {
    pub fn new(pool: Option<PgPool>) -> Self {
        Self { pool }
    }

    fn pool(&self) -> AppResult<&PgPool> {
        self.pool.as_ref().ok_or_else(|| {
            AppError::Dependency("Database is not configured. Set DATABASE_URL.".to_string())
        })
    }
}

#[async_trait]
impl Store for PgStore {
    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(self.pool()?).await?;
        Ok(())
    }

    async fn empresa(&self, empresa_id: DbId) -> AppResult<Option<Empresa>> {
        let row = sqlx::query_as::<_, Empresa>(
            "SELECT id, nombre, estado FROM empresas WHERE id = $1",
        )
        .bind(empresa_id)
        .fetch_optional(self.pool()?)
        .await?;
        Ok(row)
    }

    async fn tenant_config(&self, empresa_id: DbId) -> AppResult<Option<TenantConfig>> {
        let sql =
            format!("SELECT {TENANT_CONFIG_COLUMNS} FROM empresa_config WHERE empresa_id = $1");
        let row = sqlx::query_as::<_, TenantConfig>(&sql)
            .bind(empresa_id)
            .fetch_optional(self.pool()?)
            .await?;
        Ok(row)
    }

    async fn update_tenant_config(
        &self,
        empresa_id: DbId,
        patch: &TenantConfigPatch,
    ) -> AppResult<Option<TenantConfig>> {
        let sql = format!(
            "UPDATE empresa_config SET
                requiere_domicilio = COALESCE($2, requiere_domicilio),
                requiere_url = COALESCE($3, requiere_url),
                requiere_fecha_final = COALESCE($4, requiere_fecha_final),
                etiqueta_reclamo = COALESCE($5, etiqueta_reclamo),
                etiqueta_reclamos = COALESCE($6, etiqueta_reclamos),
                etiqueta_profesional = COALESCE($7, etiqueta_profesional),
                etiqueta_profesionales = COALESCE($8, etiqueta_profesionales)
             WHERE empresa_id = $1
             RETURNING {TENANT_CONFIG_COLUMNS}"
        );
        let row = sqlx::query_as::<_, TenantConfig>(&sql)
            .bind(empresa_id)
            .bind(patch.requiere_domicilio)
            .bind(patch.requiere_url)
            .bind(patch.requiere_fecha_final)
            .bind(patch.etiqueta_reclamo.as_deref())
            .bind(patch.etiqueta_reclamos.as_deref())
            .bind(patch.etiqueta_profesional.as_deref())
            .bind(patch.etiqueta_profesionales.as_deref())
            .fetch_optional(self.pool()?)
            .await?;
        Ok(row)
    }

    async fn usuario(&self, usuario_id: DbId) -> AppResult<Option<Usuario>> {
        let sql = format!("SELECT {USUARIO_COLUMNS} FROM usuarios WHERE id = $1");
        let row = sqlx::query_as::<_, Usuario>(&sql)
            .bind(usuario_id)
            .fetch_optional(self.pool()?)
            .await?;
        Ok(row)
    }

    async fn set_apto_recibir(
        &self,
        empresa_id: DbId,
        profesional_id: DbId,
        apto: bool,
    ) -> AppResult<Option<Usuario>> {
        let sql = format!(
            "UPDATE usuarios SET apto_recibir = $3
             WHERE id = $2 AND empresa_id = $1 AND rol = 'profesional'
             RETURNING {USUARIO_COLUMNS}"
        );
        let row = sqlx::query_as::<_, Usuario>(&sql)
            .bind(empresa_id)
            .bind(profesional_id)
            .bind(apto)
            .fetch_optional(self.pool()?)
            .await?;
        Ok(row)
    }

    async fn especialidad(
        &self,
        empresa_id: DbId,
        especialidad_id: DbId,
    ) -> AppResult<Option<Especialidad>> {
        let row = sqlx::query_as::<_, Especialidad>(
            "SELECT id, empresa_id, nombre, activa FROM especialidades
             WHERE id = $2 AND empresa_id = $1",
        )
        .bind(empresa_id)
        .bind(especialidad_id)
        .fetch_optional(self.pool()?)
        .await?;
        Ok(row)
    }

    async fn cliente(&self, empresa_id: DbId, cliente_id: DbId) -> AppResult<Option<Cliente>> {
        let row = sqlx::query_as::<_, Cliente>(
            "SELECT id, empresa_id, nombre, dni, email, activo FROM clientes
             WHERE id = $2 AND empresa_id = $1",
        )
        .bind(empresa_id)
        .bind(cliente_id)
        .fetch_optional(self.pool()?)
        .await?;
        Ok(row)
    }

    async fn has_especialidad_assignment(
        &self,
        empresa_id: DbId,
        profesional_id: DbId,
        especialidad_id: DbId,
    ) -> AppResult<bool> {
        let assigned = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (
                SELECT 1 FROM profesional_especialidades pe
                JOIN especialidades e ON e.id = pe.especialidad_id
                WHERE pe.empresa_id = $1
                  AND e.empresa_id = $1
                  AND pe.profesional_id = $2
                  AND pe.especialidad_id = $3
                  AND e.activa
             )",
        )
        .bind(empresa_id)
        .bind(profesional_id)
        .bind(especialidad_id)
        .fetch_one(self.pool()?)
        .await?;
        Ok(assigned)
    }

    async fn reclamo(
        &self,
        empresa_id: Option<DbId>,
        reclamo_id: DbId,
    ) -> AppResult<Option<ReclamoDetalle>> {
        let mut query = QueryBuilder::<Postgres>::new(RECLAMO_SELECT);
        query.push(" WHERE r.id = ").push_bind(reclamo_id);
        if let Some(empresa_id) = empresa_id {
            query.push(" AND r.empresa_id = ").push_bind(empresa_id);
        }
        let row = query
            .build_query_as::<ReclamoRow>()
            .fetch_optional(self.pool()?)
            .await?;
        Ok(row.map(Into::into))
    }

    async fn list_reclamos(&self, filter: &ReclamoFilter) -> AppResult<Vec<ReclamoDetalle>> {
        let mut query = QueryBuilder::<Postgres>::new(RECLAMO_SELECT);
        query.push(" WHERE 1=1");
        if let Some(empresa_id) = filter.empresa_id {
            query.push(" AND r.empresa_id = ").push_bind(empresa_id);
        }
        if let Some(profesional_id) = filter.profesional_id {
            query.push(" AND r.profesional_id = ").push_bind(profesional_id);
        }
        if let Some(cliente_id) = filter.cliente_id {
            query.push(" AND r.cliente_id = ").push_bind(cliente_id);
        }
        if let Some(estado) = filter.estado {
            query.push(" AND r.estado = ").push_bind(estado.as_str());
        }
        query
            .push(" ORDER BY a.fecha DESC, a.hora_inicio DESC LIMIT ")
            .push_bind(filter.limit.clamp(1, 1000));

        let rows = query
            .build_query_as::<ReclamoRow>()
            .fetch_all(self.pool()?)
            .await?;
        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn list_blocks(
        &self,
        empresa_id: DbId,
        profesional_id: DbId,
        desde: Option<NaiveDate>,
        hasta: Option<NaiveDate>,
    ) -> AppResult<Vec<LedgerBlock>> {
        let pool = self.pool()?;

        let sql = format!(
            "SELECT {BLOQUEO_COLUMNS} FROM agenda_bloqueos
             WHERE empresa_id = $1 AND profesional_id = $2
               AND ($3::date IS NULL OR fecha >= $3)
               AND ($4::date IS NULL OR fecha <= $4)"
        );
        let manual = sqlx::query_as::<_, Bloqueo>(&sql)
            .bind(empresa_id)
            .bind(profesional_id)
            .bind(desde)
            .bind(hasta)
            .fetch_all(pool)
            .await?;

        let slots = sqlx::query_as::<_, ReclamoAgenda>(
            "SELECT id, reclamo_id, empresa_id, profesional_id, fecha, hora_inicio, hora_fin
             FROM reclamo_agenda
             WHERE empresa_id = $1 AND profesional_id = $2
               AND ($3::date IS NULL OR fecha >= $3)
               AND ($4::date IS NULL OR fecha <= $4)",
        )
        .bind(empresa_id)
        .bind(profesional_id)
        .bind(desde)
        .bind(hasta)
        .fetch_all(pool)
        .await?;

        let mut blocks = manual
            .iter()
            .map(LedgerBlock::from)
            .chain(slots.iter().map(LedgerBlock::from))
            .collect::<Vec<_>>();
        blocks.sort_by_key(|block| (block.fecha, block.hora_inicio));
        Ok(blocks)
    }

    async fn bloqueo(&self, empresa_id: DbId, bloqueo_id: DbId) -> AppResult<Option<Bloqueo>> {
        let sql = format!(
            "SELECT {BLOQUEO_COLUMNS} FROM agenda_bloqueos WHERE id = $2 AND empresa_id = $1"
        );
        let row = sqlx::query_as::<_, Bloqueo>(&sql)
            .bind(empresa_id)
            .bind(bloqueo_id)
            .fetch_optional(self.pool()?)
            .await?;
        Ok(row)
    }

    async fn delete_bloqueo(&self, empresa_id: DbId, bloqueo_id: DbId) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM agenda_bloqueos WHERE id = $2 AND empresa_id = $1")
            .bind(empresa_id)
            .bind(bloqueo_id)
            .execute(self.pool()?)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn begin_calendar(&self, key: CalendarKey) -> AppResult<Box<dyn CalendarTx>> {
        let mut tx = self.pool()?.begin().await?;
        // Held until commit or rollback; serializes check-then-insert per day.
        sqlx::query("SELECT pg_advisory_xact_lock(hashtextextended($1, 0))")
            .bind(key.lock_name())
            .execute(&mut *tx)
            .await?;
        Ok(Box::new(PgCalendarTx { tx, key }))
    }
}

struct PgCalendarTx {
    tx: Transaction<'static, Postgres>,
    key: CalendarKey,
}

impl PgCalendarTx {
    fn ensure_same_day(&self, interval: &Interval) -> AppResult<()> {
        if interval.fecha != self.key.fecha {
            return Err(AppError::Internal(format!(
                "interval on {} written through calendar lock for {}",
                interval.fecha, self.key.fecha
            )));
        }
        Ok(())
    }
}

fn detalle_sql(for_update: bool) -> String {
    let mut sql = format!("{RECLAMO_SELECT} WHERE r.id = $1 AND r.empresa_id = $2");
    if for_update {
        sql.push_str(" FOR UPDATE OF r, a");
    }
    sql
}

async fn fetch_detalle(
    conn: &mut PgConnection,
    empresa_id: DbId,
    reclamo_id: DbId,
) -> AppResult<Option<ReclamoDetalle>> {
    fetch_detalle_with(conn, empresa_id, reclamo_id, false).await
}

async fn fetch_detalle_with(
    conn: &mut PgConnection,
    empresa_id: DbId,
    reclamo_id: DbId,
    for_update: bool,
) -> AppResult<Option<ReclamoDetalle>> {
    let sql = detalle_sql(for_update);
    let row = sqlx::query_as::<_, ReclamoRow>(&sql)
        .bind(reclamo_id)
        .bind(empresa_id)
        .fetch_optional(conn)
        .await?;
    Ok(row.map(Into::into))
}

#[async_trait]
impl CalendarTx for PgCalendarTx {
    fn key(&self) -> CalendarKey {
        self.key
    }

    async fn reclamo(&mut self, reclamo_id: DbId) -> AppResult<Option<ReclamoDetalle>> {
        fetch_detalle_with(&mut *self.tx, self.key.empresa_id, reclamo_id, true).await
    }

    async fn has_overlap(
        &mut self,
        interval: &Interval,
        exclude_reclamo: Option<DbId>,
    ) -> AppResult<bool> {
        self.ensure_same_day(interval)?;
        let overlaps = sqlx::query_scalar::<_, bool>(
            "SELECT EXISTS (
                SELECT 1 FROM agenda_bloqueos
                WHERE empresa_id = $1 AND profesional_id = $2 AND fecha = $3
                  AND hora_inicio < $5 AND hora_fin > $4
                UNION ALL
                SELECT 1 FROM reclamo_agenda
                WHERE empresa_id = $1 AND profesional_id = $2 AND fecha = $3
                  AND hora_inicio < $5 AND hora_fin > $4
                  AND ($6::bigint IS NULL OR reclamo_id <> $6)
             )",
        )
        .bind(self.key.empresa_id)
        .bind(self.key.profesional_id)
        .bind(interval.fecha)
        .bind(interval.inicio)
        .bind(interval.fin)
        .bind(exclude_reclamo)
        .fetch_one(&mut *self.tx)
        .await?;
        Ok(overlaps)
    }

    async fn insert_bloqueo(&mut self, new: &NewBloqueo) -> AppResult<Bloqueo> {
        self.ensure_same_day(&new.interval)?;
        let sql = format!(
            "INSERT INTO agenda_bloqueos
                 (empresa_id, profesional_id, fecha, hora_inicio, hora_fin, nota)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {BLOQUEO_COLUMNS}"
        );
        let row = sqlx::query_as::<_, Bloqueo>(&sql)
            .bind(self.key.empresa_id)
            .bind(self.key.profesional_id)
            .bind(new.interval.fecha)
            .bind(new.interval.inicio)
            .bind(new.interval.fin)
            .bind(new.nota.as_deref())
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(row)
    }

    async fn insert_reclamo(&mut self, new: &NewReclamo) -> AppResult<ReclamoDetalle> {
        self.ensure_same_day(&new.interval)?;
        let reclamo_id = sqlx::query_scalar::<_, DbId>(
            "INSERT INTO reclamos (empresa_id, titulo, detalle, url, domicilio, estado, creador_id,
                                   especialidad_id, profesional_id, cliente_id, presupuesto)
             VALUES ($1, $2, $3, $4, $5, 'ABIERTO', $6, $7, $8, $9, $10)
             RETURNING id",
        )
        .bind(self.key.empresa_id)
        .bind(&new.titulo)
        .bind(&new.detalle)
        .bind(new.url.as_deref())
        .bind(new.domicilio.as_deref())
        .bind(new.creador_id)
        .bind(new.especialidad_id)
        .bind(self.key.profesional_id)
        .bind(new.cliente_id)
        .bind(new.presupuesto.as_deref())
        .fetch_one(&mut *self.tx)
        .await?;

        sqlx::query(
            "INSERT INTO reclamo_agenda
                 (reclamo_id, empresa_id, profesional_id, fecha, hora_inicio, hora_fin)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(reclamo_id)
        .bind(self.key.empresa_id)
        .bind(self.key.profesional_id)
        .bind(new.interval.fecha)
        .bind(new.interval.inicio)
        .bind(new.interval.fin)
        .execute(&mut *self.tx)
        .await?;

        fetch_detalle(&mut *self.tx, self.key.empresa_id, reclamo_id)
            .await?
            .ok_or_else(|| AppError::Internal("Could not read back created ticket.".to_string()))
    }

    async fn update_reclamo(
        &mut self,
        reclamo_id: DbId,
        patch: &ReclamoPatch,
    ) -> AppResult<Option<ReclamoDetalle>> {
        let updated = sqlx::query_scalar::<_, DbId>(
            "UPDATE reclamos SET
                titulo = COALESCE($3, titulo),
                detalle = COALESCE($4, detalle),
                url = COALESCE($5, url),
                domicilio = COALESCE($6, domicilio),
                presupuesto = COALESCE($7, presupuesto),
                estado = COALESCE($8, estado),
                nota_cierre = COALESCE($9, nota_cierre),
                updated_at = now()
             WHERE id = $2 AND empresa_id = $1
             RETURNING id",
        )
        .bind(self.key.empresa_id)
        .bind(reclamo_id)
        .bind(patch.titulo.as_deref())
        .bind(patch.detalle.as_deref())
        .bind(patch.url.as_deref())
        .bind(patch.domicilio.as_deref())
        .bind(patch.presupuesto.as_deref())
        .bind(patch.estado.map(|estado| estado.as_str()))
        .bind(patch.nota_cierre.as_deref())
        .fetch_optional(&mut *self.tx)
        .await?;

        if updated.is_none() {
            return Ok(None);
        }

        if let Some(interval) = &patch.agenda {
            self.ensure_same_day(interval)?;
            sqlx::query(
                "UPDATE reclamo_agenda SET fecha = $2, hora_inicio = $3, hora_fin = $4
                 WHERE reclamo_id = $1",
            )
            .bind(reclamo_id)
            .bind(interval.fecha)
            .bind(interval.inicio)
            .bind(interval.fin)
            .execute(&mut *self.tx)
            .await?;
        }

        fetch_detalle(&mut *self.tx, self.key.empresa_id, reclamo_id).await
    }

    async fn commit(self: Box<Self>) -> AppResult<()> {
        self.tx.commit().await?;
        Ok(())
    }
}
