use crate::{
    error::{AppError, AppResult},
    models::{Bloqueo, DbId, LedgerBlock},
    repository::store::{CalendarKey, NewBloqueo},
    schemas::{
        non_empty_opt, parse_date, parse_opt_date, parse_opt_time, parse_time, AgendaQuery,
        CreateBloqueoInput,
    },
    services::scheduling::{validate_and_normalize, ScheduleRequest},
    state::AppState,
    tenancy::{Capability, Scope},
};

/// Professionals manage only their own calendar.
fn target_profesional(scope: &Scope, profesional_id: DbId) -> AppResult<DbId> {
    if scope.is_profesional() && profesional_id != scope.user_id {
        return Err(AppError::Forbidden(
            "Forbidden: professionals can only manage their own calendar.".to_string(),
        ));
    }
    Ok(profesional_id)
}

async fn ensure_profesional(
    state: &AppState,
    empresa_id: DbId,
    profesional_id: DbId,
) -> AppResult<()> {
    let usuario = state.store.usuario(profesional_id).await?;
    if usuario.is_some_and(|usuario| usuario.is_profesional_of(empresa_id)) {
        return Ok(());
    }
    Err(AppError::EntityNotFound(format!(
        "Professional {profesional_id} not found."
    )))
}

pub async fn create_manual_block(
    state: &AppState,
    scope: &Scope,
    profesional_id: DbId,
    input: CreateBloqueoInput,
) -> AppResult<Bloqueo> {
    scope.require(Capability::ManageAgenda)?;
    let empresa_id = scope.tenant_for(input.empresa_id)?;
    let profesional_id = target_profesional(scope, profesional_id)?;

    let request = ScheduleRequest {
        fecha: parse_date("fecha", &input.fecha)?,
        hora_inicio: parse_time("hora_inicio", &input.hora_inicio)?,
        hora_fin: parse_opt_time("hora_fin", input.hora_fin.as_deref())?,
    };

    ensure_profesional(state, empresa_id, profesional_id).await?;
    let config = state.tenant_configs.resolve(empresa_id).await?;

    let mut tx = state
        .store
        .begin_calendar(CalendarKey {
            empresa_id,
            profesional_id,
            fecha: request.fecha,
        })
        .await?;
    let interval =
        validate_and_normalize(tx.as_mut(), &config, state.local_now(), &request, None).await?;
    let block = tx
        .insert_bloqueo(&NewBloqueo {
            interval,
            nota: non_empty_opt(input.nota.as_deref()),
        })
        .await?;
    tx.commit().await?;

    tracing::info!(
        empresa_id,
        profesional_id,
        bloqueo_id = block.id,
        fecha = %block.fecha,
        "manual block created"
    );
    Ok(block)
}

/// Manual blocks and ticket slots of one professional, ordered by day and start.
pub async fn list_blocks(
    state: &AppState,
    scope: &Scope,
    profesional_id: DbId,
    query: AgendaQuery,
) -> AppResult<Vec<LedgerBlock>> {
    scope.require(Capability::ViewAgenda)?;
    let empresa_id = scope.tenant_for(query.empresa_id)?;
    let profesional_id = target_profesional(scope, profesional_id)?;

    let desde = parse_opt_date("desde", query.desde.as_deref())?;
    let hasta = parse_opt_date("hasta", query.hasta.as_deref())?;
    if let (Some(desde), Some(hasta)) = (desde, hasta) {
        if desde > hasta {
            return Err(AppError::Validation(
                "desde must not be after hasta.".to_string(),
            ));
        }
    }

    ensure_profesional(state, empresa_id, profesional_id).await?;
    state
        .store
        .list_blocks(empresa_id, profesional_id, desde, hasta)
        .await
}

/// Only manual blocks can be deleted; ticket slots follow their ticket.
pub async fn delete_manual_block(
    state: &AppState,
    scope: &Scope,
    bloqueo_id: DbId,
    empresa_id: Option<DbId>,
) -> AppResult<()> {
    scope.require(Capability::ManageAgenda)?;
    let empresa_id = scope.tenant_for(empresa_id)?;

    let block = state
        .store
        .bloqueo(empresa_id, bloqueo_id)
        .await?
        .filter(|block| !scope.is_profesional() || block.profesional_id == scope.user_id)
        .ok_or_else(|| AppError::NotFound("Block not found.".to_string()))?;

    if !state.store.delete_bloqueo(empresa_id, block.id).await? {
        return Err(AppError::NotFound("Block not found.".to_string()));
    }
    tracing::info!(empresa_id, bloqueo_id, "manual block deleted");
    Ok(())
}
