use crate::{
    error::{AppError, AppResult},
    models::{DbId, ReclamoDetalle, ReclamoEstado, TenantConfig},
    repository::store::{CalendarKey, NewReclamo, ReclamoFilter, ReclamoPatch},
    schemas::{
        clamp_limit, ensure_url, non_empty_opt, parse_date, parse_opt_date, parse_opt_time,
        parse_time, CreateReclamoInput, ReclamosQuery, UpdateReclamoInput,
    },
    services::{
        notifications::{self, dispatch_after_commit},
        scheduling::{validate_and_normalize, ScheduleRequest},
    },
    state::AppState,
    tenancy::{Capability, Scope},
};

/// Create payload after the mandatory-field check.
struct ValidatedReclamo {
    titulo: String,
    detalle: String,
    url: Option<String>,
    domicilio: Option<String>,
    especialidad_id: DbId,
    profesional_id: DbId,
    cliente_id: DbId,
    presupuesto: Option<String>,
    schedule: ScheduleRequest,
}

fn not_found() -> AppError {
    AppError::NotFound("Ticket not found.".to_string())
}

fn require_fields(
    input: &CreateReclamoInput,
    config: &TenantConfig,
) -> AppResult<ValidatedReclamo> {
    let titulo = non_empty_opt(input.titulo.as_deref());
    let detalle = non_empty_opt(input.detalle.as_deref());
    let url = non_empty_opt(input.url.as_deref());
    let domicilio = non_empty_opt(input.domicilio.as_deref());
    let fecha = non_empty_opt(input.fecha.as_deref());
    let hora_inicio = non_empty_opt(input.hora_inicio.as_deref());

    let missing = [
        ("titulo", titulo.is_some()),
        ("detalle", detalle.is_some()),
        ("especialidad_id", input.especialidad_id.is_some()),
        ("cliente_id", input.cliente_id.is_some()),
        ("profesional_id", input.profesional_id.is_some()),
        ("fecha", fecha.is_some()),
        ("hora_inicio", hora_inicio.is_some()),
        ("url", !config.requiere_url || url.is_some()),
        ("domicilio", !config.requiere_domicilio || domicilio.is_some()),
    ]
    .into_iter()
    .filter(|(_, present)| !present)
    .map(|(field, _)| field)
    .collect::<Vec<_>>();

    let (
        Some(titulo),
        Some(detalle),
        Some(especialidad_id),
        Some(profesional_id),
        Some(cliente_id),
        Some(fecha),
        Some(hora_inicio),
        true,
    ) = (
        titulo,
        detalle,
        input.especialidad_id,
        input.profesional_id,
        input.cliente_id,
        fecha,
        hora_inicio,
        missing.is_empty(),
    )
    else {
        return Err(AppError::Validation(format!(
            "Missing required fields: {}.",
            missing.join(", ")
        )));
    };

    if let Some(url) = url.as_deref() {
        ensure_url(url)?;
    }

    Ok(ValidatedReclamo {
        titulo,
        detalle,
        url,
        domicilio,
        especialidad_id,
        profesional_id,
        cliente_id,
        presupuesto: non_empty_opt(input.presupuesto.as_deref()),
        schedule: ScheduleRequest {
            fecha: parse_date("fecha", &fecha)?,
            hora_inicio: parse_time("hora_inicio", &hora_inicio)?,
            hora_fin: parse_opt_time("hora_fin", input.hora_fin.as_deref())?,
        },
    })
}

/// Creates a ticket together with its calendar slot.
///
/// Failure order: specialty assignment, mandatory fields, entity existence,
/// professional availability, then the conflict engine. The assignment
/// notification is sent only after commit.
pub async fn create_reclamo(
    state: &AppState,
    scope: &Scope,
    input: CreateReclamoInput,
) -> AppResult<ReclamoDetalle> {
    scope.require(Capability::ManageTickets)?;
    let empresa_id = scope.tenant_for(input.empresa_id)?;

    if let (Some(especialidad_id), Some(profesional_id)) =
        (input.especialidad_id, input.profesional_id)
    {
        let assigned = state
            .store
            .has_especialidad_assignment(empresa_id, profesional_id, especialidad_id)
            .await?;
        if !assigned {
            return Err(AppError::SpecialtyMismatch(format!(
                "Professional {profesional_id} does not hold specialty {especialidad_id}."
            )));
        }
    }

    let config = state.tenant_configs.resolve(empresa_id).await?;
    let valid = require_fields(&input, &config)?;

    if state
        .store
        .especialidad(empresa_id, valid.especialidad_id)
        .await?
        .is_none()
    {
        return Err(AppError::EntityNotFound(format!(
            "Specialty {} not found.",
            valid.especialidad_id
        )));
    }
    let profesional = state
        .store
        .usuario(valid.profesional_id)
        .await?
        .filter(|usuario| usuario.is_profesional_of(empresa_id))
        .ok_or_else(|| {
            AppError::EntityNotFound(format!("Professional {} not found.", valid.profesional_id))
        })?;
    if state
        .store
        .cliente(empresa_id, valid.cliente_id)
        .await?
        .is_none()
    {
        return Err(AppError::EntityNotFound(format!(
            "Client {} not found.",
            valid.cliente_id
        )));
    }

    if !profesional.apto_recibir {
        return Err(AppError::ProfessionalUnavailable(format!(
            "Professional {} is not accepting new work.",
            profesional.id
        )));
    }

    let mut tx = state
        .store
        .begin_calendar(CalendarKey {
            empresa_id,
            profesional_id: profesional.id,
            fecha: valid.schedule.fecha,
        })
        .await?;
    let interval = validate_and_normalize(
        tx.as_mut(),
        &config,
        state.local_now(),
        &valid.schedule,
        None,
    )
    .await?;
    let detalle = tx
        .insert_reclamo(&NewReclamo {
            titulo: valid.titulo,
            detalle: valid.detalle,
            url: valid.url,
            domicilio: valid.domicilio,
            creador_id: scope.user_id,
            especialidad_id: valid.especialidad_id,
            cliente_id: valid.cliente_id,
            presupuesto: valid.presupuesto,
            interval,
        })
        .await?;
    tx.commit().await?;

    tracing::info!(
        empresa_id,
        reclamo_id = detalle.reclamo.id,
        profesional_id = profesional.id,
        fecha = %detalle.agenda.fecha,
        "ticket created"
    );
    dispatch_after_commit(
        state.notifier.clone(),
        notifications::assigned(&config, &detalle),
    );
    Ok(detalle)
}

/// Tickets outside the caller's company, or not assigned to a calling
/// professional, are reported as missing.
async fn load_visible(
    state: &AppState,
    scope: &Scope,
    reclamo_id: DbId,
) -> AppResult<ReclamoDetalle> {
    state
        .store
        .reclamo(scope.tenant_filter(), reclamo_id)
        .await?
        .filter(|detalle| {
            !scope.is_profesional() || detalle.reclamo.profesional_id == scope.user_id
        })
        .ok_or_else(not_found)
}

pub async fn get_reclamo(
    state: &AppState,
    scope: &Scope,
    reclamo_id: DbId,
) -> AppResult<ReclamoDetalle> {
    scope.require(Capability::ViewTickets)?;
    load_visible(state, scope, reclamo_id).await
}

pub async fn list_reclamos(
    state: &AppState,
    scope: &Scope,
    query: ReclamosQuery,
) -> AppResult<Vec<ReclamoDetalle>> {
    scope.require(Capability::ViewTickets)?;

    let filter = ReclamoFilter {
        empresa_id: scope.tenant_filter().or(query.empresa_id),
        profesional_id: if scope.is_profesional() {
            Some(scope.user_id)
        } else {
            query.profesional_id
        },
        cliente_id: query.cliente_id,
        estado: query.estado,
        limit: clamp_limit(query.limit),
    };
    state.store.list_reclamos(&filter).await
}

/// Checks a requested state change. Returns the state to persist, or `None`
/// when the state stays as it is.
pub fn check_transition(
    current: ReclamoEstado,
    requested: Option<ReclamoEstado>,
    nota_cierre: Option<&str>,
) -> AppResult<Option<ReclamoEstado>> {
    let Some(next) = requested else {
        return Ok(None);
    };

    if next.requires_closing_note() && nota_cierre.is_none() {
        return Err(AppError::ClosingNoteRequired(format!(
            "A closing note is required to move a ticket to {next}."
        )));
    }

    if current == next {
        return match current {
            ReclamoEstado::Cerrado => Err(AppError::AlreadyClosed(
                "The ticket is already closed.".to_string(),
            )),
            ReclamoEstado::Cancelado => Err(AppError::InvalidState(
                "The ticket is already cancelled.".to_string(),
            )),
            _ => Ok(None),
        };
    }

    if !current.can_transition_to(next) {
        return Err(AppError::InvalidState(format!(
            "Cannot move a ticket from {current} to {next}."
        )));
    }
    Ok(Some(next))
}

pub async fn update_reclamo(
    state: &AppState,
    scope: &Scope,
    reclamo_id: DbId,
    input: UpdateReclamoInput,
) -> AppResult<ReclamoDetalle> {
    if !scope.can(Capability::ManageTickets) {
        scope.require(Capability::UpdateAssignedTickets)?;
    }
    let visible = load_visible(state, scope, reclamo_id).await?;

    if scope.is_profesional() {
        if input.touches_details() {
            return Err(AppError::Forbidden(
                "Forbidden: professionals can only change the state and closing note."
                    .to_string(),
            ));
        }
        if input.estado == Some(ReclamoEstado::Reabierto) {
            return Err(AppError::Forbidden(
                "Forbidden: professionals cannot reopen tickets.".to_string(),
            ));
        }
    }

    let url = non_empty_opt(input.url.as_deref());
    if let Some(url) = url.as_deref() {
        ensure_url(url)?;
    }
    let nota_cierre = non_empty_opt(input.nota_cierre.as_deref());

    // Omitted parts of a reschedule keep their current value.
    let schedule = if input.touches_schedule() {
        Some(ScheduleRequest {
            fecha: parse_opt_date("fecha", input.fecha.as_deref())?
                .unwrap_or(visible.agenda.fecha),
            hora_inicio: parse_opt_time("hora_inicio", input.hora_inicio.as_deref())?
                .unwrap_or(visible.agenda.hora_inicio),
            hora_fin: Some(
                parse_opt_time("hora_fin", input.hora_fin.as_deref())?
                    .unwrap_or(visible.agenda.hora_fin),
            ),
        })
    } else {
        None
    };

    let empresa_id = visible.reclamo.empresa_id;
    let config = state.tenant_configs.resolve(empresa_id).await?;

    let mut tx = state
        .store
        .begin_calendar(CalendarKey {
            empresa_id,
            profesional_id: visible.reclamo.profesional_id,
            fecha: schedule.map_or(visible.agenda.fecha, |schedule| schedule.fecha),
        })
        .await?;
    let current = tx.reclamo(reclamo_id).await?.ok_or_else(not_found)?;

    let estado = check_transition(current.reclamo.estado, input.estado, nota_cierre.as_deref())?;
    let agenda = match schedule {
        Some(schedule) => {
            if estado.unwrap_or(current.reclamo.estado).is_terminal() {
                return Err(AppError::InvalidState(
                    "Closed or cancelled tickets cannot be rescheduled.".to_string(),
                ));
            }
            Some(
                validate_and_normalize(
                    tx.as_mut(),
                    &config,
                    state.local_now(),
                    &schedule,
                    Some(reclamo_id),
                )
                .await?,
            )
        }
        None => None,
    };

    let patch = ReclamoPatch {
        titulo: non_empty_opt(input.titulo.as_deref()),
        detalle: non_empty_opt(input.detalle.as_deref()),
        url,
        domicilio: non_empty_opt(input.domicilio.as_deref()),
        presupuesto: non_empty_opt(input.presupuesto.as_deref()),
        estado,
        nota_cierre,
        agenda,
    };
    let updated = tx
        .update_reclamo(reclamo_id, &patch)
        .await?
        .ok_or_else(not_found)?;
    tx.commit().await?;

    tracing::info!(
        empresa_id,
        reclamo_id,
        user_id = scope.user_id,
        estado = %updated.reclamo.estado,
        rescheduled = patch.agenda.is_some(),
        "ticket updated"
    );
    dispatch_after_commit(
        state.notifier.clone(),
        notifications::updated(&config, &updated),
    );
    Ok(updated)
}

/// Re-sends the appointment to the assigned professional. Nothing is written.
pub async fn send_reminder(state: &AppState, scope: &Scope, reclamo_id: DbId) -> AppResult<()> {
    scope.require(Capability::ManageTickets)?;
    let detalle = load_visible(state, scope, reclamo_id).await?;
    if detalle.reclamo.estado.is_terminal() {
        return Err(AppError::InvalidState(format!(
            "Cannot send a reminder for a ticket in state {}.",
            detalle.reclamo.estado
        )));
    }

    let config = state
        .tenant_configs
        .resolve(detalle.reclamo.empresa_id)
        .await?;
    dispatch_after_commit(
        state.notifier.clone(),
        notifications::reminder(&config, &detalle),
    );
    tracing::info!(
        empresa_id = detalle.reclamo.empresa_id,
        reclamo_id,
        "ticket reminder queued"
    );
    Ok(())
}
