//! Appointment conflict engine.
//!
//! Every write that places something on a professional's calendar, whether a
//! manual block or a ticket slot, goes through [`validate_and_normalize`]
//! while holding that calendar day's lock.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::{
    error::{AppError, AppResult},
    models::{DbId, Interval, TenantConfig},
    repository::store::CalendarTx,
};

/// Implicit end of an open-ended appointment.
pub fn end_of_day() -> NaiveTime {
    NaiveTime::from_hms_opt(23, 59, 59).unwrap_or_default()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleRequest {
    pub fecha: NaiveDate,
    pub hora_inicio: NaiveTime,
    pub hora_fin: Option<NaiveTime>,
}

/// Checks that need no calendar access, in order: interval shape, past
/// start, then the company's end-time policy. A start at the current instant
/// counts as past, and an implied end must still leave a non-empty interval.
///
/// `now` is the wall clock in the platform timezone. Intervals cannot cross
/// midnight.
pub fn normalize_interval(
    config: &TenantConfig,
    now: NaiveDateTime,
    request: &ScheduleRequest,
) -> AppResult<Interval> {
    if let Some(fin) = request.hora_fin {
        if fin <= request.hora_inicio {
            return Err(AppError::InvalidInterval(format!(
                "End time {} must be after start time {} on the same day.",
                fin.format("%H:%M:%S"),
                request.hora_inicio.format("%H:%M:%S")
            )));
        }
    }

    if request.fecha.and_time(request.hora_inicio) <= now {
        return Err(AppError::PastSchedule(
            "Cannot schedule in the past.".to_string(),
        ));
    }

    let fin = match request.hora_fin {
        Some(fin) => fin,
        None if config.requiere_fecha_final => {
            return Err(AppError::MissingEndTime(
                "This company requires an end time.".to_string(),
            ))
        }
        None => end_of_day(),
    };
    if fin <= request.hora_inicio {
        return Err(AppError::InvalidInterval(
            "An open-ended appointment must start before the end of the day.".to_string(),
        ));
    }

    Ok(Interval {
        fecha: request.fecha,
        inicio: request.hora_inicio,
        fin,
    })
}

/// Full check against the locked calendar. Returns the interval to persist.
///
/// `exclude_reclamo` is the ticket being rescheduled, whose current slot must
/// not conflict with itself.
pub async fn validate_and_normalize(
    tx: &mut dyn CalendarTx,
    config: &TenantConfig,
    now: NaiveDateTime,
    request: &ScheduleRequest,
    exclude_reclamo: Option<DbId>,
) -> AppResult<Interval> {
    let interval = normalize_interval(config, now, request)?;

    if tx.has_overlap(&interval, exclude_reclamo).await? {
        let key = tx.key();
        tracing::debug!(
            empresa_id = key.empresa_id,
            profesional_id = key.profesional_id,
            fecha = %interval.fecha,
            "slot conflict"
        );
        return Err(AppError::SlotConflict(format!(
            "The professional already has an appointment overlapping {} {}-{}.",
            interval.fecha,
            interval.inicio.format("%H:%M"),
            interval.fin.format("%H:%M")
        )));
    }

    Ok(interval)
}
