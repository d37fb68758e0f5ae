use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

/// Every failure the service can report.
///
/// The variant is the machine-readable kind. Callers and the HTTP adapter
/// branch on the variant (or on [`AppError::code`]), never on the message,
/// which is only meant for humans.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    InvalidInterval(String),
    #[error("{0}")]
    PastSchedule(String),
    #[error("{0}")]
    MissingEndTime(String),
    #[error("{0}")]
    SlotConflict(String),
    #[error("{0}")]
    EntityNotFound(String),
    #[error("{0}")]
    SpecialtyMismatch(String),
    #[error("{0}")]
    ProfessionalUnavailable(String),
    #[error("{0}")]
    AlreadyClosed(String),
    #[error("{0}")]
    ClosingNoteRequired(String),
    #[error("{0}")]
    InvalidState(String),
    #[error("{0}")]
    Unauthorized(String),
    #[error("{0}")]
    Forbidden(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    Dependency(String),
    #[error("{0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InvalidInterval(_) => "INVALID_INTERVAL",
            Self::PastSchedule(_) => "PAST_SCHEDULE",
            Self::MissingEndTime(_) => "MISSING_END_TIME",
            Self::SlotConflict(_) => "SLOT_CONFLICT",
            Self::EntityNotFound(_) => "ENTITY_NOT_FOUND",
            Self::SpecialtyMismatch(_) => "SPECIALTY_MISMATCH",
            Self::ProfessionalUnavailable(_) => "PROFESSIONAL_UNAVAILABLE",
            Self::AlreadyClosed(_) => "ALREADY_CLOSED",
            Self::ClosingNoteRequired(_) => "CLOSING_NOTE_REQUIRED",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Forbidden(_) => "FORBIDDEN",
            Self::NotFound(_) => "NOT_FOUND",
            Self::Dependency(_) => "DEPENDENCY_UNAVAILABLE",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_)
            | Self::InvalidInterval(_)
            | Self::PastSchedule(_)
            | Self::MissingEndTime(_) => StatusCode::BAD_REQUEST,
            Self::SlotConflict(_) | Self::AlreadyClosed(_) => StatusCode::CONFLICT,
            Self::EntityNotFound(_)
            | Self::SpecialtyMismatch(_)
            | Self::ProfessionalUnavailable(_)
            | Self::ClosingNoteRequired(_)
            | Self::InvalidState(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Dependency(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for AppError {
    fn from(error: sqlx::Error) -> Self {
        tracing::error!(%error, "database error");
        AppError::Internal(format!("Database request failed: {error}"))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Internal(detail) => {
                tracing::error!(error = %detail, "internal error");
                "An internal error occurred.".to_string()
            }
            Self::Dependency(detail) => {
                tracing::error!(error = %detail, "dependency unavailable");
                detail.clone()
            }
            other => other.to_string(),
        };

        let body = json!({
            "error": message,
            "code": self.code(),
        });
        (status, Json(body)).into_response()
    }
}
