use axum::{
    extract::rejection::QueryRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use uuid::Uuid;

/// Outcome of a failed core operation.
///
/// Every service and store returns this; the HTTP layer maps it onto
/// [`ApiError`]. A foreign-tenant record is reported exactly like a missing one.
#[derive(Debug, thiserror::Error)]
pub enum ClinicError {
    #[error("{message}")]
    Validation { code: &'static str, message: String },

    #[error("time slot is already booked")]
    SlotConflict { appointment_id: Option<Uuid> },

    #[error("{entity} not found")]
    NotFound { entity: &'static str },

    #[error("{entity} is still referenced by appointments or treatments")]
    HasDependents { entity: &'static str },

    #[error("internal error: {0}")]
    Internal(String),
}

impl ClinicError {
    pub fn validation(code: &'static str, message: impl Into<String>) -> Self {
        ClinicError::Validation {
            code,
            message: message.into(),
        }
    }

    pub fn invalid_range() -> Self {
        Self::validation("INVALID_RANGE", "end_time must be after start_time")
    }

    pub fn missing_field(field: &str) -> Self {
        Self::validation("VALIDATION_ERROR", format!("{field} is required"))
    }

    /// A record names a doctor, patient or appointment the clinic lacks.
    pub fn unknown_reference() -> Self {
        Self::validation(
            "UNKNOWN_REFERENCE",
            "referenced doctor, patient or appointment does not exist",
        )
    }

    pub fn not_found(entity: &'static str) -> Self {
        ClinicError::NotFound { entity }
    }
}

impl From<sqlx::Error> for ClinicError {
    fn from(e: sqlx::Error) -> Self {
        ClinicError::Internal(format!("db error: {e}"))
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: ErrorObject,
}

#[derive(Debug, Serialize)]
pub struct ErrorObject {
    pub code: String,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(&'static str, String),
    Forbidden(&'static str, String),
    BadRequest(&'static str, String),
    NotFound(&'static str, String),
    Conflict(&'static str, String),
    Internal(String),
}

impl ApiError {
    pub fn session_expired() -> Self {
        ApiError::Unauthorized("SESSION_EXPIRED", "Session expired".into())
    }

    pub fn forbidden(message: &str) -> Self {
        ApiError::Forbidden("FORBIDDEN", message.into())
    }

    fn to_error_response(code: &str, message: &str) -> Json<ErrorResponse> {
        Json(ErrorResponse {
            error: ErrorObject {
                code: code.to_string(),
                message: message.to_string(),
            },
        })
    }
}

impl From<ClinicError> for ApiError {
    fn from(err: ClinicError) -> Self {
        let message = err.to_string();
        match err {
            ClinicError::Validation { code, .. } => ApiError::BadRequest(code, message),
            ClinicError::SlotConflict { appointment_id } => {
                let message = match appointment_id {
                    Some(id) => format!("{message} by appointment {id}"),
                    None => message,
                };
                ApiError::Conflict("SLOT_CONFLICT", message)
            }
            ClinicError::NotFound { .. } => ApiError::NotFound("NOT_FOUND", message),
            ClinicError::HasDependents { .. } => ApiError::Conflict("HAS_DEPENDENTS", message),
            ClinicError::Internal(detail) => {
                // detail stays in the log, never in the body
                tracing::error!(error = %detail, "internal failure");
                ApiError::Internal("Internal server error".into())
            }
        }
    }
}

/// Malformed or unrecognised query-string parameters.
impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest("INVALID_QUERY", rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Unauthorized(code, msg) => {
                (StatusCode::UNAUTHORIZED, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::Forbidden(code, msg) => {
                (StatusCode::FORBIDDEN, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::BadRequest(code, msg) => {
                (StatusCode::BAD_REQUEST, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::NotFound(code, msg) => {
                (StatusCode::NOT_FOUND, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::Conflict(code, msg) => {
                (StatusCode::CONFLICT, ApiError::to_error_response(code, &msg)).into_response()
            }
            ApiError::Internal(msg) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ApiError::to_error_response("INTERNAL", &msg),
            )
                .into_response(),
        }
    }
}
