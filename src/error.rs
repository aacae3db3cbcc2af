use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

/// Every variant carries a stable machine-readable code such as
/// `PASSENGER_COUNT_TOO_HIGH`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("missing input: {0}")]
    MissingInput(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("external service unavailable: {0}")]
    ExternalUnavailable(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn missing(code: &str) -> Self {
        Self::MissingInput(code.to_string())
    }

    pub fn invalid(code: &str) -> Self {
        Self::InvalidInput(code.to_string())
    }

    pub fn forbidden(code: &str) -> Self {
        Self::Forbidden(code.to_string())
    }

    pub fn not_found(code: &str) -> Self {
        Self::NotFound(code.to_string())
    }

    pub fn conflict(code: &str) -> Self {
        Self::Conflict(code.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::MissingInput(_) => StatusCode::BAD_REQUEST,
            Self::InvalidInput(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::ExternalUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Code shown to clients. Internal errors never leak their detail.
    pub fn code(&self) -> &str {
        match self {
            Self::MissingInput(code)
            | Self::InvalidInput(code)
            | Self::Forbidden(code)
            | Self::NotFound(code)
            | Self::Conflict(code)
            | Self::ExternalUnavailable(code) => code,
            Self::Unauthorized(_) => "UNAUTHORIZED",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

/// Unique indexes with their own conflict code. Postgres names the index in
/// its message, SQLite lists the indexed columns instead.
const UNIQUE_CONFLICTS: &[(&str, &str, &str)] = &[
    ("idx_trip_active_unique", "trip.driver_id", "TRIP_ALREADY_EXISTS"),
    ("idx_booking_active_rider", "booking.trip_id", "TRIP_ALREADY_BOOKED"),
];

/// Conflict code for a unique violation reported as `message`.
fn unique_conflict_code(message: &str) -> &'static str {
    UNIQUE_CONFLICTS
        .iter()
        .find(|(index, columns, _)| message.contains(index) || message.contains(columns))
        .map(|(_, _, code)| *code)
        .unwrap_or("ALREADY_EXISTS")
}

impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        if let Some(SqlErr::UniqueConstraintViolation(message)) = err.sql_err() {
            tracing::debug!(%message, "unique constraint violated");
            return AppError::conflict(unique_conflict_code(&message));
        }
        tracing::error!(error = %err, "database error");
        AppError::Internal(err.to_string())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if let AppError::Unauthorized(detail) = &self {
            tracing::debug!(%detail, "rejected credentials");
        }
        let body = Json(serde_json::json!({
            "code": self.code(),
            "status": status.as_u16(),
        }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classes() {
        assert_eq!(AppError::missing("X").status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            AppError::invalid("PASSENGER_COUNT_TOO_HIGH").status(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
        assert_eq!(AppError::forbidden("X").status(), StatusCode::FORBIDDEN);
        assert_eq!(AppError::not_found("X").status(), StatusCode::NOT_FOUND);
        assert_eq!(AppError::conflict("X").status(), StatusCode::CONFLICT);
        assert_eq!(
            AppError::ExternalUnavailable("ROUTE_UNAVAILABLE".into()).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[test]
    fn test_internal_detail_is_hidden() {
        let err = AppError::Internal("relation \"trip\" does not exist".to_string());
        assert_eq!(err.code(), "INTERNAL_ERROR");

        let err = AppError::Unauthorized("ExpiredSignature".to_string());
        assert_eq!(err.code(), "UNAUTHORIZED");
    }

    #[test]
    fn test_code_is_payload() {
        let err = AppError::forbidden("DRIVER_CANNOT_BOOK_HIS_OWN_TRIP");
        assert_eq!(err.code(), "DRIVER_CANNOT_BOOK_HIS_OWN_TRIP");
    }

    #[test]
    fn test_unique_violation_codes() {
        // Postgres
        assert_eq!(
            unique_conflict_code(
                "duplicate key value violates unique constraint \"idx_trip_active_unique\""
            ),
            "TRIP_ALREADY_EXISTS"
        );
        assert_eq!(
            unique_conflict_code(
                "duplicate key value violates unique constraint \"idx_booking_active_rider\""
            ),
            "TRIP_ALREADY_BOOKED"
        );
        // SQLite
        assert_eq!(
            unique_conflict_code(
                "UNIQUE constraint failed: trip.driver_id, trip.departure_address_id, \
                 trip.arrival_address_id, trip.timestamp_proposed, trip.total_passenger_count"
            ),
            "TRIP_ALREADY_EXISTS"
        );
        assert_eq!(
            unique_conflict_code("UNIQUE constraint failed: booking.trip_id, booking.user_id"),
            "TRIP_ALREADY_BOOKED"
        );
        assert_eq!(
            unique_conflict_code(
                "duplicate key value violates unique constraint \"idx_address_unique\""
            ),
            "ALREADY_EXISTS"
        );
    }
}
