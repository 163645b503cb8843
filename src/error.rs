use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use tracing::error;

/// Error taxonomy surfaced to the HTTP boundary. Every failure is scoped to
/// the single operation that produced it; nothing here is fatal to the
/// process.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("Invalid credentials")]
    InvalidCredentials,
    #[error("Access denied")]
    AccessDenied,
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("No electricity rate configured")]
    NoActiveRate,
    #[error("Payment amount exceeds bill total")]
    Overpayment,
    #[error("Invalid or expired shared code")]
    InvalidCode,
    #[error("{0}")]
    Conflict(String),
    #[error("Internal server error")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_)
            | Self::NoActiveRate
            | Self::Overpayment
            | Self::InvalidCode => StatusCode::BAD_REQUEST,
            Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::AccessDenied => StatusCode::FORBIDDEN,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Machine-readable reason so callers can react to domain-rule
    /// violations (e.g. prompt for a rate before billing).
    fn reason(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::InvalidCredentials => "invalid_credentials",
            Self::AccessDenied => "access_denied",
            Self::NotFound(_) => "not_found",
            Self::NoActiveRate => "no_active_rate",
            Self::Overpayment => "overpayment",
            Self::InvalidCode => "invalid_code",
            Self::Conflict(_) => "conflict",
            Self::Internal(_) => "internal",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let Self::Internal(ref e) = self {
            error!(error = %e, "internal error");
        }
        let body = json!({ "error": self.to_string(), "code": self.reason() });
        (self.status(), Json(body)).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => Self::NotFound("Record"),
            sqlx::Error::Database(db) if db.is_unique_violation() => {
                Self::Conflict("Duplicate value violates a uniqueness constraint".into())
            }
            other => Self::Internal(other.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_match_taxonomy() {
        assert_eq!(
            ApiError::validation("bad").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ApiError::AccessDenied.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::NotFound("Bill").status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::NoActiveRate.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Overpayment.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::InvalidCode.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::Conflict("dup".into()).status(),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn reason_codes_are_stable() {
        assert_eq!(ApiError::NoActiveRate.reason(), "no_active_rate");
        assert_eq!(ApiError::Overpayment.reason(), "overpayment");
        assert_eq!(ApiError::InvalidCode.reason(), "invalid_code");
    }

    #[test]
    fn row_not_found_maps_to_not_found() {
        let err: ApiError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
