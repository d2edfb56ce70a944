//! Error type shared by the tap path, the stores and the HTTP layer.
//!
//! Tap-path failures reach the caller as typed errors; background
//! finalization logs them instead because nobody is waiting on the result.

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AttendanceError {
    /// Unregistered card, unknown user, or no class slot near the tap time.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Card-binding collision during registration.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// The store failed while reading or writing attendance data.
    #[error("Transient data error: {0}")]
    TransientData(String),
}

pub type Result<T> = std::result::Result<T, AttendanceError>;

impl AttendanceError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(what: impl Into<String>) -> Self {
        Self::Conflict(what.into())
    }

    #[inline]
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    #[inline]
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    #[inline]
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientData(_))
    }
}

impl From<sqlx::Error> for AttendanceError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &e {
            // MySQL integrity constraint violation, e.g. duplicate card UID
            if db_err.code().as_deref() == Some("23000") {
                return Self::Conflict(db_err.message().to_string());
            }
        }
        Self::TransientData(e.to_string())
    }
}

impl ResponseError for AttendanceError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::TransientData(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            Self::TransientData(_) => "Something went wrong, Contact with system admin".to_string(),
            other => other.to_string(),
        };
        HttpResponse::build(self.status_code()).json(json!({ "error": message }))
    }
}
