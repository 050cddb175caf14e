//! Error taxonomy for the gateway (§7 of the design).
//!
//! Admission errors map straight to HTTP status codes; steady-state
//! infrastructure errors carry an `is_retryable()` hint so call sites can
//! decide whether a failure is advisory or should tear the connection down.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use error_handling::ErrorResponse;
use thiserror::Error;

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Error, Clone)]
pub enum GatewayError {
    #[error("missing required header: {0}")]
    MissingHeader(&'static str),

    #[error("invalid app version header")]
    UnsupportedVersion,

    #[error("invalid credential")]
    InvalidToken,

    #[error("token verifier unavailable: {0}")]
    VerifierUnavailable(String),

    #[error("connection registry at capacity")]
    CapacityExceeded,

    #[error("presence store error: {0}")]
    Presence(String),

    #[error("mailbox store error: {0}")]
    Mailbox(String),

    #[error("bus error: {0}")]
    Bus(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl GatewayError {
    pub fn status_code(&self) -> u16 {
        match self {
            GatewayError::MissingHeader(_) | GatewayError::UnsupportedVersion => 400,
            GatewayError::InvalidToken => 401,
            GatewayError::VerifierUnavailable(_) => 500,
            GatewayError::CapacityExceeded => 507,
            GatewayError::Presence(_) | GatewayError::Mailbox(_) | GatewayError::Bus(_) => 500,
            GatewayError::Config(_) => 500,
        }
    }

    /// Advisory errors during steady state do not need to tear the
    /// connection down; admission errors always do.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::Presence(_) | GatewayError::Mailbox(_) | GatewayError::Bus(_)
        )
    }

    fn error_code(&self) -> &'static str {
        match self {
            GatewayError::MissingHeader(_) => "MISSING_HEADER",
            GatewayError::UnsupportedVersion => "UNSUPPORTED_VERSION",
            GatewayError::InvalidToken => "INVALID_TOKEN",
            GatewayError::VerifierUnavailable(_) => "VERIFIER_UNAVAILABLE",
            GatewayError::CapacityExceeded => "CAPACITY_EXCEEDED",
            GatewayError::Presence(_) => "PRESENCE_ERROR",
            GatewayError::Mailbox(_) => "MAILBOX_ERROR",
            GatewayError::Bus(_) => "BUS_ERROR",
            GatewayError::Config(_) => "CONFIG_ERROR",
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            GatewayError::MissingHeader(_) | GatewayError::UnsupportedVersion => {
                "ValidationError"
            }
            GatewayError::InvalidToken => "UnauthorizedError",
            GatewayError::CapacityExceeded => "CapacityError",
            _ => "InternalError",
        }
    }

    fn to_response(&self) -> ErrorResponse {
        ErrorResponse {
            error: self.error_type().to_string(),
            message: self.to_string(),
            status: self.status_code(),
            error_type: self.error_type().to_string(),
            code: self.error_code().to_string(),
            details: None,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

impl ResponseError for GatewayError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(self.to_response())
    }
}

impl From<presence_store::PresenceError> for GatewayError {
    fn from(err: presence_store::PresenceError) -> Self {
        GatewayError::Presence(err.to_string())
    }
}

impl From<mailbox_store::MailboxError> for GatewayError {
    fn from(err: mailbox_store::MailboxError) -> Self {
        GatewayError::Mailbox(err.to_string())
    }
}

impl From<bus::BusError> for GatewayError {
    fn from(err: bus::BusError) -> Self {
        GatewayError::Bus(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_match_documented_exit_codes() {
        assert_eq!(GatewayError::MissingHeader("x-uid").status_code(), 400);
        assert_eq!(GatewayError::UnsupportedVersion.status_code(), 400);
        assert_eq!(GatewayError::InvalidToken.status_code(), 401);
        assert_eq!(
            GatewayError::VerifierUnavailable("down".into()).status_code(),
            500
        );
        assert_eq!(GatewayError::CapacityExceeded.status_code(), 507);
    }

    #[test]
    fn infrastructure_errors_are_retryable_admission_errors_are_not() {
        assert!(GatewayError::Presence("timeout".into()).is_retryable());
        assert!(!GatewayError::InvalidToken.is_retryable());
        assert!(!GatewayError::CapacityExceeded.is_retryable());
    }
}
