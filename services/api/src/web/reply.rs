//! services/api/src/web/reply.rs
//!
//! Maps portal errors onto HTTP status codes for the handlers.

use axum::http::StatusCode;
use tracing::{error, warn};
use warga_core::{PortError, PortalError};

pub type Rejection = (StatusCode, String);

/// Logs `e` and turns it into the `(status, message)` pair handlers return.
///
/// Validation and credential messages are shown to the user verbatim.
pub fn reject(context: &str, e: PortalError) -> Rejection {
    let status = status_for(&e);
    if status.is_server_error() {
        error!("{context}: {e}");
        return (status, format!("{context} failed"));
    }
    warn!("{context}: {e}");
    let message = match e {
        PortalError::Validation(msg) | PortalError::Forbidden(msg) => msg,
        PortalError::Port(PortError::NotFound(what)) | PortalError::Port(PortError::Conflict(what)) => what,
        other => other.to_string(),
    };
    (status, message)
}

pub fn status_for(e: &PortalError) -> StatusCode {
    match e {
        PortalError::Validation(_) => StatusCode::BAD_REQUEST,
        PortalError::InvalidCredentials => StatusCode::UNAUTHORIZED,
        PortalError::Forbidden(_) => StatusCode::FORBIDDEN,
        PortalError::Orphaned { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        PortalError::Port(port) => match port {
            PortError::NotFound(_) => StatusCode::NOT_FOUND,
            PortError::Conflict(_) => StatusCode::CONFLICT,
            PortError::InvalidCredentials | PortError::Unauthorized => StatusCode::UNAUTHORIZED,
            PortError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        },
    }
}

pub fn bad_request(message: impl Into<String>) -> Rejection {
    (StatusCode::BAD_REQUEST, message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_facing_messages_survive() {
        let (status, msg) = reject("Register", PortalError::validation("NIK harus 16 digit angka"));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(msg, "NIK harus 16 digit angka");

        let (status, msg) = reject("Login", PortalError::InvalidCredentials);
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(msg, "Email atau password salah.");
    }

    #[test]
    fn backend_details_are_not_leaked() {
        let (status, msg) = reject(
            "List invoices",
            PortalError::Port(PortError::Unexpected("connection refused".into())),
        );
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(msg, "List invoices failed");
    }
}
