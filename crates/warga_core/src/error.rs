//! crates/warga_core/src/error.rs
//!
//! The error type shared by the portal services.

use crate::ports::PortError;

#[derive(Debug, thiserror::Error)]
pub enum PortalError {
    /// Input rejected before any backend call was made.
    #[error("{0}")]
    Validation(String),

    #[error("Email atau password salah.")]
    InvalidCredentials,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// A two-step write failed halfway and the first step could not be undone.
    #[error("{step} failed and {resource} could not be cleaned up")]
    Orphaned { step: String, resource: String },

    #[error(transparent)]
    Port(#[from] PortError),
}

pub type PortalResult<T> = Result<T, PortalError>;

impl PortalError {
    pub fn validation(message: impl Into<String>) -> Self {
        PortalError::Validation(message.into())
    }
}
