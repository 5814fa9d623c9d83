//! crates/listings_core/src/error.rs
//!
//! The outcome kinds the core reports to its callers. Each kind maps to one
//! stable HTTP status in the api service.

use crate::ports::PortError;

#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// A referenced home, flat or user does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Missing, expired or unknown session, or wrong credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Valid session with insufficient privilege or wrong ownership.
    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    Conflict(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Backend unavailable, serialization or transaction failure.
    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl From<PortError> for ServiceError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::NotFound(what) => ServiceError::NotFound(what),
            PortError::Conflict(what) => ServiceError::Conflict(what),
            PortError::Unavailable(msg) | PortError::Unexpected(msg) => {
                ServiceError::Internal(msg)
            }
        }
    }
}
