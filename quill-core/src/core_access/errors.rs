//! Error types for collaboration operations

use thiserror::Error;

use crate::core_store::StoreError;
use crate::ports::PortError;

/// Result type for collaboration operations
pub type CollabResult<T> = Result<T, CollabError>;

/// Errors surfaced by the access, invite, transfer, gateway and cleanup layers
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CollabError {
    /// Malformed input (bad id, invalid role, missing field)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Malformed real-time event payload
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Caller is not authenticated, or is not the owner where ownership is required
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Caller is authenticated but their role does not permit the action
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Missing entity or token
    #[error("Not found: {0}")]
    NotFound(String),

    /// Operation is not allowed from the entity's current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Transient write conflict or uniqueness violation
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Ownership transfer gave up after exhausting its retries
    #[error("Transfer failed: {0}")]
    TransferFailed(String),

    /// A collaborator (store, identity, mail, storage) failed
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CollabError {
    /// HTTP status analogue used by the REST adapters
    pub fn status_code(&self) -> u16 {
        match self {
            CollabError::InvalidRequest(_)
            | CollabError::InvalidPayload(_)
            | CollabError::InvalidState(_) => 400,
            CollabError::Unauthorized(_) => 401,
            CollabError::Forbidden(_) => 403,
            CollabError::NotFound(_) => 404,
            CollabError::Conflict(_) | CollabError::TransferFailed(_) => 409,
            CollabError::Internal(_) => 500,
        }
    }

    /// Whether a transactional unit failing with this error may be retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, CollabError::Conflict(_))
    }

    /// Short message for clients; internal details stay in the logs
    pub fn public_message(&self) -> String {
        match self {
            CollabError::Internal(_) => "Internal server error".to_string(),
            CollabError::InvalidRequest(msg)
            | CollabError::InvalidPayload(msg)
            | CollabError::Unauthorized(msg)
            | CollabError::Forbidden(msg)
            | CollabError::NotFound(msg)
            | CollabError::InvalidState(msg)
            | CollabError::Conflict(msg)
            | CollabError::TransferFailed(msg) => msg.clone(),
        }
    }
}

impl From<StoreError> for CollabError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(msg) => CollabError::NotFound(msg),
            StoreError::Conflict(msg) => CollabError::Conflict(msg),
            other => CollabError::Internal(other.to_string()),
        }
    }
}

impl From<PortError> for CollabError {
    fn from(e: PortError) -> Self {
        match e {
            PortError::InvalidCredential(msg) => CollabError::Unauthorized(msg),
            other => CollabError::Internal(other.to_string()),
        }
    }
}
