//! Boundaries to the collaborators the core does not own
//!
//! - identity: verifying and issuing bearer credentials
//! - mail: notification delivery
//! - object storage: deleting generated artifacts

pub mod mailer;
pub mod object_store;
pub mod token;

pub use mailer::LogMailer;
pub use object_store::FsObjectStore;
pub use token::{SignedTokenService, TokenKind};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core_access::MediaLocator;

/// Errors returned by external collaborators
#[derive(Debug, Error)]
pub enum PortError {
    /// Credential missing, malformed, expired or forged
    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("Mail delivery failed: {0}")]
    Mail(String),

    #[error("Object storage failed: {0}")]
    Storage(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type PortResult<T> = Result<T, PortError>;

/// Access and refresh credentials handed to a user on sign-in
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialPair {
    pub access_token: String,
    pub refresh_token: String,
}

/// Verifies a bearer credential and returns the email it was issued for
#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(&self, credential: &str) -> PortResult<String>;
}

/// Issues credentials for a user identified by email
#[async_trait]
pub trait CredentialIssuer: Send + Sync {
    async fn issue(&self, email: &str) -> PortResult<CredentialPair>;
}

/// Outbound notification delivery
#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(
        &self,
        to: &str,
        template: &str,
        subject: &str,
        data: &serde_json::Value,
    ) -> PortResult<()>;
}

/// External storage holding generated artifacts
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn delete(&self, locator: &MediaLocator) -> PortResult<()>;
}
