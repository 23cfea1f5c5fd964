//! Server state shared across requests

use std::sync::Arc;

use quill_core::config::Config;
use quill_core::core_collab::{
    CollaborationGateway, DocumentService, InviteLifecycle, OwnershipTransferWorkflow,
};
use quill_core::core_store::{AccessStore, RetryPolicy, SqlAccessStore, StoreResult};
use quill_core::ports::{CredentialIssuer, IdentityVerifier, LogMailer, Mailer, SignedTokenService};
use quill_core::shutdown::ShutdownCoordinator;

/// Services wired over one access store
pub struct AppState {
    pub store: Arc<dyn AccessStore>,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub issuer: Arc<dyn CredentialIssuer>,
    pub documents: DocumentService,
    pub invites: InviteLifecycle,
    pub transfers: OwnershipTransferWorkflow,
    pub gateway: CollaborationGateway,
    pub shutdown: Arc<ShutdownCoordinator>,
}

/// Collaborators the state is assembled from
pub struct StateParts {
    pub store: Arc<dyn AccessStore>,
    pub verifier: Arc<dyn IdentityVerifier>,
    pub issuer: Arc<dyn CredentialIssuer>,
    pub mailer: Arc<dyn Mailer>,
    pub shutdown: Arc<ShutdownCoordinator>,
}

impl AppState {
    pub fn new(parts: StateParts, config: &Config) -> Self {
        let StateParts {
            store,
            verifier,
            issuer,
            mailer,
            shutdown,
        } = parts;

        Self {
            documents: DocumentService::new(store.clone()),
            invites: InviteLifecycle::new(
                store.clone(),
                mailer,
                issuer.clone(),
                config.invite.frontend_url.clone(),
            ),
            transfers: OwnershipTransferWorkflow::new(
                store.clone(),
                RetryPolicy::from(&config.transfer),
            ),
            gateway: CollaborationGateway::new(store.clone(), verifier.clone()),
            store,
            verifier,
            issuer,
            shutdown,
        }
    }

    /// SQLite store, signed tokens and the logging mailer
    pub fn from_config(config: &Config, shutdown: Arc<ShutdownCoordinator>) -> StoreResult<Self> {
        let store = Arc::new(SqlAccessStore::open(&config.store)?);
        let tokens = Arc::new(SignedTokenService::from_config(&config.auth));

        Ok(Self::new(
            StateParts {
                store,
                verifier: tokens.clone(),
                issuer: tokens,
                mailer: Arc::new(LogMailer::new()),
                shutdown,
            },
            config,
        ))
    }
}
