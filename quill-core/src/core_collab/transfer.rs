//! Atomic ownership transfer

use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::core_access::{CollabError, CollabResult, DocumentId, Role, UserId};
use crate::core_store::{run_in_transaction, AccessStore, RetryPolicy, StoreTx, TxUnit};

/// Swaps a document's owner with one of its collaborators.
///
/// The owner pointer, the old owner's role (to Editor) and the new owner's
/// role (to Creator) change in one transaction. Preconditions are checked up
/// front and again inside every attempt, so a caller that lost a race fails
/// with `Unauthorized` instead of applying a stale swap.
pub struct OwnershipTransferWorkflow {
    store: Arc<dyn AccessStore>,
    policy: RetryPolicy,
}

impl OwnershipTransferWorkflow {
    pub fn new(store: Arc<dyn AccessStore>, policy: RetryPolicy) -> Self {
        Self { store, policy }
    }

    #[instrument(skip_all, fields(document = %document_id, requester = %requester, recipient = %recipient))]
    pub async fn transfer(
        &self,
        document_id: &DocumentId,
        requester: &UserId,
        recipient: &UserId,
    ) -> CollabResult<()> {
        let document = self
            .store
            .get_document(document_id)
            .await?
            .ok_or_else(|| CollabError::NotFound(format!("document {}", document_id)))?;

        if &document.owner_id != requester {
            return Err(CollabError::Unauthorized(
                "only the document owner can transfer ownership".to_string(),
            ));
        }
        if requester == recipient {
            return Err(CollabError::InvalidRequest("already owner".to_string()));
        }
        if self.store.find_access(document_id, recipient).await?.is_none() {
            return Err(CollabError::NotFound("recipient is not a collaborator".to_string()));
        }

        let (document_id, requester, recipient) = (*document_id, *requester, *recipient);
        let swap: Arc<TxUnit> = Arc::new(move |tx: &mut dyn StoreTx| -> CollabResult<()> {
            let document = tx
                .get_document(&document_id)?
                .ok_or_else(|| CollabError::NotFound(format!("document {}", document_id)))?;
            if document.owner_id != requester {
                return Err(CollabError::Unauthorized(
                    "only the document owner can transfer ownership".to_string(),
                ));
            }

            let owner_access = tx.find_access(&document_id, &requester)?.ok_or_else(|| {
                CollabError::InvalidState("owner has no access row".to_string())
            })?;
            let recipient_access = tx.find_access(&document_id, &recipient)?.ok_or_else(|| {
                CollabError::NotFound("recipient is not a collaborator".to_string())
            })?;

            // Demote before promoting: at most one Creator row at any point
            tx.set_document_owner(&document_id, &recipient)?;
            tx.set_access_role(&owner_access.id, Role::Editor)?;
            tx.set_access_role(&recipient_access.id, Role::Creator)?;
            Ok(())
        });

        match run_in_transaction(self.store.as_ref(), &self.policy, swap).await {
            Ok(()) => {
                info!("Ownership transferred");
                Ok(())
            }
            Err(CollabError::Conflict(msg)) => {
                warn!(error = %msg, "Ownership transfer gave up");
                Err(CollabError::TransferFailed(msg))
            }
            Err(e) => Err(e),
        }
    }
}
