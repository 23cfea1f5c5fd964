//! Access store: persistence for documents, collaborators, invites and media
//!
//! The store is the single shared mutable resource of the system. Every
//! mutation is a single-row write except the ownership transfer, which runs
//! through [`AccessStore::execute_transaction`] and [`run_in_transaction`].

pub mod errors;
pub mod memory_store;
pub mod migrations;
pub mod sql_store;
pub mod transaction;

pub use errors::{StoreError, StoreResult};
pub use memory_store::MemoryAccessStore;
pub use migrations::{migrate, CURRENT_SCHEMA_VERSION};
pub use sql_store::SqlAccessStore;
pub use transaction::{run_in_transaction, RetryPolicy};

use crate::core_access::{
    AccessId, CollabResult, Document, DocumentAccess, DocumentId, DocumentMedia, DocumentState,
    Invite, InviteId, MediaId, Role, Timestamp, User, UserId,
};
use async_trait::async_trait;
use std::sync::Arc;

/// Transactional handle passed to a unit of work
///
/// Reads observe the transaction's own writes. Nothing is visible to other
/// store users until the whole unit commits.
pub trait StoreTx {
    fn get_document(&mut self, id: &DocumentId) -> CollabResult<Option<Document>>;

    fn find_access(
        &mut self,
        document: &DocumentId,
        collaborator: &UserId,
    ) -> CollabResult<Option<DocumentAccess>>;

    fn set_document_owner(&mut self, id: &DocumentId, owner: &UserId) -> CollabResult<()>;

    fn set_access_role(&mut self, id: &AccessId, role: Role) -> CollabResult<()>;
}

/// A unit of work run inside one transaction attempt
///
/// Shared so each retry and each blocking worker can run the same unit.
pub type TxUnit = dyn Fn(&mut dyn StoreTx) -> CollabResult<()> + Send + Sync;

/// CRUD-by-id storage for the collaboration records
///
/// Implementations must ensure:
/// - `create_document` writes the document and its Creator row atomically
/// - at most one access row per (document, collaborator) pair
/// - at most one Creator row per document
/// - invite tokens are unique
#[async_trait]
pub trait AccessStore: Send + Sync {
    // ===== Users =====

    /// Fails with `Conflict` if the email is taken
    async fn create_user(&self, user: &User) -> StoreResult<()>;

    async fn get_user(&self, id: &UserId) -> StoreResult<Option<User>>;

    /// Lookup is by normalized email
    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>>;

    // ===== Documents =====

    async fn create_document(&self, document: &Document, creator: &DocumentAccess)
        -> StoreResult<()>;

    async fn get_document(&self, id: &DocumentId) -> StoreResult<Option<Document>>;

    async fn list_owned_documents(&self, owner: &UserId) -> StoreResult<Vec<Document>>;

    /// Full overwrite of title and content
    async fn update_document_state(
        &self,
        id: &DocumentId,
        state: &DocumentState,
    ) -> StoreResult<Document>;

    async fn set_document_visibility(&self, id: &DocumentId, is_public: bool)
        -> StoreResult<Document>;

    /// Also removes the document's access rows and invites. Media records
    /// stay until cleanup has deleted their objects.
    async fn delete_document(&self, id: &DocumentId) -> StoreResult<()>;

    // ===== Access =====

    async fn create_access(&self, access: &DocumentAccess) -> StoreResult<()>;

    async fn get_access(&self, id: &AccessId) -> StoreResult<Option<DocumentAccess>>;

    async fn find_access(
        &self,
        document: &DocumentId,
        collaborator: &UserId,
    ) -> StoreResult<Option<DocumentAccess>>;

    async fn list_document_access(&self, document: &DocumentId)
        -> StoreResult<Vec<DocumentAccess>>;

    async fn list_user_access(&self, user: &UserId) -> StoreResult<Vec<DocumentAccess>>;

    async fn update_access_role(&self, id: &AccessId, role: Role) -> StoreResult<DocumentAccess>;

    async fn delete_access(&self, id: &AccessId) -> StoreResult<()>;

    // ===== Invites =====

    async fn create_invite(&self, invite: &Invite) -> StoreResult<()>;

    async fn find_invite_by_token(&self, token: &str) -> StoreResult<Option<Invite>>;

    /// Most recent invite for the pair, in any state
    async fn find_invite(&self, document: &DocumentId, email: &str)
        -> StoreResult<Option<Invite>>;

    /// Persists status and resolved collaborator
    async fn update_invite(&self, invite: &Invite) -> StoreResult<()>;

    async fn delete_invite(&self, id: &InviteId) -> StoreResult<()>;

    // ===== Media =====

    async fn create_media(&self, media: &DocumentMedia) -> StoreResult<()>;

    async fn list_media_created_before(&self, cutoff: Timestamp)
        -> StoreResult<Vec<DocumentMedia>>;

    async fn delete_media(&self, id: &MediaId) -> StoreResult<()>;

    // ===== Transactions =====

    /// Run `unit` once under the strongest isolation the backend offers.
    ///
    /// Any error from `unit` aborts the transaction. Serialization failures
    /// of the backend surface as `CollabError::Conflict`.
    async fn execute_transaction(&self, unit: Arc<TxUnit>) -> CollabResult<()>;
}
