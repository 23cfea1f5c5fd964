//! In-memory access store
//!
//! Mirrors the constraints of the SQL schema. Transactions run against a
//! staged copy of the tables which replaces the live copy only on commit.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::errors::{StoreError, StoreResult};
use super::{AccessStore, StoreTx, TxUnit};
use crate::core_access::{
    normalize_email, AccessId, CollabError, CollabResult, Document, DocumentAccess, DocumentId,
    DocumentMedia, DocumentState, Invite, InviteId, InviteStatus, MediaId, Role, Timestamp, User,
    UserId,
};

#[derive(Debug, Clone, Default)]
struct Tables {
    users: HashMap<UserId, User>,
    documents: HashMap<DocumentId, Document>,
    access: HashMap<AccessId, DocumentAccess>,
    invites: HashMap<InviteId, Invite>,
    media: HashMap<MediaId, DocumentMedia>,
}

impl Tables {
    fn find_access(&self, document: &DocumentId, collaborator: &UserId) -> Option<&DocumentAccess> {
        self.access
            .values()
            .find(|a| &a.document_id == document && &a.collaborator_id == collaborator)
    }

    fn has_other_creator(&self, document: &DocumentId, except: &AccessId) -> bool {
        self.access
            .values()
            .any(|a| &a.document_id == document && a.role == Role::Creator && &a.id != except)
    }

    fn set_access_role(&mut self, id: &AccessId, role: Role) -> StoreResult<DocumentAccess> {
        let document_id = self
            .access
            .get(id)
            .map(|a| a.document_id)
            .ok_or_else(|| StoreError::NotFound(format!("document access {}", id)))?;

        if role == Role::Creator && self.has_other_creator(&document_id, id) {
            return Err(StoreError::Conflict(format!(
                "document {} already has a creator",
                document_id
            )));
        }

        let access = self
            .access
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("document access {}", id)))?;
        access.role = role;
        access.updated_at = Timestamp::now();
        Ok(access.clone())
    }

    fn insert_access(&mut self, access: &DocumentAccess) -> StoreResult<()> {
        if self.find_access(&access.document_id, &access.collaborator_id).is_some() {
            return Err(StoreError::Conflict(format!(
                "user {} already has access to document {}",
                access.collaborator_id, access.document_id
            )));
        }
        if access.role == Role::Creator && self.has_other_creator(&access.document_id, &access.id) {
            return Err(StoreError::Conflict(format!(
                "document {} already has a creator",
                access.document_id
            )));
        }
        self.access.insert(access.id, access.clone());
        Ok(())
    }
}

/// Access store kept entirely in memory (for tests and ephemeral servers)
pub struct MemoryAccessStore {
    tables: Arc<RwLock<Tables>>,
    /// Number of upcoming transactions that will fail at commit with a conflict
    failing_commits: AtomicU32,
}

impl MemoryAccessStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self {
            tables: Arc::new(RwLock::new(Tables::default())),
            failing_commits: AtomicU32::new(0),
        }
    }

    /// Make the next `n` transactions abort at commit with a serialization conflict
    pub fn fail_next_transactions(&self, n: u32) {
        self.failing_commits.store(n, Ordering::SeqCst);
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl Default for MemoryAccessStore {
    fn default() -> Self {
        Self::new()
    }
}

struct MemoryTx<'a> {
    tables: &'a mut Tables,
}

impl StoreTx for MemoryTx<'_> {
    fn get_document(&mut self, id: &DocumentId) -> CollabResult<Option<Document>> {
        Ok(self.tables.documents.get(id).cloned())
    }

    fn find_access(
        &mut self,
        document: &DocumentId,
        collaborator: &UserId,
    ) -> CollabResult<Option<DocumentAccess>> {
        Ok(self.tables.find_access(document, collaborator).cloned())
    }

    fn set_document_owner(&mut self, id: &DocumentId, owner: &UserId) -> CollabResult<()> {
        let document = self
            .tables
            .documents
            .get_mut(id)
            .ok_or_else(|| CollabError::NotFound(format!("document {}", id)))?;
        document.owner_id = *owner;
        document.updated_at = Timestamp::now();
        Ok(())
    }

    fn set_access_role(&mut self, id: &AccessId, role: Role) -> CollabResult<()> {
        self.tables.set_access_role(id, role)?;
        Ok(())
    }
}

#[async_trait]
impl AccessStore for MemoryAccessStore {
    async fn create_user(&self, user: &User) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let email = normalize_email(&user.email);
        if tables.users.values().any(|u| u.email == email) {
            return Err(StoreError::Conflict(format!("email {} already registered", email)));
        }
        let mut user = user.clone();
        user.email = email;
        tables.users.insert(user.id, user);
        Ok(())
    }

    async fn get_user(&self, id: &UserId) -> StoreResult<Option<User>> {
        Ok(self.tables.read().await.users.get(id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> StoreResult<Option<User>> {
        let email = normalize_email(email);
        let tables = self.tables.read().await;
        Ok(tables.users.values().find(|u| u.email == email).cloned())
    }

    async fn create_document(
        &self,
        document: &Document,
        creator: &DocumentAccess,
    ) -> StoreResult<()> {
        if creator.role != Role::Creator
            || creator.document_id != document.id
            || creator.collaborator_id != document.owner_id
        {
            return Err(StoreError::Conflict(
                "creator row must belong to the document owner".to_string(),
            ));
        }

        let mut tables = self.tables.write().await;
        if tables.documents.contains_key(&document.id) {
            return Err(StoreError::Conflict(format!("document {} exists", document.id)));
        }
        tables.documents.insert(document.id, document.clone());
        if let Err(e) = tables.insert_access(creator) {
            tables.documents.remove(&document.id);
            return Err(e);
        }
        Ok(())
    }

    async fn get_document(&self, id: &DocumentId) -> StoreResult<Option<Document>> {
        Ok(self.tables.read().await.documents.get(id).cloned())
    }

    async fn list_owned_documents(&self, owner: &UserId) -> StoreResult<Vec<Document>> {
        let tables = self.tables.read().await;
        let mut documents: Vec<Document> = tables
            .documents
            .values()
            .filter(|d| &d.owner_id == owner)
            .cloned()
            .collect();
        documents.sort_by_key(|d| d.created_at);
        Ok(documents)
    }

    async fn update_document_state(
        &self,
        id: &DocumentId,
        state: &DocumentState,
    ) -> StoreResult<Document> {
        let mut tables = self.tables.write().await;
        let document = tables
            .documents
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("document {}", id)))?;
        document.title = state.title.clone();
        document.content = state.content.clone();
        document.updated_at = Timestamp::now();
        Ok(document.clone())
    }

    async fn set_document_visibility(
        &self,
        id: &DocumentId,
        is_public: bool,
    ) -> StoreResult<Document> {
        let mut tables = self.tables.write().await;
        let document = tables
            .documents
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(format!("document {}", id)))?;
        document.is_public = is_public;
        document.updated_at = Timestamp::now();
        Ok(document.clone())
    }

    async fn delete_document(&self, id: &DocumentId) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.documents.remove(id).is_none() {
            return Err(StoreError::NotFound(format!("document {}", id)));
        }
        tables.access.retain(|_, a| &a.document_id != id);
        tables.invites.retain(|_, i| &i.document_id != id);
        Ok(())
    }

    async fn create_access(&self, access: &DocumentAccess) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if !tables.documents.contains_key(&access.document_id) {
            return Err(StoreError::NotFound(format!("document {}", access.document_id)));
        }
        tables.insert_access(access)
    }

    async fn get_access(&self, id: &AccessId) -> StoreResult<Option<DocumentAccess>> {
        Ok(self.tables.read().await.access.get(id).cloned())
    }

    async fn find_access(
        &self,
        document: &DocumentId,
        collaborator: &UserId,
    ) -> StoreResult<Option<DocumentAccess>> {
        Ok(self.tables.read().await.find_access(document, collaborator).cloned())
    }

    async fn list_document_access(
        &self,
        document: &DocumentId,
    ) -> StoreResult<Vec<DocumentAccess>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<DocumentAccess> = tables
            .access
            .values()
            .filter(|a| &a.document_id == document)
            .cloned()
            .collect();
        rows.sort_by_key(|a| a.created_at);
        Ok(rows)
    }

    async fn list_user_access(&self, user: &UserId) -> StoreResult<Vec<DocumentAccess>> {
        let tables = self.tables.read().await;
        let mut rows: Vec<DocumentAccess> = tables
            .access
            .values()
            .filter(|a| &a.collaborator_id == user)
            .cloned()
            .collect();
        rows.sort_by_key(|a| a.created_at);
        Ok(rows)
    }

    async fn update_access_role(&self, id: &AccessId, role: Role) -> StoreResult<DocumentAccess> {
        self.tables.write().await.set_access_role(id, role)
    }

    async fn delete_access(&self, id: &AccessId) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .access
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("document access {}", id)))
    }

    async fn create_invite(&self, invite: &Invite) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        if tables.invites.values().any(|i| i.token == invite.token) {
            return Err(StoreError::Conflict("invite token already in use".to_string()));
        }
        if invite.status == InviteStatus::Pending
            && tables.invites.values().any(|i| {
                i.document_id == invite.document_id
                    && i.email == invite.email
                    && i.status == InviteStatus::Pending
            })
        {
            return Err(StoreError::Conflict(format!(
                "a pending invite for {} already exists",
                invite.email
            )));
        }
        tables.invites.insert(invite.id, invite.clone());
        Ok(())
    }

    async fn find_invite_by_token(&self, token: &str) -> StoreResult<Option<Invite>> {
        let tables = self.tables.read().await;
        Ok(tables.invites.values().find(|i| i.token == token).cloned())
    }

    async fn find_invite(
        &self,
        document: &DocumentId,
        email: &str,
    ) -> StoreResult<Option<Invite>> {
        let email = normalize_email(email);
        let tables = self.tables.read().await;
        Ok(tables
            .invites
            .values()
            .filter(|i| &i.document_id == document && i.email == email)
            // A pending invite wins a same-millisecond tie
            .max_by_key(|i| (i.created_at, i.status == InviteStatus::Pending))
            .cloned())
    }

    async fn update_invite(&self, invite: &Invite) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .invites
            .get_mut(&invite.id)
            .ok_or_else(|| StoreError::NotFound(format!("invite {}", invite.id)))?;
        stored.status = invite.status;
        stored.collaborator_id = invite.collaborator_id;
        stored.updated_at = Timestamp::now();
        Ok(())
    }

    async fn delete_invite(&self, id: &InviteId) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .invites
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("invite {}", id)))
    }

    async fn create_media(&self, media: &DocumentMedia) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables.media.insert(media.id, media.clone());
        Ok(())
    }

    async fn list_media_created_before(
        &self,
        cutoff: Timestamp,
    ) -> StoreResult<Vec<DocumentMedia>> {
        let tables = self.tables.read().await;
        let mut expired: Vec<DocumentMedia> = tables
            .media
            .values()
            .filter(|m| m.created_at < cutoff)
            .cloned()
            .collect();
        expired.sort_by_key(|m| m.created_at);
        Ok(expired)
    }

    async fn delete_media(&self, id: &MediaId) -> StoreResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .media
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(format!("media {}", id)))
    }

    async fn execute_transaction(&self, unit: Arc<TxUnit>) -> CollabResult<()> {
        let mut tables = self.tables.write().await;
        let mut staged = tables.clone();

        unit(&mut MemoryTx {
            tables: &mut staged,
        })?;

        if self.take_injected_failure() {
            return Err(CollabError::Conflict(
                "could not serialize access due to concurrent update".to_string(),
            ));
        }

        *tables = staged;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn seeded() -> (MemoryAccessStore, Document, DocumentAccess) {
        let store = MemoryAccessStore::new();
        let owner = User::stub("owner@example.com");
        store.create_user(&owner).await.unwrap();
        let document = Document::new(
            owner.id,
            DocumentState {
                title: "Plan".to_string(),
                content: None,
            },
            false,
        );
        let creator = DocumentAccess::new(document.id, owner.id, Role::Creator);
        store.create_document(&document, &creator).await.unwrap();
        (store, document, creator)
    }

    #[tokio::test]
    async fn test_second_creator_is_rejected() {
        let (store, document, _) = seeded().await;
        let other = DocumentAccess::new(document.id, UserId::generate(), Role::Creator);
        let result = store.create_access(&other).await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_duplicate_pair_is_rejected() {
        let (store, document, _) = seeded().await;
        let user = UserId::generate();
        store
            .create_access(&DocumentAccess::new(document.id, user, Role::Viewer))
            .await
            .unwrap();
        let result = store
            .create_access(&DocumentAccess::new(document.id, user, Role::Editor))
            .await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_injected_failure_discards_staged_writes() {
        let (store, document, creator) = seeded().await;
        store.fail_next_transactions(1);

        let new_owner = UserId::generate();
        let (document_id, creator_id) = (document.id, creator.id);
        let result = store
            .execute_transaction(Arc::new(move |tx: &mut dyn StoreTx| -> CollabResult<()> {
                tx.set_document_owner(&document_id, &new_owner)?;
                tx.set_access_role(&creator_id, Role::Editor)
            }))
            .await;
        assert!(matches!(result, Err(CollabError::Conflict(_))));

        let stored = store.get_document(&document.id).await.unwrap().unwrap();
        assert_eq!(stored.owner_id, document.owner_id);
        let access = store.get_access(&creator.id).await.unwrap().unwrap();
        assert_eq!(access.role, Role::Creator);
    }

    #[tokio::test]
    async fn test_delete_document_keeps_media_for_cleanup() {
        let (store, document, creator) = seeded().await;
        store
            .create_media(&DocumentMedia::new(
                document.id,
                crate::core_access::MediaLocator {
                    public_id: "exports/plan".to_string(),
                    secure_url: "https://cdn.example.com/exports/plan.pdf".to_string(),
                },
                "pdf",
            ))
            .await
            .unwrap();

        store.delete_document(&document.id).await.unwrap();

        assert!(store.get_access(&creator.id).await.unwrap().is_none());
        let expired = store
            .list_media_created_before(Timestamp::from_millis(u64::MAX))
            .await
            .unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].locator.public_id, "exports/plan");
    }

    #[tokio::test]
    async fn test_pending_invite_wins_timestamp_tie() {
        let (store, document, creator) = seeded().await;

        let mut declined = Invite::new(
            document.id,
            creator.collaborator_id,
            "x@y.com",
            None,
            Role::Viewer,
            "old".to_string(),
        );
        declined.status = InviteStatus::Declined;
        let mut pending = Invite::new(
            document.id,
            creator.collaborator_id,
            "x@y.com",
            None,
            Role::Editor,
            "new".to_string(),
        );
        pending.created_at = declined.created_at;
        store.create_invite(&pending).await.unwrap();
        store.create_invite(&declined).await.unwrap();

        let latest = store.find_invite(&document.id, "x@y.com").await.unwrap().unwrap();
        assert_eq!(latest.token, "new");
    }
}
