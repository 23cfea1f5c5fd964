//! Document creation, reading and direct access management

use std::sync::Arc;
use tracing::{info, instrument};

use crate::core_access::{
    AccessId, CollabError, CollabResult, Document, DocumentAccess, DocumentId, DocumentMedia,
    DocumentState, MediaLocator, Role, RoleAuthorizer, UserId,
};
use crate::core_store::AccessStore;

/// Sharing operations; every decision goes through [`RoleAuthorizer`]
pub struct DocumentService {
    store: Arc<dyn AccessStore>,
}

impl DocumentService {
    pub fn new(store: Arc<dyn AccessStore>) -> Self {
        Self { store }
    }

    async fn require_document(&self, id: &DocumentId) -> CollabResult<Document> {
        self.store
            .get_document(id)
            .await?
            .ok_or_else(|| CollabError::NotFound("document not found".to_string()))
    }

    async fn role_of(&self, document: &DocumentId, user: &UserId) -> CollabResult<Option<Role>> {
        Ok(self.store.find_access(document, user).await?.map(|a| a.role))
    }

    /// Create a document owned by `owner`, together with its Creator row
    #[instrument(skip_all, fields(owner = %owner))]
    pub async fn create_document(
        &self,
        owner: &UserId,
        state: DocumentState,
        is_public: bool,
    ) -> CollabResult<Document> {
        if state.title.trim().is_empty() {
            return Err(CollabError::InvalidRequest("title is required".to_string()));
        }

        let document = Document::new(*owner, state, is_public);
        let creator = DocumentAccess::new(document.id, *owner, Role::Creator);
        self.store.create_document(&document, &creator).await?;

        info!(document = %document.id, "Document created");
        Ok(document)
    }

    pub async fn get_document(
        &self,
        requester: &UserId,
        id: &DocumentId,
    ) -> CollabResult<Document> {
        let document = self.require_document(id).await?;
        let role = self.role_of(id, requester).await?;
        if !RoleAuthorizer::can_read(role, document.is_public) {
            return Err(CollabError::Forbidden("no access to this document".to_string()));
        }
        Ok(document)
    }

    pub async fn list_owned_documents(&self, user: &UserId) -> CollabResult<Vec<Document>> {
        Ok(self.store.list_owned_documents(user).await?)
    }

    /// Every document the user holds an access row on, with their role
    pub async fn list_accessible_documents(
        &self,
        user: &UserId,
    ) -> CollabResult<Vec<(Document, Role)>> {
        let mut documents = Vec::new();
        for access in self.store.list_user_access(user).await? {
            // Deleted between the two reads
            if let Some(document) = self.store.get_document(&access.document_id).await? {
                documents.push((document, access.role));
            }
        }
        Ok(documents)
    }

    pub async fn list_collaborators(
        &self,
        requester: &UserId,
        document: &DocumentId,
    ) -> CollabResult<Vec<DocumentAccess>> {
        self.require_document(document).await?;
        if self.role_of(document, requester).await?.is_none() {
            return Err(CollabError::Forbidden("no access to this document".to_string()));
        }
        Ok(self.store.list_document_access(document).await?)
    }

    /// Change a collaborator's role (Creator only; never to or from Creator)
    #[instrument(skip_all, fields(requester = %requester, access = %access_id))]
    pub async fn modify_access(
        &self,
        requester: &UserId,
        access_id: &AccessId,
        new_role: Role,
    ) -> CollabResult<DocumentAccess> {
        let target = self
            .store
            .get_access(access_id)
            .await?
            .ok_or_else(|| CollabError::NotFound("access not found".to_string()))?;

        let requester_role = self
            .role_of(&target.document_id, requester)
            .await?
            .ok_or_else(|| CollabError::Forbidden("no access to this document".to_string()))?;

        let target_is_self_creator =
            &target.collaborator_id == requester && target.role == Role::Creator;
        RoleAuthorizer::can_modify_role(requester_role, target_is_self_creator, new_role)?;

        if !RoleAuthorizer::is_valid_assignable_role(new_role) {
            return Err(CollabError::InvalidRequest(format!("invalid role: {}", new_role)));
        }

        let updated = self.store.update_access_role(access_id, new_role).await?;
        info!(role = %new_role, "Access role changed");
        Ok(updated)
    }

    /// Remove a collaborator (Creator only; the Creator row is never revocable)
    #[instrument(skip_all, fields(requester = %requester, access = %access_id))]
    pub async fn revoke_access(&self, requester: &UserId, access_id: &AccessId) -> CollabResult<()> {
        let target = self
            .store
            .get_access(access_id)
            .await?
            .ok_or_else(|| CollabError::NotFound("access not found".to_string()))?;

        RoleAuthorizer::can_revoke(target.role)?;

        let requester_role = self.role_of(&target.document_id, requester).await?;
        if requester_role != Some(Role::Creator) {
            return Err(CollabError::Forbidden(
                "only the creator can revoke access".to_string(),
            ));
        }

        self.store.delete_access(access_id).await?;
        info!("Access revoked");
        Ok(())
    }

    /// Flip the public flag (owner only)
    pub async fn toggle_visibility(
        &self,
        requester: &UserId,
        id: &DocumentId,
    ) -> CollabResult<Document> {
        let document = self.require_document(id).await?;
        if &document.owner_id != requester {
            return Err(CollabError::Unauthorized(
                "only the owner can change visibility".to_string(),
            ));
        }
        Ok(self.store.set_document_visibility(id, !document.is_public).await?)
    }

    /// Delete a document with its access rows and invites (owner only).
    ///
    /// Generated media keeps its rows so cleanup still removes the objects.
    #[instrument(skip_all, fields(requester = %requester, document = %id))]
    pub async fn delete_document(&self, requester: &UserId, id: &DocumentId) -> CollabResult<()> {
        let document = self.require_document(id).await?;
        if &document.owner_id != requester {
            return Err(CollabError::Unauthorized(
                "only the owner can delete the document".to_string(),
            ));
        }
        self.store.delete_document(id).await?;
        info!("Document deleted");
        Ok(())
    }

    /// Record an artifact generated from a document so cleanup can expire it.
    ///
    /// Anyone who can read the document may export it.
    #[instrument(skip_all, fields(requester = %requester, document = %document))]
    pub async fn register_media(
        &self,
        requester: &UserId,
        document: &DocumentId,
        locator: MediaLocator,
        format: &str,
    ) -> CollabResult<DocumentMedia> {
        let doc = self.require_document(document).await?;
        let role = self.role_of(document, requester).await?;
        if !RoleAuthorizer::can_read(role, doc.is_public) {
            return Err(CollabError::Forbidden(
                "you do not have access to this document".to_string(),
            ));
        }
        if locator.public_id.trim().is_empty() || locator.secure_url.trim().is_empty() {
            return Err(CollabError::InvalidRequest(
                "media locator needs a public id and a secure url".to_string(),
            ));
        }
        if format.trim().is_empty() {
            return Err(CollabError::InvalidRequest("media format is required".to_string()));
        }

        let media = DocumentMedia::new(*document, locator, format.trim());
        self.store.create_media(&media).await?;
        info!(media = %media.id, public_id = %media.locator.public_id, "Media registered");
        Ok(media)
    }
}
