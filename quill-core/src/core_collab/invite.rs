//! Email invitations
//!
//! ```text
//! Pending --accept--> Accepted
//!    |
//!    +---decline--> Declined
//! ```
//!
//! Both targets are terminal. A fresh invite for the same (document, email)
//! supersedes a Pending one; an Accepted one turns further invites into
//! no-ops.

use rand::RngCore;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

use crate::core_access::{
    normalize_email, CollabError, CollabResult, DocumentAccess, DocumentId, Invite,
    InviteStatus, Role, RoleAuthorizer, User, UserId,
};
use crate::core_store::{AccessStore, StoreError};
use crate::ports::{CredentialIssuer, CredentialPair, Mailer};

const TOKEN_BYTES: usize = 16;

/// Generate a single-use invite token: 16 CSPRNG bytes, hex encoded
pub fn generate_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Result of issuing an invite
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InviteOutcome {
    /// A new Pending invite was stored and the notification sent
    Sent(Invite),
    /// The pair already has an Accepted invite; nothing changed
    AlreadyAccepted(Invite),
}

/// Where the client should go after accepting
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum NextStep {
    /// Existing account: signed in, open the document
    SignIn { redirect_to: String },
    /// Stub account: finish the profile first
    CompleteRegistration {
        user_id: UserId,
        document_id: DocumentId,
    },
}

/// Result of accepting an invite
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptOutcome {
    pub invite: Invite,
    pub user: User,
    pub credentials: CredentialPair,
    pub next: NextStep,
    /// The token had been accepted before; nothing was written
    pub already_accepted: bool,
}

/// Invite state machine over the access store
pub struct InviteLifecycle {
    store: Arc<dyn AccessStore>,
    mailer: Arc<dyn Mailer>,
    issuer: Arc<dyn CredentialIssuer>,
    frontend_url: String,
}

impl InviteLifecycle {
    pub fn new(
        store: Arc<dyn AccessStore>,
        mailer: Arc<dyn Mailer>,
        issuer: Arc<dyn CredentialIssuer>,
        frontend_url: impl Into<String>,
    ) -> Self {
        let frontend_url = frontend_url.into().trim_end_matches('/').to_string();
        Self {
            store,
            mailer,
            issuer,
            frontend_url,
        }
    }

    /// Invite `email` to `document_id` with `role`
    #[instrument(skip_all, fields(document = %document_id, inviter = %inviter_id, role = %role))]
    pub async fn invite(
        &self,
        document_id: &DocumentId,
        inviter_id: &UserId,
        email: &str,
        role: Role,
    ) -> CollabResult<InviteOutcome> {
        if !RoleAuthorizer::is_valid_assignable_role(role) {
            return Err(CollabError::InvalidRequest(format!(
                "role {} cannot be granted by invite",
                role
            )));
        }

        let email = normalize_email(email);
        if email.is_empty() || !email.contains('@') {
            return Err(CollabError::InvalidRequest("invalid email".to_string()));
        }

        let document = self
            .store
            .get_document(document_id)
            .await?
            .ok_or_else(|| CollabError::NotFound("document not found".to_string()))?;

        let inviter_role = self
            .store
            .find_access(document_id, inviter_id)
            .await?
            .map(|a| a.role);
        if !RoleAuthorizer::can_edit(inviter_role) {
            return Err(CollabError::Forbidden(
                "only editors can invite collaborators".to_string(),
            ));
        }

        if let Some(previous) = self.store.find_invite(document_id, &email).await? {
            match previous.status {
                InviteStatus::Accepted => {
                    debug!("Invite already accepted");
                    return Ok(InviteOutcome::AlreadyAccepted(previous));
                }
                InviteStatus::Pending => {
                    debug!(invite = %previous.id, "Superseding pending invite");
                    match self.store.delete_invite(&previous.id).await {
                        // A concurrent call superseded it first
                        Ok(()) | Err(StoreError::NotFound(_)) => {}
                        Err(e) => return Err(e.into()),
                    }
                }
                InviteStatus::Declined => {}
            }
        }

        let collaborator_id = self.store.find_user_by_email(&email).await?.map(|u| u.id);
        let invite = Invite::new(
            *document_id,
            *inviter_id,
            &email,
            collaborator_id,
            role,
            generate_token(),
        );
        self.store.create_invite(&invite).await?;

        let link = format!("{}/invite/{}", self.frontend_url, invite.token);
        let data = json!({
            "inviteLink": link,
            "documentTitle": document.title,
            "role": role,
            "fullName": email,
        });

        // The invite row stays even if delivery fails; resending reuses the flow
        if let Err(e) = self.mailer.send(&email, "invite", "Invite Mail", &data).await {
            warn!(error = %e, invite = %invite.id, "Invite notification failed");
            return Err(CollabError::Internal(format!("invite notification failed: {}", e)));
        }

        info!(invite = %invite.id, "Invite sent");
        Ok(InviteOutcome::Sent(invite))
    }

    /// Accept the invite behind `token`; doubles as sign-in
    #[instrument(skip_all)]
    pub async fn accept(&self, token: &str) -> CollabResult<AcceptOutcome> {
        let mut invite = self.find_by_token(token).await?;

        match invite.status {
            InviteStatus::Declined => {
                return Err(CollabError::InvalidState("invite was declined".to_string()))
            }
            InviteStatus::Accepted => return self.replay_acceptance(invite).await,
            InviteStatus::Pending => {}
        }

        let (user, provisioned) = self.resolve_or_provision(&invite).await?;

        let document = self
            .store
            .get_document(&invite.document_id)
            .await?
            .ok_or_else(|| CollabError::NotFound("document not found".to_string()))?;

        if self.store.find_access(&document.id, &user.id).await?.is_none() {
            let access = DocumentAccess::new(document.id, user.id, invite.role);
            match self.store.create_access(&access).await {
                // Lost a race with a concurrent grant for the same pair
                Ok(()) | Err(StoreError::Conflict(_)) => {}
                Err(e) => return Err(e.into()),
            }
        }

        invite.status = InviteStatus::Accepted;
        invite.collaborator_id = Some(user.id);
        self.store.update_invite(&invite).await?;

        let credentials = self.issuer.issue(&user.email).await?;

        if provisioned {
            let link = format!(
                "{}/complete-registration/{}?documentId={}",
                self.frontend_url, user.id, document.id
            );
            let data = json!({
                "accountSetupLink": link,
                "documentTitle": document.title,
                "role": invite.role,
            });
            if let Err(e) = self.mailer.send(&user.email, "welcome", "Welcome Mail", &data).await {
                warn!(error = %e, user = %user.id, "Welcome notification failed");
            }
        }

        info!(invite = %invite.id, user = %user.id, provisioned, "Invite accepted");

        let next = Self::next_step(&user, &invite, provisioned);
        Ok(AcceptOutcome {
            invite,
            user,
            credentials,
            next,
            already_accepted: false,
        })
    }

    /// Decline the invite behind `token`
    #[instrument(skip_all)]
    pub async fn decline(&self, token: &str) -> CollabResult<Invite> {
        let mut invite = self.find_by_token(token).await?;

        match invite.status {
            InviteStatus::Declined => Ok(invite),
            InviteStatus::Accepted => Err(CollabError::InvalidState(
                "invite was already accepted".to_string(),
            )),
            InviteStatus::Pending => {
                invite.status = InviteStatus::Declined;
                self.store.update_invite(&invite).await?;
                info!(invite = %invite.id, "Invite declined");
                Ok(invite)
            }
        }
    }

    async fn find_by_token(&self, token: &str) -> CollabResult<Invite> {
        let token = token.trim();
        if token.is_empty() {
            return Err(CollabError::NotFound("invite not found".to_string()));
        }
        self.store
            .find_invite_by_token(token)
            .await?
            .ok_or_else(|| CollabError::NotFound("invite not found".to_string()))
    }

    /// Second acceptance of the same token: sign in again, write nothing
    async fn replay_acceptance(&self, invite: Invite) -> CollabResult<AcceptOutcome> {
        let user = match invite.collaborator_id {
            Some(id) => self.store.get_user(&id).await?,
            None => self.store.find_user_by_email(&invite.email).await?,
        }
        .ok_or_else(|| CollabError::NotFound("invited user not found".to_string()))?;

        let credentials = self.issuer.issue(&user.email).await?;
        let next = Self::next_step(&user, &invite, false);

        debug!(invite = %invite.id, "Invite accepted again");
        Ok(AcceptOutcome {
            invite,
            user,
            credentials,
            next,
            already_accepted: true,
        })
    }

    /// The invited user, creating a stub account if the email is unknown
    async fn resolve_or_provision(&self, invite: &Invite) -> CollabResult<(User, bool)> {
        if let Some(id) = invite.collaborator_id {
            if let Some(user) = self.store.get_user(&id).await? {
                return Ok((user, false));
            }
        }
        if let Some(user) = self.store.find_user_by_email(&invite.email).await? {
            return Ok((user, false));
        }

        let stub = User::stub(&invite.email);
        match self.store.create_user(&stub).await {
            Ok(()) => {
                info!(user = %stub.id, "Provisioned user from invite");
                Ok((stub, true))
            }
            Err(StoreError::Conflict(_)) => {
                // Registered concurrently
                let user = self
                    .store
                    .find_user_by_email(&invite.email)
                    .await?
                    .ok_or_else(|| CollabError::Internal("user vanished".to_string()))?;
                Ok((user, false))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn next_step(user: &User, invite: &Invite, provisioned: bool) -> NextStep {
        if provisioned || !user.is_profile_complete() {
            NextStep::CompleteRegistration {
                user_id: user.id,
                document_id: invite.document_id,
            }
        } else {
            NextStep::SignIn {
                redirect_to: format!("/get-document/{}", invite.document_id),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_shape() {
        let token = generate_token();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(token, generate_token());
    }

    #[test]
    fn test_next_step_serialization() {
        let step = NextStep::SignIn {
            redirect_to: "/get-document/abc".to_string(),
        };
        let value = serde_json::to_value(&step).unwrap();
        assert_eq!(value["step"], "signIn");
        assert_eq!(value["redirectTo"], "/get-document/abc");
    }
}
