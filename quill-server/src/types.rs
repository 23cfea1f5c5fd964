//! Request/Response types for the HTTP API

use quill_core::core_access::{
    Document, DocumentId, DocumentState, Invite, InviteId, InviteStatus, MediaLocator, Role,
};
use quill_core::core_collab::InviteOutcome;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// ============================================================================
// Document Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateDocumentRequest {
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub is_public: bool,
}

impl CreateDocumentRequest {
    pub fn state(&self) -> DocumentState {
        DocumentState {
            title: self.title.clone(),
            content: self.content.clone(),
        }
    }
}

/// A document together with the caller's role on it
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessibleDocument {
    #[serde(flatten)]
    pub document: Document,
    pub role: Role,
}

/// An artifact rendered outside the server and uploaded to object storage
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterMediaRequest {
    #[serde(flatten)]
    pub locator: MediaLocator,
    #[serde(default = "default_media_format")]
    pub format: String,
}

fn default_media_format() -> String {
    "pdf".to_string()
}

// ============================================================================
// Invite Types
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteRequest {
    pub document_id: DocumentId,
    pub email: String,
    pub role: Role,
}

/// Invite as shown to the inviter; the token only travels by mail
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteSummary {
    pub id: InviteId,
    pub document_id: DocumentId,
    pub email: String,
    pub role: Role,
    pub status: InviteStatus,
}

impl From<&Invite> for InviteSummary {
    fn from(invite: &Invite) -> Self {
        Self {
            id: invite.id,
            document_id: invite.document_id,
            email: invite.email.clone(),
            role: invite.role,
            status: invite.status,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InviteResponse {
    /// False when the email had already accepted an invite to the document
    pub sent: bool,
    pub invite: InviteSummary,
}

impl From<InviteOutcome> for InviteResponse {
    fn from(outcome: InviteOutcome) -> Self {
        match outcome {
            InviteOutcome::Sent(invite) => Self {
                sent: true,
                invite: InviteSummary::from(&invite),
            },
            InviteOutcome::AlreadyAccepted(invite) => Self {
                sent: false,
                invite: InviteSummary::from(&invite),
            },
        }
    }
}
