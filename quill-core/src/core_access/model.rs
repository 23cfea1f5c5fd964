//! Records persisted by the access store

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::errors::CollabError;
use super::role::Role;
use super::types::{AccessId, DocumentId, InviteId, MediaId, Timestamp, UserId};

/// Normalize an email for storage and comparison
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// A user account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: UserId,

    /// Unique, normalized email
    pub email: String,

    pub first_name: Option<String>,

    pub last_name: Option<String>,

    pub created_at: Timestamp,

    pub updated_at: Timestamp,
}

impl User {
    /// Create a stub user known only by email
    pub fn stub(email: &str) -> Self {
        let now = Timestamp::now();
        User {
            id: UserId::generate(),
            email: normalize_email(email),
            first_name: None,
            last_name: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Stub users created by invite acceptance still need registration
    pub fn is_profile_complete(&self) -> bool {
        self.first_name.is_some() && self.last_name.is_some()
    }
}

/// Editable state of a document, always written as a whole
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentState {
    pub title: String,
    pub content: Option<String>,
}

/// A collaboratively edited document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub id: DocumentId,

    pub title: String,

    /// Opaque content payload
    pub content: Option<String>,

    /// Always the holder of the Creator access row
    pub owner_id: UserId,

    pub is_public: bool,

    pub created_at: Timestamp,

    pub updated_at: Timestamp,
}

impl Document {
    pub fn new(owner_id: UserId, state: DocumentState, is_public: bool) -> Self {
        let now = Timestamp::now();
        Document {
            id: DocumentId::generate(),
            title: state.title,
            content: state.content,
            owner_id,
            is_public,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn state(&self) -> DocumentState {
        DocumentState {
            title: self.title.clone(),
            content: self.content.clone(),
        }
    }
}

/// A collaborator's role on one document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentAccess {
    pub id: AccessId,

    pub document_id: DocumentId,

    pub collaborator_id: UserId,

    pub role: Role,

    pub created_at: Timestamp,

    pub updated_at: Timestamp,
}

impl DocumentAccess {
    pub fn new(document_id: DocumentId, collaborator_id: UserId, role: Role) -> Self {
        let now = Timestamp::now();
        DocumentAccess {
            id: AccessId::generate(),
            document_id,
            collaborator_id,
            role,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Invite lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InviteStatus {
    Pending,
    Accepted,
    Declined,
}

impl InviteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InviteStatus::Pending => "pending",
            InviteStatus::Accepted => "accepted",
            InviteStatus::Declined => "declined",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, InviteStatus::Pending)
    }
}

impl fmt::Display for InviteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InviteStatus {
    type Err = CollabError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(InviteStatus::Pending),
            "accepted" => Ok(InviteStatus::Accepted),
            "declined" => Ok(InviteStatus::Declined),
            other => Err(CollabError::InvalidRequest(format!("invalid invite status: {}", other))),
        }
    }
}

/// Email invitation to collaborate on a document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invite {
    pub id: InviteId,

    pub document_id: DocumentId,

    pub inviter_id: UserId,

    /// Normalized target email
    pub email: String,

    /// Set when the email belonged to an existing user at invite time
    pub collaborator_id: Option<UserId>,

    pub role: Role,

    /// Single-use, globally unique
    pub token: String,

    pub status: InviteStatus,

    pub created_at: Timestamp,

    pub updated_at: Timestamp,
}

impl Invite {
    pub fn new(
        document_id: DocumentId,
        inviter_id: UserId,
        email: &str,
        collaborator_id: Option<UserId>,
        role: Role,
        token: String,
    ) -> Self {
        let now = Timestamp::now();
        Invite {
            id: InviteId::generate(),
            document_id,
            inviter_id,
            email: normalize_email(email),
            collaborator_id,
            role,
            token,
            status: InviteStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Where a generated artifact lives in external storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaLocator {
    pub public_id: String,
    pub secure_url: String,
}

/// Ephemeral artifact generated from a document (e.g. a PDF export)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMedia {
    pub id: MediaId,

    pub document_id: DocumentId,

    pub locator: MediaLocator,

    /// e.g. "pdf"
    pub format: String,

    pub created_at: Timestamp,
}

impl DocumentMedia {
    pub fn new(document_id: DocumentId, locator: MediaLocator, format: impl Into<String>) -> Self {
        DocumentMedia {
            id: MediaId::generate(),
            document_id,
            locator,
            format: format.into(),
            created_at: Timestamp::now(),
        }
    }
}
