//! Wire format of the real-time channel
//!
//! Frames are JSON objects `{"event": <name>, "data": <payload>}`.

use serde::{Deserialize, Serialize};

use crate::core_access::{CollabError, Document, DocumentId, DocumentState, UserId};

/// Events sent by clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Room id (a document id)
    Join(String),
    /// Room id (a document id)
    Leave(String),
    /// Document id plus the full new state; validated by [`EditPayload::parse`]
    Edit(serde_json::Value),
}

impl ClientEvent {
    pub fn from_json(text: &str) -> Result<Self, CollabError> {
        serde_json::from_str(text)
            .map_err(|e| CollabError::InvalidPayload(format!("malformed event: {}", e)))
    }
}

/// Events sent by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "snake_case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    Connected { message: String, user_id: UserId },
    Joined { room: DocumentId },
    Left { room: DocumentId },
    DocumentUpdated { editor_id: UserId, document: Document },
    Error { message: String, code: u16 },
}

impl ServerEvent {
    pub fn error(err: &CollabError) -> Self {
        ServerEvent::Error {
            message: err.public_message(),
            code: err.status_code(),
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Deserialize)]
struct RawEdit {
    #[serde(rename = "ID", alias = "id", alias = "documentId")]
    id: String,
    title: String,
    #[serde(default)]
    content: Option<String>,
}

/// A validated `edit` payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditPayload {
    pub document_id: DocumentId,
    pub state: DocumentState,
}

impl EditPayload {
    /// Fails with `InvalidPayload` when the id or the state is missing or malformed
    pub fn parse(data: serde_json::Value) -> Result<Self, CollabError> {
        let raw: RawEdit = serde_json::from_value(data)
            .map_err(|e| CollabError::InvalidPayload(format!("invalid edit payload: {}", e)))?;

        let document_id = raw
            .id
            .parse()
            .map_err(|_| CollabError::InvalidPayload("invalid document id".to_string()))?;

        Ok(EditPayload {
            document_id,
            state: DocumentState {
                title: raw.title,
                content: raw.content,
            },
        })
    }
}
