//! Real-time collaboration gateway
//!
//! Transport agnostic: a transport authenticates a connection through
//! [`CollaborationGateway::connect`], feeds it every inbound frame in order,
//! drains the connection's outbox to the client and calls
//! [`CollaborationGateway::disconnect`] when the socket closes.
//!
//! Connection lifecycle:
//!
//! ```text
//! Connecting --connect ok--> Authenticated --join/leave/edit--> ... --> Closed
//!      |
//!      +--connect fails--> rejected (never registered)
//! ```
//!
//! Edits are last-write-wins. Two concurrent edits to the same document are
//! applied in whatever order the store commits them; nothing is merged.

pub mod events;
pub mod rooms;

pub use events::{ClientEvent, EditPayload, ServerEvent};
pub use rooms::{ConnectionId, Outbox, RoomRegistry};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::core_access::{CollabError, CollabResult, DocumentId, RoleAuthorizer, UserId};
use crate::core_store::AccessStore;
use crate::ports::IdentityVerifier;

/// Identity bound to an authenticated connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub connection_id: ConnectionId,
    pub user_id: UserId,
    pub email: String,
}

/// Authenticates connections, tracks rooms and relays edits
pub struct CollaborationGateway {
    store: Arc<dyn AccessStore>,
    verifier: Arc<dyn IdentityVerifier>,
    rooms: RoomRegistry,
    next_connection: AtomicU64,
}

impl CollaborationGateway {
    pub fn new(store: Arc<dyn AccessStore>, verifier: Arc<dyn IdentityVerifier>) -> Self {
        Self {
            store,
            verifier,
            rooms: RoomRegistry::new(),
            next_connection: AtomicU64::new(1),
        }
    }

    pub fn rooms(&self) -> &RoomRegistry {
        &self.rooms
    }

    /// Authenticate a new connection and register its outbox.
    ///
    /// On failure an `error` event is queued on `outbox` and the connection
    /// is never registered; the transport should close it.
    pub async fn connect(&self, credential: Option<&str>, outbox: Outbox) -> CollabResult<Session> {
        let session = match self.authenticate(credential).await {
            Ok(session) => session,
            Err(e) => {
                let _ = outbox.send(ServerEvent::error(&e));
                return Err(e);
            }
        };

        self.rooms.register(session.connection_id, outbox).await;
        self.rooms
            .send_to(
                session.connection_id,
                ServerEvent::Connected {
                    message: "Connection established".to_string(),
                    user_id: session.user_id,
                },
            )
            .await;

        info!(connection = session.connection_id, user = %session.user_id, "Authenticated connection");
        Ok(session)
    }

    async fn authenticate(&self, credential: Option<&str>) -> CollabResult<Session> {
        let rejected = || CollabError::Unauthorized("Invalid or expired session".to_string());

        let credential = credential
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| CollabError::Unauthorized("authentication required".to_string()))?;

        let email = self.verifier.verify(credential).await.map_err(|e| {
            warn!(error = %e, "Token validation failed");
            rejected()
        })?;

        let user = self
            .store
            .find_user_by_email(&email)
            .await
            .map_err(|e| {
                warn!(error = %e, "User lookup failed");
                rejected()
            })?
            .ok_or_else(|| {
                warn!(email = %email, "No user for verified credential");
                rejected()
            })?;

        Ok(Session {
            connection_id: self.next_connection.fetch_add(1, Ordering::Relaxed),
            user_id: user.id,
            email: user.email,
        })
    }

    /// Handle one raw text frame
    pub async fn handle_text(&self, session: &Session, text: &str) {
        match ClientEvent::from_json(text) {
            Ok(event) => self.handle(session, event).await,
            Err(e) => self.reply_error(session, &e).await,
        }
    }

    /// Handle one event; failures become an `error` event to this connection only
    pub async fn handle(&self, session: &Session, event: ClientEvent) {
        let result = match event {
            ClientEvent::Join(room) => self.join(session, &room).await,
            ClientEvent::Leave(room) => self.leave(session, &room).await,
            ClientEvent::Edit(data) => self.edit(session, data).await,
        };

        if let Err(e) = result {
            self.reply_error(session, &e).await;
        }
    }

    async fn reply_error(&self, session: &Session, err: &CollabError) {
        debug!(connection = session.connection_id, error = %err, "Event rejected");
        self.rooms
            .send_to(session.connection_id, ServerEvent::error(err))
            .await;
    }

    fn parse_room(room: &str) -> CollabResult<DocumentId> {
        room.parse()
            .map_err(|_| CollabError::InvalidPayload("invalid document id".to_string()))
    }

    async fn join(&self, session: &Session, room: &str) -> CollabResult<()> {
        let room = Self::parse_room(room)?;
        self.rooms.join(session.connection_id, room).await;
        self.rooms
            .send_to(session.connection_id, ServerEvent::Joined { room })
            .await;
        let members = self.rooms.members(&room).await.len();
        debug!(
            connection = session.connection_id,
            room = %room,
            members = members,
            "Joined room"
        );
        Ok(())
    }

    async fn leave(&self, session: &Session, room: &str) -> CollabResult<()> {
        let room = Self::parse_room(room)?;
        self.rooms.leave(session.connection_id, room).await;
        self.rooms
            .send_to(session.connection_id, ServerEvent::Left { room })
            .await;
        debug!(connection = session.connection_id, room = %room, "Left room");
        Ok(())
    }

    async fn edit(&self, session: &Session, data: serde_json::Value) -> CollabResult<()> {
        let payload = EditPayload::parse(data)?;

        let role = self
            .store
            .find_access(&payload.document_id, &session.user_id)
            .await?
            .map(|a| a.role);
        if !RoleAuthorizer::can_edit(role) {
            return Err(CollabError::Forbidden(
                "You do not have access to edit this document".to_string(),
            ));
        }

        let document = self
            .store
            .update_document_state(&payload.document_id, &payload.state)
            .await?;

        let delivered = self
            .rooms
            .broadcast(
                &document.id,
                Some(session.connection_id),
                &ServerEvent::DocumentUpdated {
                    editor_id: session.user_id,
                    document: document.clone(),
                },
            )
            .await;

        debug!(
            connection = session.connection_id,
            document = %document.id,
            delivered,
            "Edit applied"
        );
        Ok(())
    }

    /// Forget the connection; document state is untouched
    pub async fn disconnect(&self, session: &Session) {
        self.rooms.unregister(session.connection_id).await;
        info!(connection = session.connection_id, "Connection closed");
    }
}
