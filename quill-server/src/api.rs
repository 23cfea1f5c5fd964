//! API routes definition

use axum::{
    routing::{delete, get, patch, post},
    Router,
};
use std::sync::Arc;

use crate::handlers;
use crate::state::AppState;
use crate::ws;

/// Build the API router with all endpoints
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        // Document routes
        .route(
            "/documents",
            post(handlers::create_document).get(handlers::list_documents),
        )
        .route("/documents/owned", get(handlers::list_owned_documents))
        .route(
            "/documents/:id",
            get(handlers::get_document).delete(handlers::delete_document),
        )
        .route("/documents/:id/visibility", patch(handlers::toggle_visibility))
        .route("/documents/:id/collaborators", get(handlers::list_collaborators))
        .route("/documents/:id/media", post(handlers::register_media))
        .route(
            "/documents/:id/transfer/:recipient_id",
            post(handlers::transfer_ownership),
        )
        // Access routes
        .route("/access/:access_id/role/:role", patch(handlers::modify_access))
        .route("/access/:access_id", delete(handlers::revoke_access))
        // Invite routes
        .route("/invites", post(handlers::create_invite))
        .route("/invites/:token/accept", post(handlers::accept_invite))
        .route("/invites/:token/decline", post(handlers::decline_invite))
        // Real-time gateway
        .route("/ws", get(ws::ws_handler))
        .route("/health", get(handlers::health))
        .with_state(state)
}
