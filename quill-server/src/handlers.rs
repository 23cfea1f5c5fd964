//! HTTP API handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use std::sync::Arc;

use quill_core::core_access::{
    AccessId, Document, DocumentAccess, DocumentId, DocumentMedia, Role, UserId,
};
use quill_core::core_collab::AcceptOutcome;

use crate::auth::AuthUser;
use crate::error::ApiResult;
use crate::state::AppState;
use crate::types::*;

type AppStateRef = State<Arc<AppState>>;

// ============================================================================
// Document Handlers
// ============================================================================

/// POST /documents
pub async fn create_document(
    State(state): AppStateRef,
    AuthUser(user): AuthUser,
    Json(req): Json<CreateDocumentRequest>,
) -> ApiResult<(StatusCode, Json<Document>)> {
    let document = state
        .documents
        .create_document(&user.id, req.state(), req.is_public)
        .await?;
    Ok((StatusCode::CREATED, Json(document)))
}

/// GET /documents - every document the caller collaborates on
pub async fn list_documents(
    State(state): AppStateRef,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<Vec<AccessibleDocument>>> {
    let documents = state
        .documents
        .list_accessible_documents(&user.id)
        .await?
        .into_iter()
        .map(|(document, role)| AccessibleDocument { document, role })
        .collect();
    Ok(Json(documents))
}

/// GET /documents/owned
pub async fn list_owned_documents(
    State(state): AppStateRef,
    AuthUser(user): AuthUser,
) -> ApiResult<Json<Vec<Document>>> {
    Ok(Json(state.documents.list_owned_documents(&user.id).await?))
}

/// GET /documents/:id
pub async fn get_document(
    State(state): AppStateRef,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Document>> {
    let id: DocumentId = id.parse()?;
    Ok(Json(state.documents.get_document(&user.id, &id).await?))
}

/// DELETE /documents/:id
pub async fn delete_document(
    State(state): AppStateRef,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id: DocumentId = id.parse()?;
    state.documents.delete_document(&user.id, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PATCH /documents/:id/visibility
pub async fn toggle_visibility(
    State(state): AppStateRef,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Document>> {
    let id: DocumentId = id.parse()?;
    Ok(Json(state.documents.toggle_visibility(&user.id, &id).await?))
}

/// GET /documents/:id/collaborators
pub async fn list_collaborators(
    State(state): AppStateRef,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<DocumentAccess>>> {
    let id: DocumentId = id.parse()?;
    Ok(Json(state.documents.list_collaborators(&user.id, &id).await?))
}

/// POST /documents/:id/media
pub async fn register_media(
    State(state): AppStateRef,
    AuthUser(user): AuthUser,
    Path(id): Path<String>,
    Json(req): Json<RegisterMediaRequest>,
) -> ApiResult<(StatusCode, Json<DocumentMedia>)> {
    let id: DocumentId = id.parse()?;
    let media = state
        .documents
        .register_media(&user.id, &id, req.locator, &req.format)
        .await?;
    Ok((StatusCode::CREATED, Json(media)))
}

/// POST /documents/:id/transfer/:recipient_id
pub async fn transfer_ownership(
    State(state): AppStateRef,
    AuthUser(user): AuthUser,
    Path((id, recipient)): Path<(String, String)>,
) -> ApiResult<Json<MessageResponse>> {
    let id: DocumentId = id.parse()?;
    let recipient: UserId = recipient.parse()?;
    state.transfers.transfer(&id, &user.id, &recipient).await?;
    Ok(Json(MessageResponse::new("Ownership transferred")))
}

// ============================================================================
// Access Handlers
// ============================================================================

/// PATCH /access/:access_id/role/:role
pub async fn modify_access(
    State(state): AppStateRef,
    AuthUser(user): AuthUser,
    Path((access_id, role)): Path<(String, String)>,
) -> ApiResult<Json<DocumentAccess>> {
    let access_id: AccessId = access_id.parse()?;
    let role: Role = role.parse()?;
    Ok(Json(
        state.documents.modify_access(&user.id, &access_id, role).await?,
    ))
}

/// DELETE /access/:access_id
pub async fn revoke_access(
    State(state): AppStateRef,
    AuthUser(user): AuthUser,
    Path(access_id): Path<String>,
) -> ApiResult<StatusCode> {
    let access_id: AccessId = access_id.parse()?;
    state.documents.revoke_access(&user.id, &access_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ============================================================================
// Invite Handlers
// ============================================================================

/// POST /invites
pub async fn create_invite(
    State(state): AppStateRef,
    AuthUser(user): AuthUser,
    Json(req): Json<InviteRequest>,
) -> ApiResult<Json<InviteResponse>> {
    let outcome = state
        .invites
        .invite(&req.document_id, &user.id, &req.email, req.role)
        .await?;
    Ok(Json(outcome.into()))
}

/// POST /invites/:token/accept - unauthenticated, doubles as sign-in
pub async fn accept_invite(
    State(state): AppStateRef,
    Path(token): Path<String>,
) -> ApiResult<Json<AcceptOutcome>> {
    Ok(Json(state.invites.accept(&token).await?))
}

/// POST /invites/:token/decline
pub async fn decline_invite(
    State(state): AppStateRef,
    Path(token): Path<String>,
) -> ApiResult<Json<InviteSummary>> {
    let invite = state.invites.decline(&token).await?;
    Ok(Json(InviteSummary::from(&invite)))
}

/// GET /health
pub async fn health(State(state): AppStateRef) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": if state.shutdown.is_shutting_down().await { "draining" } else { "ok" },
        "connections": state.gateway.rooms().connection_count().await,
    }))
}
