//! Bearer authentication for HTTP routes

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use std::sync::Arc;
use tracing::debug;

use quill_core::core_access::{CollabError, User};

use crate::error::ApiError;
use crate::state::AppState;

/// The user behind the request's `Authorization` header
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let credential = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| CollabError::Unauthorized("authentication required".to_string()))?;

        let email = state.verifier.verify(credential).await.map_err(|e| {
            debug!(error = %e, "Rejected credential");
            CollabError::Unauthorized("Invalid or expired session".to_string())
        })?;

        let user = state
            .store
            .find_user_by_email(&email)
            .await?
            .ok_or_else(|| CollabError::Unauthorized("Invalid or expired session".to_string()))?;

        Ok(AuthUser(user))
    }
}
