//! Signed bearer tokens
//!
//! Format: `hex(claims json) "." hex(blake3 keyed MAC over the json)`.
//! The MAC key is derived from the configured secret, so rotating the
//! secret invalidates every outstanding token.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::{CredentialIssuer, CredentialPair, IdentityVerifier, PortError, PortResult};
use crate::config::AuthConfig;
use crate::core_access::{normalize_email, Timestamp};

const KEY_CONTEXT: &str = "quill 2024-06 bearer token mac";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Access,
    Refresh,
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    kind: TokenKind,
    /// Expiry in Unix milliseconds
    exp: u64,
}

/// Issues and verifies MAC-signed tokens
pub struct SignedTokenService {
    key: [u8; 32],
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl SignedTokenService {
    pub fn new(secret: &str, access_ttl: Duration, refresh_ttl: Duration) -> Self {
        Self {
            key: blake3::derive_key(KEY_CONTEXT, secret.as_bytes()),
            access_ttl,
            refresh_ttl,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(&config.secret, config.access_ttl, config.refresh_ttl)
    }

    /// Sign a token of `kind` for `email`
    pub fn sign(&self, email: &str, kind: TokenKind) -> PortResult<String> {
        let ttl = match kind {
            TokenKind::Access => self.access_ttl,
            TokenKind::Refresh => self.refresh_ttl,
        };
        let claims = Claims {
            sub: normalize_email(email),
            kind,
            exp: Timestamp::now().as_millis().saturating_add(ttl.as_millis() as u64),
        };

        let payload = serde_json::to_vec(&claims)?;
        let mac = blake3::keyed_hash(&self.key, &payload);
        Ok(format!("{}.{}", hex::encode(&payload), mac.to_hex()))
    }

    /// Verify a token and require it to be of `kind`; returns the subject email
    pub fn verify_kind(&self, token: &str, kind: TokenKind) -> PortResult<String> {
        let token = token.trim();
        let token = token.strip_prefix("Bearer ").unwrap_or(token).trim();
        if token.is_empty() {
            return Err(PortError::InvalidCredential("missing token".to_string()));
        }

        let (payload_hex, mac_hex) = token
            .split_once('.')
            .ok_or_else(|| PortError::InvalidCredential("malformed token".to_string()))?;

        let payload = hex::decode(payload_hex)
            .map_err(|_| PortError::InvalidCredential("malformed token".to_string()))?;
        let provided = blake3::Hash::from_hex(mac_hex)
            .map_err(|_| PortError::InvalidCredential("malformed token".to_string()))?;

        // blake3::Hash equality is constant time
        if blake3::keyed_hash(&self.key, &payload) != provided {
            return Err(PortError::InvalidCredential("bad signature".to_string()));
        }

        let claims: Claims = serde_json::from_slice(&payload)
            .map_err(|_| PortError::InvalidCredential("malformed claims".to_string()))?;

        if claims.kind != kind {
            return Err(PortError::InvalidCredential(format!(
                "expected a {:?} token",
                kind
            )));
        }
        if Timestamp::now().as_millis() >= claims.exp {
            return Err(PortError::InvalidCredential("token expired".to_string()));
        }

        Ok(claims.sub)
    }
}

#[async_trait]
impl IdentityVerifier for SignedTokenService {
    async fn verify(&self, credential: &str) -> PortResult<String> {
        self.verify_kind(credential, TokenKind::Access)
    }
}

#[async_trait]
impl CredentialIssuer for SignedTokenService {
    async fn issue(&self, email: &str) -> PortResult<CredentialPair> {
        Ok(CredentialPair {
            access_token: self.sign(email, TokenKind::Access)?,
            refresh_token: self.sign(email, TokenKind::Refresh)?,
        })
    }
}
