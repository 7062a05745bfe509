//! Per-request authentication: bearer token -> Principal

use std::sync::Arc;
use std::time::Duration;

use axum::http::{header::AUTHORIZATION, HeaderMap};

use super::token::TokenCodec;
use crate::{
    error::{AppResult, TokenError},
    models::user::Principal,
    repository::{bounded, IdentityDirectory},
};

const BEARER_PREFIX: &str = "Bearer ";

/// Turns the `Authorization` header of a request into an optional principal.
///
/// Token problems never fail the request: they yield `None` and leave the
/// decision to the route's authorization check. Only a failing identity
/// directory is reported as an error.
#[derive(Clone)]
pub struct AuthenticationGate {
    codec: Arc<TokenCodec>,
    directory: Arc<dyn IdentityDirectory>,
    store_timeout: Duration,
}

impl AuthenticationGate {
    pub fn new(codec: Arc<TokenCodec>, directory: Arc<dyn IdentityDirectory>, store_timeout: Duration) -> Self {
        Self {
            codec,
            directory,
            store_timeout,
        }
    }

    pub async fn authenticate(&self, headers: &HeaderMap) -> AppResult<Option<Principal>> {
        let Some(token) = bearer_token(headers) else {
            return Ok(None);
        };

        let decoded = match self.codec.decode(token) {
            Ok(decoded) => decoded,
            Err(TokenError::Expired) => {
                tracing::debug!("Ignoring expired token");
                return Ok(None);
            }
            Err(TokenError::SignatureInvalid) => {
                tracing::warn!("Rejected token with invalid signature");
                return Ok(None);
            }
            Err(e) => {
                tracing::debug!("Ignoring unusable token: {}", e);
                return Ok(None);
            }
        };

        let identity = bounded(
            self.store_timeout,
            "identity lookup",
            self.directory.find_by_subject(&decoded.subject),
        )
        .await?;

        let Some(identity) = identity else {
            tracing::debug!("Token subject {} is not a known user", decoded.subject);
            return Ok(None);
        };

        // Tokens outlive role changes; the directory is authoritative
        if decoded.role() != Some(identity.role) {
            tracing::info!(
                "Role claim {} for {} is stale, using current role {}",
                decoded.role_claim,
                decoded.subject,
                identity.role
            );
        }

        Ok(Some(Principal {
            subject: decoded.subject,
            role: identity.role,
        }))
    }
}

/// The token of a `Bearer` authorization header, if any
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let token = value.strip_prefix(BEARER_PREFIX)?.trim();
    (!token.is_empty()).then_some(token)
}
