//! Identity collaborator seam.
//!
//! Token verification lives outside this service; the core only consumes
//! `verify(bearer) -> Option<AuthUser>` and treats any non-success as "no
//! authenticated user".

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::FromRequestParts;
use axum::http::{header, request::Parts};

use crate::error::AppError;
use crate::state::AppState;

/// An authenticated caller.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub id: String,
    pub email: String,
}

/// Identity collaborator contract.
#[async_trait::async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn verify(&self, bearer_token: &str) -> Option<AuthUser>;
}

/// Static token map, parsed from configuration.
///
/// Suits self-hosted deployments where operators hand out API tokens; a
/// hosted deployment swaps in a verifier backed by its identity provider.
pub struct StaticTokenProvider {
    tokens: HashMap<String, AuthUser>,
}

impl StaticTokenProvider {
    /// Parse `token:user_id:email` entries separated by commas. Malformed
    /// entries are skipped with a warning.
    pub fn from_config(api_tokens: &str) -> Self {
        let mut tokens = HashMap::new();

        for entry in api_tokens.split(',').filter(|e| !e.trim().is_empty()) {
            let mut parts = entry.trim().splitn(3, ':');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(token), Some(user_id), Some(email)) => {
                    tokens.insert(
                        token.to_string(),
                        AuthUser {
                            id: user_id.to_string(),
                            email: email.to_string(),
                        },
                    );
                }
                _ => {
                    tracing::warn!("Skipping malformed API token entry");
                }
            }
        }

        Self { tokens }
    }
}

#[async_trait::async_trait]
impl IdentityProvider for StaticTokenProvider {
    async fn verify(&self, bearer_token: &str) -> Option<AuthUser> {
        self.tokens.get(bearer_token).cloned()
    }
}

/// Extractor that rejects unauthenticated callers with 401.
pub struct RequireAuth(pub AuthUser);

#[async_trait::async_trait]
impl FromRequestParts<AppState> for RequireAuth {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .ok_or_else(|| AppError::Unauthorized("Missing bearer token".to_string()))?;

        let user = state
            .identity()
            .verify(token)
            .await
            .ok_or_else(|| AppError::Unauthorized("Invalid or expired token".to_string()))?;

        Ok(RequireAuth(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_provider_verifies_known_tokens() {
        let provider = StaticTokenProvider::from_config("abc:user-1:a@example.com, def:user-2:b@example.com");

        let user = provider.verify("abc").await.unwrap();
        assert_eq!(user.id, "user-1");
        assert_eq!(user.email, "a@example.com");

        assert!(provider.verify("nope").await.is_none());
    }

    #[tokio::test]
    async fn malformed_entries_are_skipped() {
        let provider = StaticTokenProvider::from_config("justatoken,ok:user:mail@example.com");
        assert!(provider.verify("justatoken").await.is_none());
        assert!(provider.verify("ok").await.is_some());
    }
}
