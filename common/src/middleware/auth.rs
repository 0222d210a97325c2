//! Authentication middleware.
//!
//! Resolves the bearer credential into an opaque [`Identity`] that the
//! gateway uses only as the ownership key of stored profiles.

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{FromRequestParts, State},
    http::{header::AUTHORIZATION, request::Parts, Request},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};

/// Authenticated caller, as supplied by the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identity(String);

impl Identity {
    /// Wraps an identity string.
    pub fn new(subject: impl Into<String>) -> Self {
        Self(subject.into())
    }

    /// Returns the identity string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or_else(|| AppError::Unauthenticated("missing bearer credential".into()))
    }
}

/// Turns a bearer credential into an identity.
pub trait IdentityProvider: Send + Sync {
    /// Verifies `token` and returns the caller identity.
    fn identify(&self, token: &str) -> AppResult<Identity>;
}

/// Token claims consumed by the gateway.
#[derive(Debug, Serialize, Deserialize)]
pub struct Claims {
    /// Subject: the caller identity.
    pub sub: String,
    /// Expiration time (Unix timestamp).
    pub exp: u64,
}

/// HS256 JWT verifier.
pub struct JwtIdentityProvider {
    key: DecodingKey,
    validation: Validation,
}

impl JwtIdentityProvider {
    /// Creates a verifier for tokens signed with `secret`.
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.set_required_spec_claims(&["exp", "sub"]);
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }
}

impl IdentityProvider for JwtIdentityProvider {
    fn identify(&self, token: &str) -> AppResult<Identity> {
        let data = decode::<Claims>(token, &self.key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AppError::Unauthenticated("token has expired".into()),
                _ => AppError::Unauthenticated("invalid token".into()),
            }
        })?;

        if data.claims.sub.trim().is_empty() {
            return Err(AppError::Unauthenticated("token has no subject".into()));
        }
        Ok(Identity::new(data.claims.sub))
    }
}

/// Authentication middleware handler.
///
/// Rejects the request with `Unauthenticated` unless it carries a bearer
/// token the provider accepts; on success the [`Identity`] is attached to
/// the request extensions.
pub async fn auth_middleware(
    State(provider): State<Arc<dyn IdentityProvider>>,
    mut req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let token = extract_bearer_token(&req)
        .ok_or_else(|| AppError::Unauthenticated("missing bearer credential".into()))?;
    let identity = provider.identify(token)?;

    tracing::Span::current().record("owner", identity.as_str());
    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

/// Extract bearer token from Authorization header.
pub fn extract_bearer_token(req: &Request<Body>) -> Option<&str> {
    req.headers()
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};

    fn token(secret: &str, sub: &str, exp_offset: i64) -> String {
        let exp = (chrono::Utc::now().timestamp() + exp_offset) as u64;
        encode(
            &Header::new(Algorithm::HS256),
            &Claims { sub: sub.into(), exp },
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn test_valid_token() {
        let provider = JwtIdentityProvider::new("secret");
        let identity = provider.identify(&token("secret", "alice", 600)).unwrap();
        assert_eq!(identity.as_str(), "alice");
    }

    #[test]
    fn test_wrong_secret() {
        let provider = JwtIdentityProvider::new("secret");
        let err = provider.identify(&token("other", "alice", 600)).unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated(_)));
    }

    #[test]
    fn test_expired_token() {
        let provider = JwtIdentityProvider::new("secret");
        let err = provider.identify(&token("secret", "alice", -3600)).unwrap_err();
        assert!(matches!(err, AppError::Unauthenticated(ref m) if m.contains("expired")));
    }

    #[test]
    fn test_empty_subject() {
        let provider = JwtIdentityProvider::new("secret");
        assert!(provider.identify(&token("secret", " ", 600)).is_err());
    }

    #[test]
    fn test_extract_bearer_token() {
        let req = Request::builder()
            .header("Authorization", "Bearer abc")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_bearer_token(&req), Some("abc"));

        let req = Request::builder()
            .header("Authorization", "Basic abc")
            .body(Body::empty())
            .unwrap();
        assert_eq!(extract_bearer_token(&req), None);
    }
}
