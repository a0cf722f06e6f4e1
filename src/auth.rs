//! Bearer token verification. Tokens are issued by an external identity
//! provider sharing the HS256 secret; minting lives here for tooling and tests.

use std::{
    env,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use axum::{
    extract::{FromRequestParts, Query},
    http::{header, request::Parts},
};
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    error::{AppError, ServiceError},
    state::SharedState,
};

/// Environment variable holding the shared HS256 secret.
pub const JWT_SECRET_ENV: &str = "MINDLINK_JWT_SECRET";
/// Lifetime of tokens minted by [`mint_access_token`].
pub const ACCESS_TOKEN_TTL: Duration = Duration::from_secs(60 * 60);
/// Query parameter accepted on the WebSocket upgrade, where browsers cannot set headers.
pub const TOKEN_QUERY_PARAM: &str = "access_token";

/// Key material used to verify tokens.
#[derive(Clone)]
pub struct SecurityConfig {
    jwt_secret: Vec<u8>,
    algorithm: Algorithm,
}

impl std::fmt::Debug for SecurityConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SecurityConfig")
            .field("algorithm", &self.algorithm)
            .finish_non_exhaustive()
    }
}

impl SecurityConfig {
    /// Use `secret` for HS256 signatures.
    pub fn from_secret(secret: impl AsRef<[u8]>) -> Self {
        Self {
            jwt_secret: secret.as_ref().to_vec(),
            algorithm: Algorithm::HS256,
        }
    }

    /// Read the secret from [`JWT_SECRET_ENV`]. Without it a random secret is
    /// generated, which only accepts tokens minted by this process.
    pub fn from_env() -> Self {
        match env::var(JWT_SECRET_ENV) {
            Ok(secret) if !secret.is_empty() => {
                info!("loaded token secret from environment");
                Self::from_secret(secret)
            }
            _ => {
                warn!(
                    env = JWT_SECRET_ENV,
                    "no token secret configured; generated an ephemeral one"
                );
                let mut secret = [0u8; 32];
                rand::rng().fill(&mut secret);
                Self::from_secret(secret)
            }
        }
    }
}

/// Claims carried by access tokens.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    /// User identifier.
    pub sub: String,
    /// Display name.
    pub name: String,
    /// Issued-at (seconds since epoch)
    pub iat: i64,
    /// Expiry (seconds since epoch)
    pub exp: i64,
}

/// Verified caller identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Stable user identifier.
    pub user_id: String,
    /// Display name shown to other players.
    pub name: String,
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        Self {
            user_id: claims.sub,
            name: claims.name,
        }
    }
}

/// Why a token was refused.
#[derive(Debug, Error)]
pub enum AuthError {
    /// No token on the request.
    #[error("missing bearer token")]
    Missing,
    /// Token past its expiry.
    #[error("token expired")]
    Expired,
    /// Signature does not match the configured secret.
    #[error("invalid token signature")]
    InvalidSignature,
    /// Any other decoding failure.
    #[error("invalid token")]
    Invalid,
    /// Token could not be produced.
    #[error("failed to encode token: {0}")]
    Encode(#[source] jsonwebtoken::errors::Error),
    /// System clock before the epoch.
    #[error("system clock is before the unix epoch")]
    Clock,
}

impl From<AuthError> for ServiceError {
    fn from(err: AuthError) -> Self {
        ServiceError::Unauthorized(err.to_string())
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::Encode(_) | AuthError::Clock => AppError::Internal(err.to_string()),
            other => AppError::Unauthorized(other.to_string()),
        }
    }
}

/// Mint a HS256 access token valid for [`ACCESS_TOKEN_TTL`] from `now`.
pub fn mint_access_token(
    sub: &str,
    name: &str,
    now: SystemTime,
    security: &SecurityConfig,
) -> Result<String, AuthError> {
    let iat = now
        .duration_since(UNIX_EPOCH)
        .map_err(|_| AuthError::Clock)?
        .as_secs() as i64;
    let claims = Claims {
        sub: sub.to_owned(),
        name: name.to_owned(),
        iat,
        exp: iat + ACCESS_TOKEN_TTL.as_secs() as i64,
    };

    encode(
        &Header::new(security.algorithm),
        &claims,
        &EncodingKey::from_secret(&security.jwt_secret),
    )
    .map_err(AuthError::Encode)
}

/// Verify a token and return its claims.
pub fn verify_access_token(token: &str, security: &SecurityConfig) -> Result<Claims, AuthError> {
    let validation = Validation::new(security.algorithm);

    decode::<Claims>(
        token,
        &DecodingKey::from_secret(&security.jwt_secret),
        &validation,
    )
    .map(|data| data.claims)
    .map_err(|err| match err.kind() {
        jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
        jsonwebtoken::errors::ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        _ => AuthError::Invalid,
    })
}

#[derive(Debug, Deserialize)]
struct TokenQuery {
    access_token: Option<String>,
}

/// Token carried by a request: the `Authorization: Bearer` header, or the
/// [`TOKEN_QUERY_PARAM`] query parameter.
pub fn token_from_parts(parts: &Parts) -> Option<String> {
    let header_token = parts
        .headers
        .get(header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .map(str::to_owned);
    if header_token.is_some() {
        return header_token;
    }

    Query::<TokenQuery>::try_from_uri(&parts.uri)
        .ok()
        .and_then(|Query(query)| query.access_token)
        .filter(|token| !token.is_empty())
}

/// Extractor resolving the caller identity from its bearer token.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub Identity);

impl FromRequestParts<SharedState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &SharedState,
    ) -> Result<Self, Self::Rejection> {
        let token = token_from_parts(parts).ok_or(AuthError::Missing)?;
        let claims = verify_access_token(&token, state.security())?;
        Ok(AuthenticatedUser(claims.into()))
    }
}

#[cfg(test)]
mod tests {
    use axum::http::Request;

    use super::*;

    fn security() -> SecurityConfig {
        SecurityConfig::from_secret("test_secret_key_for_testing_purposes_only")
    }

    #[test]
    fn tokens_round_trip() {
        let now = SystemTime::now();
        let token = mint_access_token("user-1", "Alice", now, &security()).unwrap();
        let claims = verify_access_token(&token, &security()).unwrap();

        assert_eq!(claims.sub, "user-1");
        assert_eq!(claims.name, "Alice");
        assert_eq!(claims.exp, claims.iat + ACCESS_TOKEN_TTL.as_secs() as i64);
        assert_eq!(
            Identity::from(claims),
            Identity {
                user_id: "user-1".into(),
                name: "Alice".into(),
            }
        );
    }

    #[test]
    fn expired_tokens_are_refused() {
        let issued = SystemTime::now() - ACCESS_TOKEN_TTL - Duration::from_secs(5 * 60);
        let token = mint_access_token("user-1", "Alice", issued, &security()).unwrap();
        assert!(matches!(
            verify_access_token(&token, &security()),
            Err(AuthError::Expired)
        ));
    }

    #[test]
    fn forged_tokens_are_refused() {
        let token = mint_access_token(
            "user-1",
            "Alice",
            SystemTime::now(),
            &SecurityConfig::from_secret("secret-A"),
        )
        .unwrap();
        assert!(matches!(
            verify_access_token(&token, &SecurityConfig::from_secret("secret-B")),
            Err(AuthError::InvalidSignature)
        ));
        assert!(matches!(
            verify_access_token("not-a-token", &security()),
            Err(AuthError::Invalid)
        ));
    }

    #[test]
    fn tokens_are_read_from_header_then_query() {
        let (parts, _) = Request::builder()
            .uri("/ws?access_token=from-query")
            .header(header::AUTHORIZATION, "Bearer from-header")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(token_from_parts(&parts).as_deref(), Some("from-header"));

        let (parts, _) = Request::builder()
            .uri("/ws?access_token=from-query")
            .body(())
            .unwrap()
            .into_parts();
        assert_eq!(token_from_parts(&parts).as_deref(), Some("from-query"));

        let (parts, _) = Request::builder().uri("/ws").body(()).unwrap().into_parts();
        assert_eq!(token_from_parts(&parts), None);
    }

    #[test]
    fn refusals_map_to_unauthorized() {
        let err: ServiceError = AuthError::Expired.into();
        assert!(matches!(err, ServiceError::Unauthorized(_)));
    }
}
