//! Bearer token checks
//!
//! Tokens are HS256 JWTs carrying a `role` claim. Any valid token may call
//! the transfer route; deletion and direct credit require `role == "admin"`.

use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::Response,
};
use chrono::Utc;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::warn;

use super::state::AppState;
use super::types::{ApiError, error_codes};

pub const ADMIN_ROLE: &str = "admin";

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    /// Expiration time (UTC timestamp, seconds)
    pub exp: usize,
}

impl Claims {
    pub fn is_admin(&self) -> bool {
        self.role == ADMIN_ROLE
    }
}

/// Sign a token valid for `ttl_secs` seconds.
pub fn issue_token(
    secret: &str,
    sub: &str,
    role: &str,
    ttl_secs: i64,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: sub.to_string(),
        role: role.to_string(),
        exp: (Utc::now().timestamp() + ttl_secs).max(0) as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

pub fn verify_token(secret: &str, token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    let validation = Validation::new(Algorithm::HS256);
    let token_data = decode::<Claims>(token, &decoding_key, &validation)?;
    Ok(token_data.claims)
}

/// Verify the bearer token and inject its [`Claims`] into the request.
pub async fn jwt_auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            ApiError::unauthorized(error_codes::MISSING_AUTH, "Missing Authorization header")
        })?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| ApiError::unauthorized(error_codes::AUTH_FAILED, "Invalid token format"))?;

    match verify_token(&state.jwt_secret, token) {
        Ok(claims) => {
            request.extensions_mut().insert(claims);
            Ok(next.run(request).await)
        }
        Err(e) => {
            warn!(error = %e, "Rejected bearer token");
            Err(ApiError::unauthorized(
                error_codes::AUTH_FAILED,
                "Invalid or expired token",
            ))
        }
    }
}

/// Reject callers whose token is not an admin token.
///
/// Must run after [`jwt_auth_middleware`].
pub async fn require_admin(request: Request<Body>, next: Next) -> Result<Response, ApiError> {
    let claims = request.extensions().get::<Claims>().ok_or_else(|| {
        ApiError::unauthorized(error_codes::MISSING_AUTH, "Missing Authorization header")
    })?;
    if !claims.is_admin() {
        warn!(sub = %claims.sub, role = %claims.role, "Admin route refused");
        return Err(ApiError::forbidden("Admin role required"));
    }
    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_then_verify() {
        let token = issue_token("s3cret", "ops", ADMIN_ROLE, 60).unwrap();
        let claims = verify_token("s3cret", &token).unwrap();
        assert_eq!(claims.sub, "ops");
        assert!(claims.is_admin());
    }

    #[test]
    fn test_wrong_secret_rejected() {
        let token = issue_token("s3cret", "ops", "user", 60).unwrap();
        assert!(verify_token("other", &token).is_err());
    }

    #[test]
    fn test_expired_token_rejected() {
        let token = issue_token("s3cret", "ops", "user", -3600).unwrap();
        assert!(verify_token("s3cret", &token).is_err());
    }
}
