//! Authentication extractors.
//!
//! This module provides extractors for:
//! - `AuthUser` - End-user authentication via an HS256 JWT issued by the auth provider
//! - `AdminAuth` - Operator authentication, either a JWT carrying the admin role or the
//!   `x-admin-key` header

use std::sync::Arc;

use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};

use keyshop_core::UserId;

use crate::config::ServiceConfig;
use crate::crypto::constant_time_eq;
use crate::error::ApiError;
use crate::state::AppState;

/// Role name granting operator access.
pub const ADMIN_ROLE: &str = "admin";

/// Header carrying the operator key.
pub const ADMIN_KEY_HEADER: &str = "x-admin-key";

/// JWT claims issued by the auth provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JwtClaims {
    /// Subject (user ID).
    pub sub: String,
    /// Audience (can be string or array).
    #[serde(default)]
    pub aud: Option<serde_json::Value>,
    /// Expiration time.
    pub exp: i64,
    /// Provider-controlled metadata; users cannot edit it.
    #[serde(default)]
    pub app_metadata: AppMetadata,
}

/// Provider-controlled user metadata.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppMetadata {
    /// Role assigned by the provider.
    #[serde(default)]
    pub role: Option<String>,
}

/// An authenticated user extracted from a bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    /// The user ID.
    pub user_id: UserId,
    /// Whether the token carries the admin role.
    pub is_admin: bool,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts).ok_or(ApiError::Unauthenticated)?;
        authenticate(token, &state.config)
    }
}

/// Operator authentication.
#[derive(Debug, Clone)]
pub struct AdminAuth {
    /// Admin identifier (for audit logging).
    pub admin_id: String,
}

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AdminAuth {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        if let Some(presented) = parts
            .headers
            .get(ADMIN_KEY_HEADER)
            .and_then(|v| v.to_str().ok())
        {
            let expected = state
                .config
                .admin_api_key
                .as_deref()
                .ok_or(ApiError::Unauthenticated)?;

            if !constant_time_eq(presented, expected) {
                tracing::warn!("Rejected operator key");
                return Err(ApiError::Unauthenticated);
            }

            return Ok(AdminAuth {
                admin_id: "operator-key".to_string(),
            });
        }

        let token = bearer_token(parts).ok_or(ApiError::Unauthenticated)?;
        let user = authenticate(token, &state.config)?;
        if !user.is_admin {
            tracing::warn!(user_id = %user.user_id, "Non-admin user called an operator endpoint");
            return Err(ApiError::Forbidden);
        }

        tracing::info!(admin_id = %user.user_id, "Admin authenticated");

        Ok(AdminAuth {
            admin_id: user.user_id.to_string(),
        })
    }
}

/// Extract the bearer token from the `Authorization` header.
fn bearer_token(parts: &Parts) -> Option<&str> {
    parts
        .headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Validate a token and resolve the user it belongs to.
fn authenticate(token: &str, config: &ServiceConfig) -> Result<AuthUser, ApiError> {
    let claims = validate_jwt(token, config)?;

    let user_id = claims
        .sub
        .parse::<UserId>()
        .map_err(|_| ApiError::Unauthenticated)?;

    Ok(AuthUser {
        user_id,
        is_admin: claims.app_metadata.role.as_deref() == Some(ADMIN_ROLE),
    })
}

/// Validate an HS256 JWT against the configured secret and audience.
fn validate_jwt(token: &str, config: &ServiceConfig) -> Result<JwtClaims, ApiError> {
    let Some(secret) = config.auth_jwt_secret.as_deref() else {
        tracing::warn!("AUTH_JWT_SECRET not configured - rejecting user token");
        return Err(ApiError::Unauthenticated);
    };

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[&config.auth_audience]);

    let token_data = decode::<JwtClaims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &validation,
    )
    .map_err(|e| {
        tracing::debug!(error = %e, "JWT validation failed");
        ApiError::Unauthenticated
    })?;

    Ok(token_data.claims)
}
