// Authentication extractor for protected routes

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap},
};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth::{error::AuthError, service::AuthService, token::AccessClaims};

/// Pull the bearer token out of the Authorization header
pub fn bearer_token(headers: &HeaderMap) -> Result<&str, AuthError> {
    let auth_header = headers
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| AuthError::InvalidToken)?;

    auth_header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::InvalidToken)
}

/// Caller identity taken from a validated access token
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub account_id: Uuid,
    pub username: String,
    pub email: String,
    pub claims: AccessClaims,
}

impl AuthenticatedUser {
    pub fn from_claims(claims: AccessClaims) -> Self {
        Self {
            account_id: claims.sub,
            username: claims.username.clone(),
            email: claims.email.clone(),
            claims,
        }
    }

    pub fn require_role(&self, role: &str) -> Result<(), AuthError> {
        if self.claims.has_role(role) {
            return Ok(());
        }
        warn!(
            "Authorization failed: account_id={}, required_role={}",
            self.account_id, role
        );
        Err(AuthError::InsufficientPermissions {
            required: role.to_string(),
        })
    }

    pub fn require_permission(&self, permission: &str) -> Result<(), AuthError> {
        if self.claims.has_permission(permission) {
            return Ok(());
        }
        warn!(
            "Authorization failed: account_id={}, required_permission={}",
            self.account_id, permission
        );
        Err(AuthError::InsufficientPermissions {
            required: permission.to_string(),
        })
    }
}

#[async_trait]
impl FromRequestParts<Arc<AuthService>> for AuthenticatedUser {
    type Rejection = AuthError;

    async fn from_request_parts(
        parts: &mut Parts,
        service: &Arc<AuthService>,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(&parts.headers)?;
        let claims = service.token_service().validate_access_token(token)?;

        debug!("Authenticated request for account {}", claims.sub);
        Ok(AuthenticatedUser::from_claims(claims))
    }
}
