// HTTP handlers for authentication endpoints

use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::debug;
use validator::Validate;

use crate::auth::{
    error::AuthError,
    middleware::AuthenticatedUser,
    models::{
        AuthResponse, LoginRequest, RefreshRequest, RegisterRequest, RevokeRequest, UserResponse,
        ValidateTokenRequest,
    },
    service::AuthService,
};

/// Network origin of the caller
///
/// First entry of X-Forwarded-For, else the socket peer, else "unknown".
pub fn client_ip(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|ip| !ip.is_empty())
        .map(str::to_string)
        .or_else(|| peer.map(|addr| addr.ip().to_string()))
        .unwrap_or_else(|| "unknown".to_string())
}

/// Register a new user
/// POST /api/auth/register
pub async fn register_handler(
    State(service): State<Arc<AuthService>>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<AuthResponse>), AuthError> {
    request.validate()?;

    let response = service.register(&request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

/// Login a user
/// POST /api/auth/login
pub async fn login_handler(
    State(service): State<Arc<AuthService>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(request): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AuthError> {
    request.validate()?;

    let origin = client_ip(&headers, peer.map(|ConnectInfo(addr)| addr));
    let response = service
        .login(&request.username_or_email, &request.password, &origin)
        .await?;
    Ok(Json(response))
}

/// Rotate a refresh token
/// POST /api/auth/refresh
pub async fn refresh_handler(
    State(service): State<Arc<AuthService>>,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(request): Json<RefreshRequest>,
) -> Result<Json<AuthResponse>, AuthError> {
    request.validate()?;

    let origin = client_ip(&headers, peer.map(|ConnectInfo(addr)| addr));
    let response = service
        .refresh_session(&request.refresh_token, &origin)
        .await?;
    Ok(Json(response))
}

/// Revoke one refresh token (protected endpoint)
/// POST /api/auth/revoke
pub async fn revoke_handler(
    State(service): State<Arc<AuthService>>,
    user: AuthenticatedUser,
    peer: Option<ConnectInfo<SocketAddr>>,
    headers: HeaderMap,
    Json(request): Json<RevokeRequest>,
) -> Result<Json<Value>, AuthError> {
    request.validate()?;

    let origin = client_ip(&headers, peer.map(|ConnectInfo(addr)| addr));
    debug!("Account {} revoking a refresh token", user.account_id);
    service
        .revoke_token(user.account_id, &request.refresh_token, &origin)
        .await?;
    Ok(Json(json!({ "message": "Token revoked successfully" })))
}

/// Revoke every refresh token of the caller (protected endpoint)
/// POST /api/auth/logout
pub async fn logout_handler(
    State(service): State<Arc<AuthService>>,
    user: AuthenticatedUser,
) -> Result<Json<Value>, AuthError> {
    let revoked = service.logout(user.account_id).await?;
    Ok(Json(json!({
        "message": "Logged out successfully",
        "revoked_tokens": revoked,
    })))
}

/// Check an access token without requiring it as a credential
/// POST /api/auth/validate
pub async fn validate_handler(
    State(service): State<Arc<AuthService>>,
    Json(request): Json<ValidateTokenRequest>,
) -> Json<Value> {
    Json(json!({ "valid": service.validate_token(&request.token) }))
}

/// Get current user information (protected endpoint)
/// GET /api/auth/me
pub async fn me_handler(
    State(service): State<Arc<AuthService>>,
    user: AuthenticatedUser,
) -> Result<Json<UserResponse>, AuthError> {
    let profile = service.current_user(user.account_id).await?;
    Ok(Json(profile))
}

/// GET /health
pub async fn health_handler() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}
