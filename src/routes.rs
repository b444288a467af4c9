// Application router

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use crate::auth::{
    handlers::{
        health_handler, login_handler, logout_handler, me_handler, refresh_handler,
        register_handler, revoke_handler, validate_handler,
    },
    AuthService,
};

/// Creates and configures the application router
pub fn create_router(service: Arc<AuthService>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/auth/register", post(register_handler))
        .route("/api/auth/login", post(login_handler))
        .route("/api/auth/refresh", post(refresh_handler))
        .route("/api/auth/revoke", post(revoke_handler))
        .route("/api/auth/logout", post(logout_handler))
        .route("/api/auth/validate", post(validate_handler))
        .route("/api/auth/me", get(me_handler))
        .with_state(service)
}
