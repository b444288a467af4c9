// Authentication module
// Credential verification with lockout, JWT access tokens, rotating refresh
// tokens, and role/permission claims

pub mod catalog;
pub mod claims;
pub mod error;
pub mod handlers;
pub mod lockout;
pub mod maintenance;
pub mod middleware;
pub mod models;
pub mod password;
pub mod repository;
pub mod rotation;
pub mod service;
pub mod token;

#[cfg(test)]
pub(crate) mod test_support;
#[cfg(test)]
mod tests;

// Re-export commonly used types
pub use catalog::{validate_role_catalog, RoleCatalog};
pub use claims::{ClaimsAssembler, ResolvedClaims};
pub use error::AuthError;
pub use lockout::CredentialVerifier;
pub use maintenance::TokenSweeper;
pub use middleware::AuthenticatedUser;
pub use models::{
    Account, AuthResponse, LoginIdentifier, LoginRequest, RefreshRequest, RefreshTokenRecord,
    RegisterRequest, RevokeRequest, UserResponse,
};
pub use password::{PasswordHashing, PasswordService};
pub use repository::{InMemoryStore, PgStore, Repositories};
pub use rotation::RefreshRotation;
pub use service::AuthService;
pub use token::{AccessClaims, TokenService};
