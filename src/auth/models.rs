// Authentication data models and DTOs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::Validate;

use crate::validation::{
    validate_password_complexity, validate_person_name, validate_phone_number, validate_username,
};

/// Account database model
#[derive(Debug, Clone, FromRow)]
pub struct Account {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub password_hash: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
    pub is_active: bool,
    pub is_email_confirmed: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub failed_login_attempts: i32,
    pub locked_out_until: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Whether a lockout is in force at `now`
    pub fn is_locked_out(&self, now: DateTime<Utc>) -> bool {
        matches!(self.locked_out_until, Some(until) if until > now)
    }

    /// Clear the failure counter and any lockout
    pub fn unlock(&mut self) {
        self.failed_login_attempts = 0;
        self.locked_out_until = None;
    }
}

/// Username-or-email lookup key
///
/// The store resolves it against both uniqueness indexes; the core never
/// needs to know which one matched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginIdentifier(String);

impl LoginIdentifier {
    pub fn new(raw: impl AsRef<str>) -> Self {
        Self(raw.as_ref().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True when either the username or the email equals the identifier
    pub fn matches(&self, account: &Account) -> bool {
        account.username == self.0 || account.email == self.0
    }
}

impl std::fmt::Display for LoginIdentifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Refresh token database model
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct RefreshTokenRecord {
    pub id: Uuid,
    pub token: String,
    pub account_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub created_by_ip: String,
    pub is_revoked: bool,
    pub revoked_at: Option<DateTime<Utc>>,
    pub revoked_by_ip: Option<String>,
    /// Token issued in the same rotation that revoked this one
    pub replaced_by_token: Option<String>,
}

impl RefreshTokenRecord {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        !self.is_revoked && !self.is_expired(now)
    }

    /// Mark the token revoked; a token is revoked at most once
    pub fn revoke(&mut self, now: DateTime<Utc>, ip: Option<&str>, replaced_by: Option<&str>) {
        if self.is_revoked {
            return;
        }
        self.is_revoked = true;
        self.revoked_at = Some(now);
        self.revoked_by_ip = ip.map(str::to_string);
        self.replaced_by_token = replaced_by.map(str::to_string);
    }
}

/// Freshly minted refresh token that has no owner yet
#[derive(Debug, Clone)]
pub struct PendingRefreshToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub created_by_ip: String,
}

impl PendingRefreshToken {
    /// Attach the token to its owning account
    pub fn owned_by(self, account_id: Uuid) -> RefreshTokenRecord {
        RefreshTokenRecord {
            id: Uuid::new_v4(),
            token: self.token,
            account_id,
            expires_at: self.expires_at,
            created_at: self.created_at,
            created_by_ip: self.created_by_ip,
            is_revoked: false,
            revoked_at: None,
            revoked_by_ip: None,
            replaced_by_token: None,
        }
    }
}

/// Role database model
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Role {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    /// Auto-assigned at registration
    pub is_default: bool,
    pub is_deleted: bool,
}

impl Role {
    pub fn new(name: &str, description: &str, is_default: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.to_string(),
            description: description.to_string(),
            is_default,
            is_deleted: false,
        }
    }
}

/// Permission database model
#[derive(Debug, Clone, PartialEq, Eq, FromRow)]
pub struct Permission {
    pub id: Uuid,
    pub name: String,
    pub description: String,
    pub resource: String,
    pub action: String,
    pub is_deleted: bool,
}

impl Permission {
    /// Permission named `resource.action`
    pub fn new(resource: &str, action: &str, description: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: format!("{}.{}", resource, action),
            description: description.to_string(),
            resource: resource.to_string(),
            action: action.to_string(),
            is_deleted: false,
        }
    }
}

/// A role held by an account together with the permissions it grants
#[derive(Debug, Clone)]
pub struct RoleMembership {
    pub role: Role,
    pub permissions: Vec<Permission>,
}

/// User response model (excludes password_hash and lockout state)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone_number: Option<String>,
    pub is_email_confirmed: bool,
    pub is_active: bool,
    pub last_login_at: Option<DateTime<Utc>>,
    pub roles: Vec<String>,
    pub permissions: Vec<String>,
}

impl UserResponse {
    pub fn from_account(account: &Account, roles: Vec<String>, permissions: Vec<String>) -> Self {
        Self {
            id: account.id,
            username: account.username.clone(),
            email: account.email.clone(),
            first_name: account.first_name.clone(),
            last_name: account.last_name.clone(),
            phone_number: account.phone_number.clone(),
            is_email_confirmed: account.is_email_confirmed,
            is_active: account.is_active,
            last_login_at: account.last_login_at,
            roles,
            permissions,
        }
    }
}

/// Registration request DTO
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 50), custom = "validate_username")]
    pub username: String,
    #[validate(email, length(max = 320))]
    pub email: String,
    #[validate(length(min = 8, max = 255), custom = "validate_password_complexity")]
    pub password: String,
    #[validate(must_match = "password")]
    pub confirm_password: String,
    #[validate(length(min = 1, max = 100), custom = "validate_person_name")]
    pub first_name: String,
    #[validate(length(min = 1, max = 100), custom = "validate_person_name")]
    pub last_name: String,
    #[validate(length(max = 20), custom = "validate_phone_number")]
    pub phone_number: Option<String>,
}

/// Login request DTO
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, max = 320))]
    pub username_or_email: String,
    #[validate(length(min = 1))]
    pub password: String,
    #[serde(default)]
    pub remember_me: bool,
}

/// Token refresh request DTO
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RefreshRequest {
    #[validate(length(min = 1))]
    pub refresh_token: String,
}

/// Explicit refresh token revocation DTO
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct RevokeRequest {
    #[validate(length(min = 1))]
    pub refresh_token: String,
}

/// Access token validation DTO
#[derive(Debug, Clone, Deserialize)]
pub struct ValidateTokenRequest {
    pub token: String,
}

/// Authentication response DTO
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthResponse {
    pub access_token: String,
    /// Empty after registration, which does not open a refresh-capable session
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
    pub user: UserResponse,
}
