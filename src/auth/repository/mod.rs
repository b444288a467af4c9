// Store interfaces required by the authentication core
// Implementations: in-memory (tests, single-node dev) and PostgreSQL

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{
    error::AuthError,
    models::{Account, LoginIdentifier, RefreshTokenRecord, Role, RoleMembership},
};
use crate::config::LockoutPolicy;

pub mod memory;
pub mod postgres;

pub use memory::InMemoryStore;
pub use postgres::PgStore;

/// Account persistence
#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, AuthError>;

    /// Resolve a username-or-email identifier
    async fn find_by_login(&self, identifier: &LoginIdentifier)
        -> Result<Option<Account>, AuthError>;

    async fn username_exists(&self, username: &str) -> Result<bool, AuthError>;

    async fn email_exists(&self, email: &str) -> Result<bool, AuthError>;

    /// Insert a new account; uniqueness violations surface as
    /// `UsernameConflict` or `EmailConflict`
    async fn create(&self, account: &Account) -> Result<(), AuthError>;

    /// Insert or replace an account by id
    async fn save(&self, account: &Account) -> Result<(), AuthError>;

    /// Atomically add one to the failure counter, setting the lockout
    /// expiry when the new count reaches the policy threshold
    async fn record_failed_login(
        &self,
        id: Uuid,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<Account, AuthError>;

    /// Reset the failure counter, clear any lockout, stamp the last login
    async fn record_successful_login(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Account, AuthError>;
}

/// Role, permission, and assignment lookups
#[async_trait]
pub trait RoleRepository: Send + Sync {
    /// Every non-deleted role flagged as default
    async fn find_default_roles(&self) -> Result<Vec<Role>, AuthError>;

    /// Idempotent: an existing (account, role) pair is left untouched
    async fn assign_role(&self, account_id: Uuid, role_id: Uuid) -> Result<(), AuthError>;

    /// Roles held by the account with the permissions each grants
    async fn memberships_for(&self, account_id: Uuid) -> Result<Vec<RoleMembership>, AuthError>;
}

/// Refresh token persistence
#[async_trait]
pub trait RefreshTokenRepository: Send + Sync {
    async fn find_by_token(&self, token: &str) -> Result<Option<RefreshTokenRecord>, AuthError>;

    /// Tokens that are neither revoked nor expired at `now`
    async fn find_active_by_account(
        &self,
        account_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshTokenRecord>, AuthError>;

    async fn insert(&self, record: &RefreshTokenRecord) -> Result<(), AuthError>;

    /// Revoke the token only while it is still unrevoked
    ///
    /// Returns `false` when the token is unknown or was already revoked, in
    /// which case nothing is written.
    async fn revoke(
        &self,
        token: &str,
        now: DateTime<Utc>,
        revoked_by_ip: Option<&str>,
    ) -> Result<bool, AuthError>;

    /// Persist a rotation: revoke the predecessor, link it to the successor,
    /// and insert the successor as one unit
    ///
    /// Returns `false` without writing anything when the predecessor is no
    /// longer unrevoked, so a token can be rotated at most once.
    async fn commit_rotation(
        &self,
        revoked: &RefreshTokenRecord,
        successor: &RefreshTokenRecord,
    ) -> Result<bool, AuthError>;

    /// Revoke every active token owned by the account; returns the count
    async fn revoke_all_for_account(
        &self,
        account_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, AuthError>;

    /// Tokens whose expiry is before `cutoff`
    async fn find_expired(&self, cutoff: DateTime<Utc>)
        -> Result<Vec<RefreshTokenRecord>, AuthError>;

    /// Hard-delete tokens whose expiry is before `cutoff`
    async fn delete_expired(&self, cutoff: DateTime<Utc>) -> Result<u64, AuthError>;
}

/// The three store handles the core works against
#[derive(Clone)]
pub struct Repositories {
    pub accounts: Arc<dyn AccountRepository>,
    pub roles: Arc<dyn RoleRepository>,
    pub refresh_tokens: Arc<dyn RefreshTokenRepository>,
}

impl Repositories {
    /// Use one store for every concern
    pub fn from_store<S>(store: Arc<S>) -> Self
    where
        S: AccountRepository + RoleRepository + RefreshTokenRepository + 'static,
    {
        Self {
            accounts: store.clone(),
            roles: store.clone(),
            refresh_tokens: store,
        }
    }
}
