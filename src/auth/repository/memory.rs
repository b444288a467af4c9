// In-memory record store
// All tables sit behind one RwLock, so every trait method is atomic

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::auth::{
    catalog::{validate_role_catalog, RoleCatalog},
    error::AuthError,
    models::{Account, LoginIdentifier, Permission, RefreshTokenRecord, Role, RoleMembership},
    repository::{AccountRepository, RefreshTokenRepository, RoleRepository},
};
use crate::config::LockoutPolicy;

#[derive(Debug, Default)]
struct StoreState {
    accounts: HashMap<Uuid, Account>,
    roles: HashMap<Uuid, Role>,
    permissions: HashMap<Uuid, Permission>,
    /// (account_id, role_id)
    role_assignments: BTreeSet<(Uuid, Uuid)>,
    /// (role_id, permission_id)
    role_permissions: BTreeSet<(Uuid, Uuid)>,
    refresh_tokens: HashMap<String, RefreshTokenRecord>,
}

/// Record store kept entirely in process memory
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: RwLock<StoreState>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-loaded with a validated role catalog
    pub async fn with_catalog(catalog: &RoleCatalog) -> Result<Self, AuthError> {
        let store = Self::new();
        store.seed_catalog(catalog).await?;
        Ok(store)
    }

    /// Load roles, permissions, and grants; rejects catalogs with more
    /// than one default role once merged with what is already stored
    pub async fn seed_catalog(&self, catalog: &RoleCatalog) -> Result<(), AuthError> {
        let mut state = self.state.write().await;

        let mut merged = RoleCatalog {
            roles: state.roles.values().cloned().collect(),
            permissions: state.permissions.values().cloned().collect(),
            grants: Vec::new(),
        };
        merged.roles.extend(catalog.roles.iter().cloned());
        merged.permissions.extend(catalog.permissions.iter().cloned());
        validate_role_catalog(&merged)?;

        for role in &catalog.roles {
            state.roles.insert(role.id, role.clone());
        }
        for permission in &catalog.permissions {
            state.permissions.insert(permission.id, permission.clone());
        }
        for (role_id, permission_id) in &catalog.grants {
            if !state.roles.contains_key(role_id) || !state.permissions.contains_key(permission_id)
            {
                return Err(AuthError::ConfigError(
                    "Grant references an unknown role or permission".to_string(),
                ));
            }
            state.role_permissions.insert((*role_id, *permission_id));
        }
        Ok(())
    }

    /// Role by name, including soft-deleted ones
    pub async fn role_by_name(&self, name: &str) -> Option<Role> {
        let state = self.state.read().await;
        state.roles.values().find(|r| r.name == name).cloned()
    }

    /// Replace a stored role (used to soft-delete or flag roles)
    pub async fn update_role(&self, role: Role) {
        let mut state = self.state.write().await;
        state.roles.insert(role.id, role);
    }

    /// Every refresh token owned by the account, active or not
    pub async fn refresh_tokens_for(&self, account_id: Uuid) -> Vec<RefreshTokenRecord> {
        let state = self.state.read().await;
        let mut tokens: Vec<RefreshTokenRecord> = state
            .refresh_tokens
            .values()
            .filter(|t| t.account_id == account_id)
            .cloned()
            .collect();
        tokens.sort_by_key(|t| t.created_at);
        tokens
    }
}

#[async_trait]
impl AccountRepository for InMemoryStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, AuthError> {
        Ok(self.state.read().await.accounts.get(&id).cloned())
    }

    async fn find_by_login(
        &self,
        identifier: &LoginIdentifier,
    ) -> Result<Option<Account>, AuthError> {
        let state = self.state.read().await;
        Ok(state
            .accounts
            .values()
            .find(|a| identifier.matches(a))
            .cloned())
    }

    async fn username_exists(&self, username: &str) -> Result<bool, AuthError> {
        let state = self.state.read().await;
        Ok(state.accounts.values().any(|a| a.username == username))
    }

    async fn email_exists(&self, email: &str) -> Result<bool, AuthError> {
        let state = self.state.read().await;
        Ok(state.accounts.values().any(|a| a.email == email))
    }

    async fn create(&self, account: &Account) -> Result<(), AuthError> {
        let mut state = self.state.write().await;
        if state.accounts.values().any(|a| a.username == account.username) {
            return Err(AuthError::UsernameConflict);
        }
        if state.accounts.values().any(|a| a.email == account.email) {
            return Err(AuthError::EmailConflict);
        }
        state.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn save(&self, account: &Account) -> Result<(), AuthError> {
        let mut state = self.state.write().await;
        state.accounts.insert(account.id, account.clone());
        Ok(())
    }

    async fn record_failed_login(
        &self,
        id: Uuid,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<Account, AuthError> {
        let mut state = self.state.write().await;
        let account = state.accounts.get_mut(&id).ok_or(AuthError::NotFound)?;

        account.failed_login_attempts += 1;
        if account.failed_login_attempts >= policy.max_failed_attempts {
            account.locked_out_until = Some(now + policy.lockout_duration);
        }
        account.updated_at = now;
        Ok(account.clone())
    }

    async fn record_successful_login(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Account, AuthError> {
        let mut state = self.state.write().await;
        let account = state.accounts.get_mut(&id).ok_or(AuthError::NotFound)?;

        account.unlock();
        account.last_login_at = Some(now);
        account.updated_at = now;
        Ok(account.clone())
    }
}

#[async_trait]
impl RoleRepository for InMemoryStore {
    async fn find_default_roles(&self) -> Result<Vec<Role>, AuthError> {
        let state = self.state.read().await;
        let mut roles: Vec<Role> = state
            .roles
            .values()
            .filter(|r| r.is_default && !r.is_deleted)
            .cloned()
            .collect();
        roles.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(roles)
    }

    async fn assign_role(&self, account_id: Uuid, role_id: Uuid) -> Result<(), AuthError> {
        let mut state = self.state.write().await;
        if !state.accounts.contains_key(&account_id) {
            return Err(AuthError::NotFound);
        }
        if !state.roles.contains_key(&role_id) {
            return Err(AuthError::ConfigError(format!("Unknown role {}", role_id)));
        }
        state.role_assignments.insert((account_id, role_id));
        Ok(())
    }

    async fn memberships_for(&self, account_id: Uuid) -> Result<Vec<RoleMembership>, AuthError> {
        let state = self.state.read().await;

        let memberships = state
            .role_assignments
            .iter()
            .filter(|(owner, _)| *owner == account_id)
            .filter_map(|(_, role_id)| state.roles.get(role_id))
            .map(|role| RoleMembership {
                role: role.clone(),
                permissions: state
                    .role_permissions
                    .iter()
                    .filter(|(granted_to, _)| *granted_to == role.id)
                    .filter_map(|(_, permission_id)| state.permissions.get(permission_id))
                    .cloned()
                    .collect(),
            })
            .collect();

        Ok(memberships)
    }
}

#[async_trait]
impl RefreshTokenRepository for InMemoryStore {
    async fn find_by_token(&self, token: &str) -> Result<Option<RefreshTokenRecord>, AuthError> {
        Ok(self.state.read().await.refresh_tokens.get(token).cloned())
    }

    async fn find_active_by_account(
        &self,
        account_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshTokenRecord>, AuthError> {
        let state = self.state.read().await;
        Ok(state
            .refresh_tokens
            .values()
            .filter(|t| t.account_id == account_id && t.is_active(now))
            .cloned()
            .collect())
    }

    async fn insert(&self, record: &RefreshTokenRecord) -> Result<(), AuthError> {
        let mut state = self.state.write().await;
        if state.refresh_tokens.contains_key(&record.token) {
            return Err(AuthError::StorageUnavailable(
                "refresh token value already stored".to_string(),
            ));
        }
        state.refresh_tokens.insert(record.token.clone(), record.clone());
        Ok(())
    }

    async fn revoke(
        &self,
        token: &str,
        now: DateTime<Utc>,
        revoked_by_ip: Option<&str>,
    ) -> Result<bool, AuthError> {
        let mut state = self.state.write().await;
        match state.refresh_tokens.get_mut(token) {
            Some(stored) if !stored.is_revoked => {
                stored.revoke(now, revoked_by_ip, None);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn commit_rotation(
        &self,
        revoked: &RefreshTokenRecord,
        successor: &RefreshTokenRecord,
    ) -> Result<bool, AuthError> {
        let mut state = self.state.write().await;
        if state.refresh_tokens.contains_key(&successor.token) {
            return Err(AuthError::StorageUnavailable(
                "refresh token value already stored".to_string(),
            ));
        }
        match state.refresh_tokens.get(&revoked.token) {
            Some(stored) if !stored.is_revoked => {}
            _ => return Ok(false),
        }
        state
            .refresh_tokens
            .insert(revoked.token.clone(), revoked.clone());
        state
            .refresh_tokens
            .insert(successor.token.clone(), successor.clone());
        Ok(true)
    }

    async fn revoke_all_for_account(
        &self,
        account_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, AuthError> {
        let mut state = self.state.write().await;
        let mut revoked = 0;
        for token in state
            .refresh_tokens
            .values_mut()
            .filter(|t| t.account_id == account_id && t.is_active(now))
        {
            token.revoke(now, None, None);
            revoked += 1;
        }
        Ok(revoked)
    }

    async fn find_expired(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<RefreshTokenRecord>, AuthError> {
        let state = self.state.read().await;
        Ok(state
            .refresh_tokens
            .values()
            .filter(|t| t.expires_at < cutoff)
            .cloned()
            .collect())
    }

    async fn delete_expired(&self, cutoff: DateTime<Utc>) -> Result<u64, AuthError> {
        let mut state = self.state.write().await;
        let before = state.refresh_tokens.len();
        state.refresh_tokens.retain(|_, t| t.expires_at >= cutoff);
        Ok((before - state.refresh_tokens.len()) as u64)
    }
}
