// Credential verification with brute-force lockout

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::auth::{
    error::AuthError,
    models::{Account, LoginIdentifier},
    password::PasswordHashing,
    repository::AccountRepository,
};
use crate::clock::Clock;
use crate::config::LockoutPolicy;

/// Verifies presented secrets and owns the failure counter
///
/// The only component that mutates an account's lockout state.
#[derive(Clone)]
pub struct CredentialVerifier {
    accounts: Arc<dyn AccountRepository>,
    passwords: Arc<dyn PasswordHashing>,
    clock: Arc<dyn Clock>,
    policy: LockoutPolicy,
}

impl CredentialVerifier {
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        passwords: Arc<dyn PasswordHashing>,
        clock: Arc<dyn Clock>,
        policy: LockoutPolicy,
    ) -> Self {
        Self {
            accounts,
            passwords,
            clock,
            policy,
        }
    }

    /// Check `secret` for the account `identifier` resolves to
    ///
    /// Returns `NotFound` for an unknown identifier; callers must turn it
    /// into `InvalidCredentials`. A locked account is rejected before any
    /// hash comparison. A mismatch is persisted before the error returns.
    pub async fn authenticate(
        &self,
        identifier: &LoginIdentifier,
        secret: &str,
    ) -> Result<Account, AuthError> {
        let account = self
            .accounts
            .find_by_login(identifier)
            .await?
            .ok_or(AuthError::NotFound)?;

        let now = self.clock.now();
        if let Some(until) = account.locked_out_until.filter(|until| *until > now) {
            debug!("Rejected login for locked account {}", account.id);
            return Err(AuthError::LockedOut { until });
        }

        if !account.is_active {
            debug!("Rejected login for inactive account {}", account.id);
            return Err(AuthError::InvalidCredentials);
        }

        if !self
            .passwords
            .verify_password(secret, &account.password_hash)?
        {
            let updated = self
                .accounts
                .record_failed_login(account.id, &self.policy, now)
                .await?;

            if updated.failed_login_attempts >= self.policy.max_failed_attempts {
                if let Some(until) = updated.locked_out_until {
                    warn!(
                        "Account {} locked until {} after {} failed attempts",
                        updated.id, until, updated.failed_login_attempts
                    );
                    return Err(AuthError::LockedOut { until });
                }
            }

            debug!(
                "Failed login for account {} ({} of {})",
                updated.id, updated.failed_login_attempts, self.policy.max_failed_attempts
            );
            return Err(AuthError::InvalidCredentials);
        }

        let account = self.accounts.record_successful_login(account.id, now).await?;
        info!("Account {} authenticated", account.id);
        Ok(account)
    }
}
