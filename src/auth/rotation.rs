// Refresh token rotation and revocation
// Each rotation revokes the presented token and links it to a freshly issued successor

use sha2::{Digest, Sha256};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auth::{
    claims::{ClaimsAssembler, ResolvedClaims},
    error::AuthError,
    models::{Account, RefreshTokenRecord},
    repository::{AccountRepository, RefreshTokenRepository},
    token::TokenService,
};
use crate::clock::Clock;

/// Short, non-reversible identifier for a refresh token in log lines
pub(crate) fn token_fingerprint(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    digest.iter().take(6).map(|b| format!("{:02x}", b)).collect()
}

/// Result of a successful rotation
#[derive(Debug, Clone)]
pub struct RotatedSession {
    pub access_token: String,
    pub refresh_token: RefreshTokenRecord,
    pub account: Account,
    pub claims: ResolvedClaims,
}

/// Refresh token lifecycle: rotate, revoke, revoke-all
#[derive(Clone)]
pub struct RefreshRotation {
    accounts: Arc<dyn AccountRepository>,
    tokens: Arc<dyn RefreshTokenRepository>,
    claims: ClaimsAssembler,
    issuer: TokenService,
    clock: Arc<dyn Clock>,
    revoke_chain_on_reuse: bool,
}

impl RefreshRotation {
    pub fn new(
        accounts: Arc<dyn AccountRepository>,
        tokens: Arc<dyn RefreshTokenRepository>,
        claims: ClaimsAssembler,
        issuer: TokenService,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            accounts,
            tokens,
            claims,
            issuer,
            clock,
            revoke_chain_on_reuse: false,
        }
    }

    /// Revoke every descendant of a token when it is replayed after rotation
    pub fn with_chain_revocation(mut self, enabled: bool) -> Self {
        self.revoke_chain_on_reuse = enabled;
        self
    }

    /// Exchange an active refresh token for a new access/refresh pair
    ///
    /// Unknown, expired, and revoked tokens all fail with
    /// `InvalidRefreshToken`, as does losing a race with a concurrent rotation
    /// of the same token. A store failure while committing surfaces as
    /// `PartialRotationFailure`; retrying with the same token is safe.
    pub async fn rotate(
        &self,
        presented: &str,
        origin_ip: &str,
    ) -> Result<RotatedSession, AuthError> {
        let (mut record, account) = self.active_token_with_owner(presented, origin_ip).await?;

        let claims = self.claims.claims_for(account.id).await?;
        let access_token = self.issuer.issue_access_token(&account, &claims)?;
        let successor = self
            .issuer
            .issue_refresh_token(origin_ip)
            .owned_by(account.id);

        record.revoke(self.clock.now(), Some(origin_ip), Some(&successor.token));

        let committed = self
            .tokens
            .commit_rotation(&record, &successor)
            .await
            .map_err(|e| {
                error!(
                    "Rotation of refresh token {} failed: {}",
                    token_fingerprint(presented),
                    e
                );
                AuthError::PartialRotationFailure
            })?;

        if !committed {
            warn!(
                "Refresh token {} was rotated or revoked concurrently",
                token_fingerprint(presented)
            );
            return Err(AuthError::InvalidRefreshToken);
        }

        debug!(
            "Rotated refresh token {} -> {} for account {}",
            token_fingerprint(&record.token),
            token_fingerprint(&successor.token),
            account.id
        );

        Ok(RotatedSession {
            access_token,
            refresh_token: successor,
            account,
            claims,
        })
    }

    /// Explicitly revoke one active token; inactive or unknown tokens fail
    pub async fn revoke(&self, presented: &str, origin_ip: &str) -> Result<(), AuthError> {
        let (_, account) = self.active_token_with_owner(presented, origin_ip).await?;

        if !self
            .tokens
            .revoke(presented, self.clock.now(), Some(origin_ip))
            .await?
        {
            return Err(AuthError::InvalidRefreshToken);
        }

        info!(
            "Revoked refresh token {} for account {}",
            token_fingerprint(presented),
            account.id
        );
        Ok(())
    }

    /// Revoke every active token owned by the account
    pub async fn revoke_all_for_account(&self, account_id: Uuid) -> Result<u64, AuthError> {
        let revoked = self
            .tokens
            .revoke_all_for_account(account_id, self.clock.now())
            .await?;
        info!("Revoked {} refresh tokens for account {}", revoked, account_id);
        Ok(revoked)
    }

    /// Steps shared by rotate and revoke: the token must be active and its
    /// owner must exist and be active
    async fn active_token_with_owner(
        &self,
        presented: &str,
        origin_ip: &str,
    ) -> Result<(RefreshTokenRecord, Account), AuthError> {
        let now = self.clock.now();

        let record = match self.tokens.find_by_token(presented).await? {
            Some(record) => record,
            None => {
                debug!("Unknown refresh token {}", token_fingerprint(presented));
                return Err(AuthError::InvalidRefreshToken);
            }
        };

        if !record.is_active(now) {
            if record.is_revoked && record.replaced_by_token.is_some() {
                warn!(
                    "Rotated refresh token {} presented again for account {}",
                    token_fingerprint(presented),
                    record.account_id
                );
                if self.revoke_chain_on_reuse {
                    self.revoke_descendants(&record, origin_ip).await?;
                }
            }
            return Err(AuthError::InvalidRefreshToken);
        }

        let account = self
            .accounts
            .find_by_id(record.account_id)
            .await?
            .filter(|a| a.is_active)
            .ok_or(AuthError::InvalidRefreshToken)?;

        Ok((record, account))
    }

    /// Follow the successor links from `record` and revoke each active token
    async fn revoke_descendants(
        &self,
        record: &RefreshTokenRecord,
        origin_ip: &str,
    ) -> Result<(), AuthError> {
        let now = self.clock.now();
        let mut visited = HashSet::new();
        visited.insert(record.token.clone());
        let mut next = record.replaced_by_token.clone();
        let mut revoked = 0;

        while let Some(token) = next {
            if !visited.insert(token.clone()) {
                break;
            }
            let Some(successor) = self.tokens.find_by_token(&token).await? else {
                break;
            };
            next = successor.replaced_by_token.clone();
            if successor.is_active(now)
                && self.tokens.revoke(&token, now, Some(origin_ip)).await?
            {
                revoked += 1;
            }
        }

        warn!(
            "Revoked {} descendant refresh tokens of {} after reuse",
            revoked,
            token_fingerprint(&record.token)
        );
        Ok(())
    }
}
