// Scheduled cleanup of refresh tokens past their retention window

use chrono::Duration;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::auth::{error::AuthError, repository::RefreshTokenRepository};
use crate::clock::Clock;
use crate::config::AuthConfig;

/// Hard-deletes refresh tokens that expired more than `retention` ago
pub struct TokenSweeper {
    tokens: Arc<dyn RefreshTokenRepository>,
    clock: Arc<dyn Clock>,
    retention: Duration,
    interval: std::time::Duration,
}

impl TokenSweeper {
    pub fn new(
        tokens: Arc<dyn RefreshTokenRepository>,
        clock: Arc<dyn Clock>,
        retention: Duration,
        interval: std::time::Duration,
    ) -> Self {
        Self {
            tokens,
            clock,
            retention,
            interval,
        }
    }

    pub fn from_config(
        tokens: Arc<dyn RefreshTokenRepository>,
        clock: Arc<dyn Clock>,
        config: &AuthConfig,
    ) -> Self {
        Self::new(
            tokens,
            clock,
            Duration::days(config.refresh_token_retention_days),
            std::time::Duration::from_secs(config.sweep_interval_minutes.max(1) * 60),
        )
    }

    /// Run one sweep; returns the number of deleted tokens
    pub async fn sweep_once(&self) -> Result<u64, AuthError> {
        let cutoff = self.clock.now() - self.retention;

        let expired = self.tokens.find_expired(cutoff).await?;
        if expired.is_empty() {
            debug!("Token sweep found nothing older than {}", cutoff);
            return Ok(0);
        }

        let deleted = self.tokens.delete_expired(cutoff).await?;
        info!("Token sweep deleted {} refresh tokens expired before {}", deleted, cutoff);
        Ok(deleted)
    }

    /// Sweep on a fixed interval until the runtime shuts down
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            loop {
                ticker.tick().await;
                if let Err(e) = self.sweep_once().await {
                    error!("Token sweep failed: {}", e);
                }
            }
        })
    }
}
