// Runtime configuration for token issuance, lockout, and maintenance
// Values are read once at startup and passed into components as immutable structs

use crate::auth::error::AuthError;
use chrono::Duration;
use std::str::FromStr;

/// Default issuer written into and expected from access tokens
pub const DEFAULT_ISSUER: &str = "EnterpriseAuth";
/// Default audience written into and expected from access tokens
pub const DEFAULT_AUDIENCE: &str = "EnterpriseAuthUsers";

/// Signing and validation settings for access tokens
#[derive(Debug, Clone)]
pub struct JwtSettings {
    /// HMAC-SHA256 signing secret
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub access_token_expiration_minutes: i64,
    pub refresh_token_expiration_days: i64,
    /// Tolerance applied to lifetime checks
    pub clock_skew_minutes: i64,
    pub validate_issuer: bool,
    pub validate_audience: bool,
    pub validate_lifetime: bool,
    pub validate_issuer_signing_key: bool,
}

impl Default for JwtSettings {
    fn default() -> Self {
        Self {
            secret: String::new(),
            issuer: DEFAULT_ISSUER.to_string(),
            audience: DEFAULT_AUDIENCE.to_string(),
            access_token_expiration_minutes: 15,
            refresh_token_expiration_days: 7,
            clock_skew_minutes: 5,
            validate_issuer: true,
            validate_audience: true,
            validate_lifetime: true,
            validate_issuer_signing_key: true,
        }
    }
}

impl JwtSettings {
    /// Settings with the given secret and every other value at its default
    pub fn with_secret(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            ..Self::default()
        }
    }

    /// Reject settings the token issuer cannot work with
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.secret.trim().is_empty() {
            return Err(AuthError::ConfigError("JWT secret must be set".to_string()));
        }
        if self.access_token_expiration_minutes <= 0 {
            return Err(AuthError::ConfigError(
                "Access token lifetime must be positive".to_string(),
            ));
        }
        if self.refresh_token_expiration_days <= 0 {
            return Err(AuthError::ConfigError(
                "Refresh token lifetime must be positive".to_string(),
            ));
        }
        if self.clock_skew_minutes < 0 {
            return Err(AuthError::ConfigError(
                "Clock skew cannot be negative".to_string(),
            ));
        }
        Ok(())
    }

    pub fn access_token_lifetime(&self) -> Duration {
        Duration::minutes(self.access_token_expiration_minutes)
    }

    pub fn refresh_token_lifetime(&self) -> Duration {
        Duration::days(self.refresh_token_expiration_days)
    }

    pub fn clock_skew(&self) -> Duration {
        Duration::minutes(self.clock_skew_minutes)
    }
}

/// Brute-force protection thresholds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockoutPolicy {
    /// Consecutive failures that trigger a lockout
    pub max_failed_attempts: i32,
    pub lockout_duration: Duration,
}

impl Default for LockoutPolicy {
    fn default() -> Self {
        Self {
            max_failed_attempts: 5,
            lockout_duration: Duration::minutes(30),
        }
    }
}

/// Complete authentication configuration
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub jwt: JwtSettings,
    pub lockout: LockoutPolicy,
    /// Revoke the successor chain when a rotated refresh token is replayed
    pub revoke_token_chain_on_reuse: bool,
    /// How long expired refresh tokens are kept before the sweep deletes them
    pub refresh_token_retention_days: i64,
    pub sweep_interval_minutes: u64,
}

impl AuthConfig {
    /// Configuration with the given JWT settings and defaults elsewhere
    pub fn new(jwt: JwtSettings) -> Self {
        Self {
            jwt,
            lockout: LockoutPolicy::default(),
            revoke_token_chain_on_reuse: false,
            refresh_token_retention_days: 30,
            sweep_interval_minutes: 60,
        }
    }

    /// Load configuration from process environment variables
    ///
    /// Fails when `JWT_SECRET` is missing or empty, or when a numeric
    /// variable cannot be parsed.
    pub fn from_env() -> Result<Self, AuthError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AuthError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = JwtSettings::default();

        let jwt = JwtSettings {
            secret: lookup("JWT_SECRET").unwrap_or_default(),
            issuer: lookup("JWT_ISSUER").unwrap_or(defaults.issuer),
            audience: lookup("JWT_AUDIENCE").unwrap_or(defaults.audience),
            access_token_expiration_minutes: parse_or(
                &lookup,
                "JWT_ACCESS_TOKEN_EXPIRATION_MINUTES",
                defaults.access_token_expiration_minutes,
            )?,
            refresh_token_expiration_days: parse_or(
                &lookup,
                "JWT_REFRESH_TOKEN_EXPIRATION_DAYS",
                defaults.refresh_token_expiration_days,
            )?,
            clock_skew_minutes: parse_or(
                &lookup,
                "JWT_CLOCK_SKEW_MINUTES",
                defaults.clock_skew_minutes,
            )?,
            validate_issuer: flag_or(&lookup, "JWT_VALIDATE_ISSUER", true)?,
            validate_audience: flag_or(&lookup, "JWT_VALIDATE_AUDIENCE", true)?,
            validate_lifetime: flag_or(&lookup, "JWT_VALIDATE_LIFETIME", true)?,
            validate_issuer_signing_key: flag_or(
                &lookup,
                "JWT_VALIDATE_ISSUER_SIGNING_KEY",
                true,
            )?,
        };
        jwt.validate()?;

        let lockout_defaults = LockoutPolicy::default();
        let max_failed_attempts = parse_or(
            &lookup,
            "AUTH_MAX_FAILED_ATTEMPTS",
            lockout_defaults.max_failed_attempts,
        )?;
        if max_failed_attempts <= 0 {
            return Err(AuthError::ConfigError(
                "AUTH_MAX_FAILED_ATTEMPTS must be positive".to_string(),
            ));
        }
        let lockout_minutes: i64 = parse_or(
            &lookup,
            "AUTH_LOCKOUT_MINUTES",
            lockout_defaults.lockout_duration.num_minutes(),
        )?;

        let mut config = Self::new(jwt);
        config.lockout = LockoutPolicy {
            max_failed_attempts,
            lockout_duration: Duration::minutes(lockout_minutes),
        };
        config.revoke_token_chain_on_reuse =
            flag_or(&lookup, "AUTH_REVOKE_TOKEN_CHAIN_ON_REUSE", false)?;
        config.refresh_token_retention_days = parse_or(
            &lookup,
            "REFRESH_TOKEN_RETENTION_DAYS",
            config.refresh_token_retention_days,
        )?;
        config.sweep_interval_minutes = parse_or(
            &lookup,
            "TOKEN_SWEEP_INTERVAL_MINUTES",
            config.sweep_interval_minutes,
        )?;

        Ok(config)
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, AuthError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AuthError::ConfigError(format!("{} has an invalid value: {}", key, raw))),
        None => Ok(default),
    }
}

fn flag_or<F>(lookup: &F, key: &str, default: bool) -> Result<bool, AuthError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(raw) => match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(AuthError::ConfigError(format!(
                "{} must be a boolean, got: {}",
                key, raw
            ))),
        },
        None => Ok(default),
    }
}
