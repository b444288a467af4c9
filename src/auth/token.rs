// JWT access token issuance/validation and opaque refresh token generation

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::{rngs::OsRng, RngCore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::{
    claims::ResolvedClaims,
    error::AuthError,
    models::{Account, PendingRefreshToken},
};
use crate::clock::Clock;
use crate::config::JwtSettings;

/// Random bytes behind every refresh token (512 bits)
pub const REFRESH_TOKEN_BYTES: usize = 64;

/// JWT claims structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: Uuid, // account id
    pub username: String,
    pub email: String,
    pub given_name: String,
    pub family_name: String,
    pub is_active: bool,
    pub is_email_confirmed: bool,
    #[serde(default)]
    pub role: Vec<String>,
    #[serde(default)]
    pub permission: Vec<String>,
    pub iss: String,
    pub aud: String,
    pub iat: i64, // issued at timestamp
    pub exp: i64, // expiration timestamp
}

impl AccessClaims {
    pub fn has_role(&self, role: &str) -> bool {
        self.role.iter().any(|r| r == role)
    }

    pub fn has_permission(&self, permission: &str) -> bool {
        self.permission.iter().any(|p| p == permission)
    }
}

#[derive(Deserialize)]
struct ExpiryOnly {
    exp: i64,
}

/// Token service for JWT operations
///
/// Holds its own copy of the settings; nothing here reads process state.
#[derive(Clone)]
pub struct TokenService {
    settings: JwtSettings,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    /// Create a new TokenService; fails when the settings are unusable
    pub fn new(settings: JwtSettings, clock: Arc<dyn Clock>) -> Result<Self, AuthError> {
        settings.validate()?;
        Ok(Self {
            encoding_key: EncodingKey::from_secret(settings.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(settings.secret.as_bytes()),
            settings,
            clock,
        })
    }

    pub fn settings(&self) -> &JwtSettings {
        &self.settings
    }

    /// Sign an access token for the account and its resolved claims
    pub fn issue_access_token(
        &self,
        account: &Account,
        claims: &ResolvedClaims,
    ) -> Result<String, AuthError> {
        let now = self.clock.now();
        let exp = now + self.settings.access_token_lifetime();

        let claims = AccessClaims {
            sub: account.id,
            username: account.username.clone(),
            email: account.email.clone(),
            given_name: account.first_name.clone(),
            family_name: account.last_name.clone(),
            is_active: account.is_active,
            is_email_confirmed: account.is_email_confirmed,
            role: claims.role_names(),
            permission: claims.permission_names(),
            iss: self.settings.issuer.clone(),
            aud: self.settings.audience.clone(),
            iat: now.timestamp(),
            exp: exp.timestamp(),
        };

        encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key)
            .map_err(|e| AuthError::TokenGenerationError(e.to_string()))
    }

    /// Mint an unsaved refresh token from the OS CSPRNG
    pub fn issue_refresh_token(&self, origin_ip: &str) -> PendingRefreshToken {
        let mut bytes = [0u8; REFRESH_TOKEN_BYTES];
        OsRng.fill_bytes(&mut bytes);

        let now = self.clock.now();
        PendingRefreshToken {
            token: STANDARD.encode(bytes),
            expires_at: now + self.settings.refresh_token_lifetime(),
            created_at: now,
            created_by_ip: origin_ip.to_string(),
        }
    }

    /// Read the `exp` claim without checking the signature
    ///
    /// Only for response metadata; never base a trust decision on it.
    pub fn decode_expiry(&self, token: &str) -> Result<DateTime<Utc>, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        let data = decode::<ExpiryOnly>(token, &DecodingKey::from_secret(&[]), &validation)
            .map_err(|_| AuthError::InvalidToken)?;

        DateTime::<Utc>::from_timestamp(data.claims.exp, 0).ok_or(AuthError::InvalidToken)
    }

    /// Validate an access token and return its claims
    pub fn validate_access_token(&self, token: &str) -> Result<AccessClaims, AuthError> {
        let leeway = self.settings.clock_skew().num_seconds();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = leeway.max(0) as u64;
        // Lifetime is checked below against the injected clock
        validation.validate_exp = false;
        if self.settings.validate_issuer {
            validation.set_issuer(&[&self.settings.issuer]);
        }
        if self.settings.validate_audience {
            validation.set_audience(&[&self.settings.audience]);
        } else {
            validation.validate_aud = false;
        }
        if !self.settings.validate_issuer_signing_key {
            validation.insecure_disable_signature_validation();
        }

        let claims = decode::<AccessClaims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|_| AuthError::InvalidToken)?;

        if self.settings.validate_lifetime {
            let now = self.clock.now().timestamp();
            if claims.exp < now - leeway {
                return Err(AuthError::ExpiredToken);
            }
            if claims.iat > now + leeway {
                return Err(AuthError::InvalidToken);
            }
        }

        Ok(claims)
    }

    /// Full verification collapsed to a boolean; never errors
    pub fn verify(&self, token: &str) -> bool {
        self.validate_access_token(token).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;
    use std::collections::HashSet;

    const SECRET: &str = "test_secret_key_for_testing_purposes";

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 1, 9, 0, 0).unwrap()
    }

    // Helper to create a test token service on a frozen clock
    fn test_token_service(settings: JwtSettings) -> (TokenService, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(start()));
        let service = TokenService::new(settings, clock.clone()).unwrap();
        (service, clock)
    }

    fn test_account() -> Account {
        Account {
            id: Uuid::new_v4(),
            username: "alice".to_string(),
            email: "alice@x.com".to_string(),
            password_hash: String::new(),
            first_name: "Alice".to_string(),
            last_name: "Liddell".to_string(),
            phone_number: None,
            is_active: true,
            is_email_confirmed: false,
            last_login_at: None,
            failed_login_attempts: 0,
            locked_out_until: None,
            created_at: start(),
            updated_at: start(),
        }
    }

    fn test_claims() -> ResolvedClaims {
        let mut claims = ResolvedClaims::default();
        claims.roles.insert("User".to_string());
        claims.roles.insert("Auditor".to_string());
        claims.permissions.insert("users.read".to_string());
        claims
    }

    #[test]
    fn test_empty_secret_is_rejected() {
        let clock = Arc::new(ManualClock::new(start()));
        let result = TokenService::new(JwtSettings::default(), clock);
        assert!(matches!(result, Err(AuthError::ConfigError(_))));
    }

    #[test]
    fn test_access_token_expiration_matches_configuration() {
        let (service, _) = test_token_service(JwtSettings::with_secret(SECRET));
        let token = service.issue_access_token(&test_account(), &test_claims()).unwrap();
        let claims = service.validate_access_token(&token).unwrap();

        assert_eq!(claims.iat, start().timestamp());
        assert_eq!(claims.exp - claims.iat, 15 * 60);
        assert_eq!(service.decode_expiry(&token).unwrap(), start() + Duration::minutes(15));
    }

    #[test]
    fn test_token_claims_contain_identity_and_authorization() {
        let (service, _) = test_token_service(JwtSettings::with_secret(SECRET));
        let account = test_account();
        let token = service.issue_access_token(&account, &test_claims()).unwrap();
        let claims = service.validate_access_token(&token).unwrap();

        assert_eq!(claims.sub, account.id);
        assert_eq!(claims.username, "alice");
        assert_eq!(claims.email, "alice@x.com");
        assert!(claims.is_active);
        assert!(!claims.is_email_confirmed);
        assert_eq!(claims.role, vec!["Auditor", "User"]);
        assert_eq!(claims.permission, vec!["users.read"]);
        assert_eq!(claims.iss, crate::config::DEFAULT_ISSUER);
        assert_eq!(claims.aud, crate::config::DEFAULT_AUDIENCE);
        assert!(claims.has_role("User"));
        assert!(claims.has_permission("users.read"));
    }

    #[test]
    fn test_issuance_is_deterministic_for_a_fixed_clock() {
        let (service, _) = test_token_service(JwtSettings::with_secret(SECRET));
        let account = test_account();
        let first = service.issue_access_token(&account, &test_claims()).unwrap();
        let second = service.issue_access_token(&account, &test_claims()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_malformed_tokens_are_rejected() {
        let (service, _) = test_token_service(JwtSettings::with_secret(SECRET));

        assert!(!service.verify(""));
        assert!(!service.verify("not.a.token"));
        assert!(!service.verify("invalid_token_format"));
        assert!(!service.verify("eyJhbGciOiJIUzI1NiIsInR5cCI6IkpXVCJ9.invalid.signature"));
        assert!(service.decode_expiry("invalid_token_format").is_err());
    }

    #[test]
    fn test_token_signature_verification() {
        let (service1, _) = test_token_service(JwtSettings::with_secret("secret1"));
        let (service2, _) = test_token_service(JwtSettings::with_secret("secret2"));

        let token = service1.issue_access_token(&test_account(), &test_claims()).unwrap();

        assert!(service1.verify(&token));
        assert!(!service2.verify(&token));

        // Expiry metadata is still readable without the key
        assert_eq!(
            service2.decode_expiry(&token).unwrap(),
            start() + Duration::minutes(15)
        );
    }

    #[test]
    fn test_signature_check_can_be_disabled() {
        let (issuer, _) = test_token_service(JwtSettings::with_secret("secret1"));
        let mut relaxed = JwtSettings::with_secret("secret2");
        relaxed.validate_issuer_signing_key = false;
        let (verifier, _) = test_token_service(relaxed);

        let token = issuer.issue_access_token(&test_account(), &test_claims()).unwrap();
        assert!(verifier.verify(&token));
    }

    #[test]
    fn test_issuer_and_audience_are_enforced_when_enabled() {
        let (issuer, _) = test_token_service(JwtSettings::with_secret(SECRET));
        let token = issuer.issue_access_token(&test_account(), &test_claims()).unwrap();

        let mut other_issuer = JwtSettings::with_secret(SECRET);
        other_issuer.issuer = "someone-else".to_string();
        let (verifier, _) = test_token_service(other_issuer.clone());
        assert!(!verifier.verify(&token));

        other_issuer.validate_issuer = false;
        let (verifier, _) = test_token_service(other_issuer);
        assert!(verifier.verify(&token));

        let mut other_audience = JwtSettings::with_secret(SECRET);
        other_audience.audience = "another-app".to_string();
        let (verifier, _) = test_token_service(other_audience.clone());
        assert!(!verifier.verify(&token));

        other_audience.validate_audience = false;
        let (verifier, _) = test_token_service(other_audience);
        assert!(verifier.verify(&token));
    }

    #[test]
    fn test_expired_tokens_are_rejected_after_clock_skew() {
        let (service, clock) = test_token_service(JwtSettings::with_secret(SECRET));
        let token = service.issue_access_token(&test_account(), &test_claims()).unwrap();

        // Past expiry but inside the 5 minute tolerance
        clock.advance(Duration::minutes(18));
        assert!(service.verify(&token));

        clock.advance(Duration::minutes(3));
        assert!(matches!(
            service.validate_access_token(&token),
            Err(AuthError::ExpiredToken)
        ));
    }

    #[test]
    fn test_lifetime_check_can_be_disabled() {
        let mut settings = JwtSettings::with_secret(SECRET);
        settings.validate_lifetime = false;
        let (service, clock) = test_token_service(settings);
        let token = service.issue_access_token(&test_account(), &test_claims()).unwrap();

        clock.advance(Duration::days(2));
        assert!(service.verify(&token));
    }

    #[test]
    fn test_refresh_token_shape_and_lifetime() {
        let (service, _) = test_token_service(JwtSettings::with_secret(SECRET));
        let pending = service.issue_refresh_token("203.0.113.7");

        let decoded = STANDARD.decode(&pending.token).unwrap();
        assert_eq!(decoded.len(), REFRESH_TOKEN_BYTES);
        assert_eq!(pending.created_at, start());
        assert_eq!(pending.expires_at, start() + Duration::days(7));
        assert_eq!(pending.created_by_ip, "203.0.113.7");
    }

    #[test]
    fn test_refresh_tokens_are_unique() {
        let (service, _) = test_token_service(JwtSettings::with_secret(SECRET));
        let tokens: HashSet<String> = (0..200)
            .map(|_| service.issue_refresh_token("127.0.0.1").token)
            .collect();
        assert_eq!(tokens.len(), 200);
    }

    proptest! {
        #[test]
        fn prop_decode_expiry_round_trips_issuance(
            minutes in 1i64..10_000,
            offset_secs in 0i64..1_000_000
        ) {
            let mut settings = JwtSettings::with_secret(SECRET);
            settings.access_token_expiration_minutes = minutes;
            let clock = Arc::new(ManualClock::new(start() + Duration::seconds(offset_secs)));
            let service = TokenService::new(settings, clock.clone()).unwrap();

            let token = service.issue_access_token(&test_account(), &test_claims())?;
            let expiry = service.decode_expiry(&token)?;
            prop_assert_eq!(expiry, clock.now() + Duration::minutes(minutes));
        }

        #[test]
        fn prop_malformed_tokens_rejected(
            malformed in "[a-zA-Z0-9]{10,50}"
        ) {
            let (service, _) = test_token_service(JwtSettings::with_secret(SECRET));
            prop_assert!(!service.verify(&malformed));
            prop_assert!(service.decode_expiry(&malformed).is_err());
        }
    }
}
