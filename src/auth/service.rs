// Authentication service - business logic layer
// The only entry point transport code calls

use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::auth::{
    claims::{ClaimsAssembler, ResolvedClaims},
    error::AuthError,
    lockout::CredentialVerifier,
    models::{Account, AuthResponse, LoginIdentifier, RegisterRequest, UserResponse},
    password::PasswordHashing,
    repository::{AccountRepository, RefreshTokenRepository, Repositories, RoleRepository},
    rotation::RefreshRotation,
    token::TokenService,
};
use crate::clock::Clock;
use crate::config::AuthConfig;

/// Authentication service coordinating all auth operations
pub struct AuthService {
    accounts: Arc<dyn AccountRepository>,
    roles: Arc<dyn RoleRepository>,
    refresh_tokens: Arc<dyn RefreshTokenRepository>,
    passwords: Arc<dyn PasswordHashing>,
    credentials: CredentialVerifier,
    claims: ClaimsAssembler,
    tokens: TokenService,
    rotation: RefreshRotation,
    clock: Arc<dyn Clock>,
}

impl AuthService {
    /// Wire the service from its stores and configuration
    pub fn new(
        repositories: Repositories,
        passwords: Arc<dyn PasswordHashing>,
        clock: Arc<dyn Clock>,
        config: &AuthConfig,
    ) -> Result<Self, AuthError> {
        let tokens = TokenService::new(config.jwt.clone(), clock.clone())?;
        let claims = ClaimsAssembler::new(repositories.roles.clone());
        let credentials = CredentialVerifier::new(
            repositories.accounts.clone(),
            passwords.clone(),
            clock.clone(),
            config.lockout,
        );
        let rotation = RefreshRotation::new(
            repositories.accounts.clone(),
            repositories.refresh_tokens.clone(),
            claims.clone(),
            tokens.clone(),
            clock.clone(),
        )
        .with_chain_revocation(config.revoke_token_chain_on_reuse);

        Ok(Self {
            accounts: repositories.accounts,
            roles: repositories.roles,
            refresh_tokens: repositories.refresh_tokens,
            passwords,
            credentials,
            claims,
            tokens,
            rotation,
            clock,
        })
    }

    pub fn token_service(&self) -> &TokenService {
        &self.tokens
    }

    /// Authenticate and open a refresh-capable session
    ///
    /// Unknown identifiers fail exactly like a wrong secret.
    pub async fn login(
        &self,
        identifier: &str,
        secret: &str,
        origin_ip: &str,
    ) -> Result<AuthResponse, AuthError> {
        let identifier = LoginIdentifier::new(identifier);

        let account = match self.credentials.authenticate(&identifier, secret).await {
            Ok(account) => account,
            Err(AuthError::NotFound) => {
                debug!("Login attempt for unknown identifier");
                return Err(AuthError::InvalidCredentials);
            }
            Err(e) => return Err(e),
        };

        let claims = self.claims.claims_for(account.id).await?;
        let access_token = self.tokens.issue_access_token(&account, &claims)?;
        let refresh_token = self
            .tokens
            .issue_refresh_token(origin_ip)
            .owned_by(account.id);
        self.refresh_tokens.insert(&refresh_token).await?;

        info!("User logged in: {} from {}", account.id, origin_ip);
        self.respond(&account, &claims, access_token, refresh_token.token)
    }

    /// Create an account and return an access token only
    pub async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse, AuthError> {
        if self.accounts.username_exists(&request.username).await? {
            return Err(AuthError::UsernameConflict);
        }
        if self.accounts.email_exists(&request.email).await? {
            return Err(AuthError::EmailConflict);
        }

        let default_roles = self.roles.find_default_roles().await?;
        if default_roles.len() > 1 {
            error!(
                "{} roles are marked default; refusing to guess",
                default_roles.len()
            );
            return Err(AuthError::ConfigError(
                "More than one default role is configured".to_string(),
            ));
        }

        let password_hash = self.passwords.hash_password(&request.password)?;
        let now = self.clock.now();
        let account = Account {
            id: Uuid::new_v4(),
            username: request.username.clone(),
            email: request.email.clone(),
            password_hash,
            first_name: request.first_name.trim().to_string(),
            last_name: request.last_name.trim().to_string(),
            phone_number: request
                .phone_number
                .as_deref()
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(str::to_string),
            is_active: true,
            is_email_confirmed: false,
            last_login_at: None,
            failed_login_attempts: 0,
            locked_out_until: None,
            created_at: now,
            updated_at: now,
        };

        // The store reports conflicts too, covering concurrent duplicate submissions
        self.accounts.create(&account).await?;

        match default_roles.first() {
            Some(role) => self.roles.assign_role(account.id, role.id).await?,
            None => warn!("No default role configured; {} has no roles", account.id),
        }

        let claims = self.claims.claims_for(account.id).await?;
        let access_token = self.tokens.issue_access_token(&account, &claims)?;

        info!("User registered: {} ({})", account.username, account.id);
        self.respond(&account, &claims, access_token, String::new())
    }

    /// Exchange a refresh token for a new pair
    pub async fn refresh_session(
        &self,
        refresh_token: &str,
        origin_ip: &str,
    ) -> Result<AuthResponse, AuthError> {
        let session = self.rotation.rotate(refresh_token, origin_ip).await?;
        self.respond(
            &session.account,
            &session.claims,
            session.access_token,
            session.refresh_token.token,
        )
    }

    /// Revoke a single refresh token held by `account_id`
    ///
    /// A token owned by another account fails exactly like an unknown one.
    pub async fn revoke_token(
        &self,
        account_id: Uuid,
        refresh_token: &str,
        origin_ip: &str,
    ) -> Result<(), AuthError> {
        let owned = self
            .refresh_tokens
            .find_by_token(refresh_token)
            .await?
            .is_some_and(|record| record.account_id == account_id);
        if !owned {
            warn!(
                "Account {} tried to revoke a refresh token it does not hold",
                account_id
            );
            return Err(AuthError::InvalidRefreshToken);
        }

        self.rotation.revoke(refresh_token, origin_ip).await
    }

    /// End every session of the account; returns how many tokens were revoked
    pub async fn logout(&self, account_id: Uuid) -> Result<u64, AuthError> {
        self.rotation.revoke_all_for_account(account_id).await
    }

    /// Full verification of an access token
    pub fn validate_token(&self, token: &str) -> bool {
        self.tokens.verify(token)
    }

    /// Public projection of the account a valid token was issued to
    ///
    /// Missing or deactivated accounts read as an invalid token.
    pub async fn current_user(&self, account_id: Uuid) -> Result<UserResponse, AuthError> {
        let account = self
            .accounts
            .find_by_id(account_id)
            .await?
            .filter(|a| a.is_active)
            .ok_or(AuthError::InvalidToken)?;

        let claims = self.claims.claims_for(account.id).await?;
        Ok(UserResponse::from_account(
            &account,
            claims.role_names(),
            claims.permission_names(),
        ))
    }

    fn respond(
        &self,
        account: &Account,
        claims: &ResolvedClaims,
        access_token: String,
        refresh_token: String,
    ) -> Result<AuthResponse, AuthError> {
        let expires_at = self.tokens.decode_expiry(&access_token)?;

        Ok(AuthResponse {
            access_token,
            refresh_token,
            expires_at,
            user: UserResponse::from_account(
                account,
                claims.role_names(),
                claims.permission_names(),
            ),
        })
    }
}
