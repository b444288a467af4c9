// PostgreSQL record store
// Multi-step writes run inside transactions; counters are updated in SQL

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

use crate::auth::{
    error::AuthError,
    models::{Account, LoginIdentifier, Permission, RefreshTokenRecord, Role, RoleMembership},
    repository::{AccountRepository, RefreshTokenRepository, RoleRepository},
};
use crate::config::LockoutPolicy;

const ACCOUNT_COLUMNS: &str = "id, username, email, password_hash, first_name, last_name, \
     phone_number, is_active, is_email_confirmed, last_login_at, failed_login_attempts, \
     locked_out_until, created_at, updated_at";

const REFRESH_TOKEN_COLUMNS: &str = "id, token, account_id, expires_at, created_at, \
     created_by_ip, is_revoked, revoked_at, revoked_by_ip, replaced_by_token";

/// Store backed by a PostgreSQL pool
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

/// Permission row tagged with the role that grants it
#[derive(Debug, FromRow)]
struct GrantRow {
    role_id: Uuid,
    id: Uuid,
    name: String,
    description: String,
    resource: String,
    action: String,
    is_deleted: bool,
}

impl From<GrantRow> for Permission {
    fn from(row: GrantRow) -> Self {
        Permission {
            id: row.id,
            name: row.name,
            description: row.description,
            resource: row.resource,
            action: row.action,
            is_deleted: row.is_deleted,
        }
    }
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Translate a uniqueness violation into the matching conflict
fn map_account_insert_error(err: sqlx::Error) -> AuthError {
    if let sqlx::Error::Database(db_err) = &err {
        if db_err.is_unique_violation() {
            return match db_err.constraint() {
                Some("uq_accounts_email") => AuthError::EmailConflict,
                _ => AuthError::UsernameConflict,
            };
        }
    }
    AuthError::from(err)
}

#[async_trait]
impl AccountRepository for PgStore {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Account>, AuthError> {
        let query = format!("SELECT {} FROM accounts WHERE id = $1", ACCOUNT_COLUMNS);
        let account = sqlx::query_as::<_, Account>(&query)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(account)
    }

    async fn find_by_login(
        &self,
        identifier: &LoginIdentifier,
    ) -> Result<Option<Account>, AuthError> {
        let query = format!(
            "SELECT {} FROM accounts WHERE username = $1 OR email = $1 LIMIT 1",
            ACCOUNT_COLUMNS
        );
        let account = sqlx::query_as::<_, Account>(&query)
            .bind(identifier.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(account)
    }

    async fn username_exists(&self, username: &str) -> Result<bool, AuthError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM accounts WHERE username = $1)")
                .bind(username)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn email_exists(&self, email: &str) -> Result<bool, AuthError> {
        let exists: bool =
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM accounts WHERE email = $1)")
                .bind(email)
                .fetch_one(&self.pool)
                .await?;
        Ok(exists)
    }

    async fn create(&self, account: &Account) -> Result<(), AuthError> {
        let query = format!(
            "INSERT INTO accounts ({}) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)",
            ACCOUNT_COLUMNS
        );
        sqlx::query(&query)
            .bind(account.id)
            .bind(&account.username)
            .bind(&account.email)
            .bind(&account.password_hash)
            .bind(&account.first_name)
            .bind(&account.last_name)
            .bind(&account.phone_number)
            .bind(account.is_active)
            .bind(account.is_email_confirmed)
            .bind(account.last_login_at)
            .bind(account.failed_login_attempts)
            .bind(account.locked_out_until)
            .bind(account.created_at)
            .bind(account.updated_at)
            .execute(&self.pool)
            .await
            .map_err(map_account_insert_error)?;
        Ok(())
    }

    async fn save(&self, account: &Account) -> Result<(), AuthError> {
        let query = format!(
            r#"
            INSERT INTO accounts ({})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            ON CONFLICT (id) DO UPDATE SET
                username = EXCLUDED.username,
                email = EXCLUDED.email,
                password_hash = EXCLUDED.password_hash,
                first_name = EXCLUDED.first_name,
                last_name = EXCLUDED.last_name,
                phone_number = EXCLUDED.phone_number,
                is_active = EXCLUDED.is_active,
                is_email_confirmed = EXCLUDED.is_email_confirmed,
                last_login_at = EXCLUDED.last_login_at,
                failed_login_attempts = EXCLUDED.failed_login_attempts,
                locked_out_until = EXCLUDED.locked_out_until,
                updated_at = EXCLUDED.updated_at
            "#,
            ACCOUNT_COLUMNS
        );
        sqlx::query(&query)
            .bind(account.id)
            .bind(&account.username)
            .bind(&account.email)
            .bind(&account.password_hash)
            .bind(&account.first_name)
            .bind(&account.last_name)
            .bind(&account.phone_number)
            .bind(account.is_active)
            .bind(account.is_email_confirmed)
            .bind(account.last_login_at)
            .bind(account.failed_login_attempts)
            .bind(account.locked_out_until)
            .bind(account.created_at)
            .bind(account.updated_at)
            .execute(&self.pool)
            .await
            .map_err(map_account_insert_error)?;
        Ok(())
    }

    async fn record_failed_login(
        &self,
        id: Uuid,
        policy: &LockoutPolicy,
        now: DateTime<Utc>,
    ) -> Result<Account, AuthError> {
        // Single statement so concurrent failures cannot overwrite each other
        let query = format!(
            r#"
            UPDATE accounts
            SET failed_login_attempts = failed_login_attempts + 1,
                locked_out_until = CASE
                    WHEN failed_login_attempts + 1 >= $2 THEN $3
                    ELSE locked_out_until
                END,
                updated_at = $4
            WHERE id = $1
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        );
        sqlx::query_as::<_, Account>(&query)
            .bind(id)
            .bind(policy.max_failed_attempts)
            .bind(now + policy.lockout_duration)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AuthError::NotFound)
    }

    async fn record_successful_login(
        &self,
        id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Account, AuthError> {
        let query = format!(
            r#"
            UPDATE accounts
            SET failed_login_attempts = 0,
                locked_out_until = NULL,
                last_login_at = $2,
                updated_at = $2
            WHERE id = $1
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        );
        sqlx::query_as::<_, Account>(&query)
            .bind(id)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AuthError::NotFound)
    }
}

#[async_trait]
impl RoleRepository for PgStore {
    async fn find_default_roles(&self) -> Result<Vec<Role>, AuthError> {
        let roles = sqlx::query_as::<_, Role>(
            r#"
            SELECT id, name, description, is_default, is_deleted
            FROM roles
            WHERE is_default = TRUE AND is_deleted = FALSE
            ORDER BY name
            "#,
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(roles)
    }

    async fn assign_role(&self, account_id: Uuid, role_id: Uuid) -> Result<(), AuthError> {
        sqlx::query(
            r#"
            INSERT INTO account_roles (account_id, role_id)
            VALUES ($1, $2)
            ON CONFLICT (account_id, role_id) DO NOTHING
            "#,
        )
        .bind(account_id)
        .bind(role_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn memberships_for(&self, account_id: Uuid) -> Result<Vec<RoleMembership>, AuthError> {
        let roles = sqlx::query_as::<_, Role>(
            r#"
            SELECT r.id, r.name, r.description, r.is_default, r.is_deleted
            FROM roles r
            JOIN account_roles ar ON ar.role_id = r.id
            WHERE ar.account_id = $1
            ORDER BY r.name
            "#,
        )
        .bind(account_id)
        .fetch_all(&self.pool)
        .await?;

        if roles.is_empty() {
            return Ok(Vec::new());
        }

        let role_ids: Vec<Uuid> = roles.iter().map(|r| r.id).collect();
        let grants = sqlx::query_as::<_, GrantRow>(
            r#"
            SELECT rp.role_id, p.id, p.name, p.description, p.resource, p.action, p.is_deleted
            FROM role_permissions rp
            JOIN permissions p ON p.id = rp.permission_id
            WHERE rp.role_id = ANY($1)
            ORDER BY p.name
            "#,
        )
        .bind(&role_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut memberships: Vec<RoleMembership> = roles
            .into_iter()
            .map(|role| RoleMembership {
                role,
                permissions: Vec::new(),
            })
            .collect();
        for grant in grants {
            if let Some(membership) = memberships.iter_mut().find(|m| m.role.id == grant.role_id) {
                membership.permissions.push(grant.into());
            }
        }

        Ok(memberships)
    }
}

#[async_trait]
impl RefreshTokenRepository for PgStore {
    async fn find_by_token(&self, token: &str) -> Result<Option<RefreshTokenRecord>, AuthError> {
        let query = format!(
            "SELECT {} FROM refresh_tokens WHERE token = $1",
            REFRESH_TOKEN_COLUMNS
        );
        let record = sqlx::query_as::<_, RefreshTokenRecord>(&query)
            .bind(token)
            .fetch_optional(&self.pool)
            .await?;
        Ok(record)
    }

    async fn find_active_by_account(
        &self,
        account_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<Vec<RefreshTokenRecord>, AuthError> {
        let query = format!(
            "SELECT {} FROM refresh_tokens \
             WHERE account_id = $1 AND is_revoked = FALSE AND expires_at > $2 \
             ORDER BY created_at",
            REFRESH_TOKEN_COLUMNS
        );
        let records = sqlx::query_as::<_, RefreshTokenRecord>(&query)
            .bind(account_id)
            .bind(now)
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    async fn insert(&self, record: &RefreshTokenRecord) -> Result<(), AuthError> {
        let query = format!(
            "INSERT INTO refresh_tokens ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            REFRESH_TOKEN_COLUMNS
        );
        sqlx::query(&query)
            .bind(record.id)
            .bind(&record.token)
            .bind(record.account_id)
            .bind(record.expires_at)
            .bind(record.created_at)
            .bind(&record.created_by_ip)
            .bind(record.is_revoked)
            .bind(record.revoked_at)
            .bind(&record.revoked_by_ip)
            .bind(&record.replaced_by_token)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn revoke(
        &self,
        token: &str,
        now: DateTime<Utc>,
        revoked_by_ip: Option<&str>,
    ) -> Result<bool, AuthError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET is_revoked = TRUE, revoked_at = $2, revoked_by_ip = $3
            WHERE token = $1 AND is_revoked = FALSE
            "#,
        )
        .bind(token)
        .bind(now)
        .bind(revoked_by_ip)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn commit_rotation(
        &self,
        revoked: &RefreshTokenRecord,
        successor: &RefreshTokenRecord,
    ) -> Result<bool, AuthError> {
        // Dropping the transaction on any error rolls both writes back
        let mut tx = self.pool.begin().await?;

        // Guard on is_revoked so a concurrent rotation of the same token loses
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET is_revoked = TRUE, revoked_at = $2, revoked_by_ip = $3, replaced_by_token = $4
            WHERE token = $1 AND is_revoked = FALSE
            "#,
        )
        .bind(&revoked.token)
        .bind(revoked.revoked_at)
        .bind(&revoked.revoked_by_ip)
        .bind(&revoked.replaced_by_token)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }

        let query = format!(
            "INSERT INTO refresh_tokens ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            REFRESH_TOKEN_COLUMNS
        );
        sqlx::query(&query)
            .bind(successor.id)
            .bind(&successor.token)
            .bind(successor.account_id)
            .bind(successor.expires_at)
            .bind(successor.created_at)
            .bind(&successor.created_by_ip)
            .bind(successor.is_revoked)
            .bind(successor.revoked_at)
            .bind(&successor.revoked_by_ip)
            .bind(&successor.replaced_by_token)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(true)
    }

    async fn revoke_all_for_account(
        &self,
        account_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<u64, AuthError> {
        let result = sqlx::query(
            r#"
            UPDATE refresh_tokens
            SET is_revoked = TRUE, revoked_at = $2
            WHERE account_id = $1 AND is_revoked = FALSE AND expires_at > $2
            "#,
        )
        .bind(account_id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }

    async fn find_expired(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<RefreshTokenRecord>, AuthError> {
        let query = format!(
            "SELECT {} FROM refresh_tokens WHERE expires_at < $1 ORDER BY expires_at",
            REFRESH_TOKEN_COLUMNS
        );
        let records = sqlx::query_as::<_, RefreshTokenRecord>(&query)
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?;
        Ok(records)
    }

    async fn delete_expired(&self, cutoff: DateTime<Utc>) -> Result<u64, AuthError> {
        let result = sqlx::query("DELETE FROM refresh_tokens WHERE expires_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
