//! PostgreSQL repositories for accounts, memberships and sessions.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crewboard_core::{AccountId, MembershipId, OrganizationId};
use crewboard_identity::{
    Account, AccountStore, MembershipRole, MembershipStore, OrganizationMembership,
    PasswordCredential, ProviderKind, Session, SessionError, SessionId, SessionStore,
    SignInActivity, StoreError,
};
use sqlx::{FromRow, PgPool};
use std::str::FromStr;

/// Unique constraints named in the migrations.
const ACCOUNTS_IDENTITY_KEY: &str = "accounts_provider_uid_key";
const ACCOUNTS_EMAIL_KEY: &str = "accounts_email_lower_key";
const MEMBERSHIPS_ACCOUNT_ORG_KEY: &str = "organization_memberships_account_org_key";

/// Postgres `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

fn unavailable(e: sqlx::Error) -> StoreError {
    StoreError::Unavailable {
        details: e.to_string(),
    }
}

fn decode_error(what: &str, value: &str, e: impl std::fmt::Display) -> StoreError {
    StoreError::Unavailable {
        details: format!("invalid {what} '{value}': {e}"),
    }
}

/// Returns the violated constraint if `e` is a unique violation.
fn unique_violation(e: &sqlx::Error) -> Option<String> {
    match e {
        sqlx::Error::Database(db) if db.code().as_deref() == Some(UNIQUE_VIOLATION) => {
            Some(db.constraint().unwrap_or_default().to_string())
        }
        _ => None,
    }
}

const ACCOUNT_COLUMNS: &str = "id, email, name, encrypted_password, provider, uid, confirmed_at, \
     avatar, sign_in_count, current_sign_in_at, last_sign_in_at, current_sign_in_ip, \
     last_sign_in_ip, created_at, updated_at";

/// Row type for account queries.
#[derive(FromRow)]
struct AccountRow {
    id: String,
    email: String,
    name: String,
    encrypted_password: String,
    provider: Option<String>,
    uid: Option<String>,
    confirmed_at: Option<DateTime<Utc>>,
    avatar: Option<String>,
    sign_in_count: i32,
    current_sign_in_at: Option<DateTime<Utc>>,
    last_sign_in_at: Option<DateTime<Utc>>,
    current_sign_in_ip: Option<String>,
    last_sign_in_ip: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AccountRow {
    fn try_into_account(self) -> Result<Account, StoreError> {
        let id = AccountId::from_str(&self.id).map_err(|e| decode_error("account id", &self.id, e))?;
        Ok(Account::with_all_fields(
            id,
            self.email,
            self.name,
            PasswordCredential::from_digest(self.encrypted_password),
            self.provider,
            self.uid,
            self.confirmed_at,
            self.avatar,
            SignInActivity {
                sign_in_count: self.sign_in_count,
                current_sign_in_at: self.current_sign_in_at,
                last_sign_in_at: self.last_sign_in_at,
                current_sign_in_ip: self.current_sign_in_ip,
                last_sign_in_ip: self.last_sign_in_ip,
            },
            self.created_at,
            self.updated_at,
        ))
    }
}

/// Account storage backed by the `accounts` table.
pub struct PgAccountRepository {
    pool: PgPool,
}

impl PgAccountRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_one_where(
        &self,
        predicate: &str,
        binds: &[&str],
    ) -> Result<Option<Account>, StoreError> {
        let sql = format!("SELECT {ACCOUNT_COLUMNS} FROM accounts WHERE {predicate}");
        let mut query = sqlx::query_as::<_, AccountRow>(&sql);
        for value in binds {
            query = query.bind(*value);
        }
        query
            .fetch_optional(&self.pool)
            .await
            .map_err(unavailable)?
            .map(AccountRow::try_into_account)
            .transpose()
    }
}

#[async_trait]
impl AccountStore for PgAccountRepository {
    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        self.fetch_one_where("id = $1", &[id.to_string().as_str()])
            .await
    }

    async fn find_by_identity(
        &self,
        provider: &str,
        uid: &str,
    ) -> Result<Option<Account>, StoreError> {
        self.fetch_one_where("provider = $1 AND uid = $2", &[provider, uid])
            .await
    }

    async fn insert(&self, account: &Account) -> Result<(), StoreError> {
        let sign_ins = account.sign_ins();
        sqlx::query(
            r#"
            INSERT INTO accounts (
                id, email, name, encrypted_password, provider, uid, confirmed_at, avatar,
                sign_in_count, current_sign_in_at, last_sign_in_at,
                current_sign_in_ip, last_sign_in_ip, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(account.id().to_string())
        .bind(account.email())
        .bind(account.name())
        .bind(account.password().as_digest())
        .bind(account.provider())
        .bind(account.uid())
        .bind(account.confirmed_at())
        .bind(account.avatar())
        .bind(sign_ins.sign_in_count)
        .bind(sign_ins.current_sign_in_at)
        .bind(sign_ins.last_sign_in_at)
        .bind(sign_ins.current_sign_in_ip.as_deref())
        .bind(sign_ins.last_sign_in_ip.as_deref())
        .bind(account.created_at())
        .bind(account.updated_at())
        .execute(&self.pool)
        .await
        .map_err(|e| match unique_violation(&e).as_deref() {
            Some(ACCOUNTS_IDENTITY_KEY) => StoreError::DuplicateIdentity {
                provider: account.provider().unwrap_or_default().to_string(),
                uid: account.uid().unwrap_or_default().to_string(),
            },
            Some(ACCOUNTS_EMAIL_KEY) => StoreError::DuplicateEmail {
                email: account.email().to_string(),
            },
            _ => unavailable(e),
        })?;

        Ok(())
    }

    async fn record_sign_in(
        &self,
        id: AccountId,
        at: DateTime<Utc>,
        ip: Option<String>,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE accounts
            SET last_sign_in_at = COALESCE(current_sign_in_at, $2),
                last_sign_in_ip = COALESCE(current_sign_in_ip, $3),
                current_sign_in_at = $2,
                current_sign_in_ip = $3,
                sign_in_count = sign_in_count + 1,
                updated_at = $2
            WHERE id = $1
            "#,
        )
        .bind(id.to_string())
        .bind(at)
        .bind(ip)
        .execute(&self.pool)
        .await
        .map_err(unavailable)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound { id: id.to_string() });
        }
        Ok(())
    }
}

/// Row type for membership queries.
#[derive(FromRow)]
struct MembershipRow {
    id: String,
    account_id: String,
    organization_id: String,
    role: String,
    created_at: DateTime<Utc>,
}

impl MembershipRow {
    fn try_into_membership(self) -> Result<OrganizationMembership, StoreError> {
        Ok(OrganizationMembership {
            id: MembershipId::from_str(&self.id)
                .map_err(|e| decode_error("membership id", &self.id, e))?,
            account_id: AccountId::from_str(&self.account_id)
                .map_err(|e| decode_error("account id", &self.account_id, e))?,
            organization_id: OrganizationId::from_str(&self.organization_id)
                .map_err(|e| decode_error("organization id", &self.organization_id, e))?,
            role: MembershipRole::from_str(&self.role)?,
            created_at: self.created_at,
        })
    }
}

/// Membership storage backed by the `organization_memberships` table.
pub struct PgMembershipRepository {
    pool: PgPool,
}

impl PgMembershipRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl MembershipStore for PgMembershipRepository {
    async fn add(&self, membership: &OrganizationMembership) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO organization_memberships (id, account_id, organization_id, role, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(membership.id.to_string())
        .bind(membership.account_id.to_string())
        .bind(membership.organization_id.to_string())
        .bind(membership.role.as_str())
        .bind(membership.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| match unique_violation(&e).as_deref() {
            Some(MEMBERSHIPS_ACCOUNT_ORG_KEY) => StoreError::DuplicateMembership {
                account_id: membership.account_id.to_string(),
                organization_id: membership.organization_id.to_string(),
            },
            _ => unavailable(e),
        })?;

        Ok(())
    }

    async fn exists(
        &self,
        account_id: AccountId,
        organization_id: OrganizationId,
        role: Option<MembershipRole>,
    ) -> Result<bool, StoreError> {
        let (exists,): (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM organization_memberships
                WHERE account_id = $1
                  AND organization_id = $2
                  AND ($3::TEXT IS NULL OR role = $3)
            )
            "#,
        )
        .bind(account_id.to_string())
        .bind(organization_id.to_string())
        .bind(role.map(|r| r.as_str()))
        .fetch_one(&self.pool)
        .await
        .map_err(unavailable)?;

        Ok(exists)
    }

    async fn list_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<OrganizationMembership>, StoreError> {
        let rows: Vec<MembershipRow> = sqlx::query_as(
            r#"
            SELECT id, account_id, organization_id, role, created_at
            FROM organization_memberships
            WHERE account_id = $1
            ORDER BY created_at
            "#,
        )
        .bind(account_id.to_string())
        .fetch_all(&self.pool)
        .await
        .map_err(unavailable)?;

        rows.into_iter()
            .map(MembershipRow::try_into_membership)
            .collect()
    }
}

/// Row type for session queries.
#[derive(FromRow)]
struct SessionRow {
    id: String,
    account_id: String,
    provider: Option<String>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl SessionRow {
    fn try_into_session(self) -> Result<Session, SessionError> {
        let storage = |details: String| SessionError::Storage { details };
        let account_id = AccountId::from_str(&self.account_id)
            .map_err(|e| storage(format!("invalid account id '{}': {e}", self.account_id)))?;
        let provider = self
            .provider
            .as_deref()
            .map(ProviderKind::from_str)
            .transpose()
            .map_err(|e| storage(e.to_string()))?;

        Ok(Session::with_all_fields(
            SessionId::new(self.id),
            account_id,
            provider,
            self.created_at,
            self.expires_at,
        ))
    }
}

fn session_storage(e: sqlx::Error) -> SessionError {
    SessionError::Storage {
        details: e.to_string(),
    }
}

/// Session storage backed by the `sessions` table.
pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionStore for PgSessionRepository {
    async fn create(&self, session: &Session) -> Result<(), SessionError> {
        sqlx::query(
            r#"
            INSERT INTO sessions (id, account_id, provider, created_at, expires_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(session.id().as_str())
        .bind(session.account_id().to_string())
        .bind(session.provider().map(|p| p.as_str()))
        .bind(session.created_at())
        .bind(session.expires_at())
        .execute(&self.pool)
        .await
        .map_err(session_storage)?;

        Ok(())
    }

    async fn find_by_id(&self, id: &SessionId) -> Result<Option<Session>, SessionError> {
        let row: Option<SessionRow> = sqlx::query_as(
            r#"
            SELECT id, account_id, provider, created_at, expires_at
            FROM sessions
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(session_storage)?;

        row.map(SessionRow::try_into_session).transpose()
    }

    async fn delete(&self, id: &SessionId) -> Result<(), SessionError> {
        sqlx::query(
            r#"
            DELETE FROM sessions
            WHERE id = $1
            "#,
        )
        .bind(id.as_str())
        .execute(&self.pool)
        .await
        .map_err(session_storage)?;

        Ok(())
    }

    async fn delete_expired(&self) -> Result<u64, SessionError> {
        let result = sqlx::query(
            r#"
            DELETE FROM sessions
            WHERE expires_at < NOW()
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(session_storage)?;

        Ok(result.rows_affected())
    }
}
