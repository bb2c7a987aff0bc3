//! Authenticated sessions.
//!
//! A session is issued after a successful sign-in and identifies the account
//! on subsequent requests until it expires or is deleted.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use crewboard_core::AccountId;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::account::Account;
use crate::error::SessionError;
use crate::provider::ProviderKind;

/// Opaque session identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    #[must_use]
    pub fn new(id: String) -> Self {
        Self(id)
    }

    /// Generates a fresh, unique session id.
    #[must_use]
    pub fn generate() -> Self {
        Self(ulid::Ulid::new().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// An active authenticated session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    id: SessionId,
    account_id: AccountId,
    /// Provider the account signed in through, if any.
    provider: Option<ProviderKind>,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
}

impl Session {
    /// Creates a session valid for `duration` from now.
    ///
    /// Expiry saturates at the latest representable time.
    #[must_use]
    pub fn new(
        id: SessionId,
        account_id: AccountId,
        provider: Option<ProviderKind>,
        duration: Duration,
    ) -> Self {
        let now = Utc::now();
        let saturated = if duration > Duration::zero() {
            DateTime::<Utc>::MAX_UTC
        } else {
            now
        };
        let expires_at = now.checked_add_signed(duration).unwrap_or(saturated);
        Self {
            id,
            account_id,
            provider,
            created_at: now,
            expires_at,
        }
    }

    /// Reconstitutes a session from storage.
    #[must_use]
    pub fn with_all_fields(
        id: SessionId,
        account_id: AccountId,
        provider: Option<ProviderKind>,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            account_id,
            provider,
            created_at,
            expires_at,
        }
    }

    #[must_use]
    pub fn id(&self) -> &SessionId {
        &self.id
    }

    #[must_use]
    pub fn account_id(&self) -> AccountId {
        self.account_id
    }

    #[must_use]
    pub fn provider(&self) -> Option<ProviderKind> {
        self.provider
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    #[must_use]
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Remaining lifetime, clamped at zero.
    #[must_use]
    pub fn remaining(&self) -> Duration {
        (self.expires_at - Utc::now()).max(Duration::zero())
    }
}

/// Persists sessions.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn create(&self, session: &Session) -> Result<(), SessionError>;

    async fn find_by_id(&self, id: &SessionId) -> Result<Option<Session>, SessionError>;

    async fn delete(&self, id: &SessionId) -> Result<(), SessionError>;

    /// Deletes expired sessions and returns how many were removed.
    async fn delete_expired(&self) -> Result<u64, SessionError>;
}

/// Establishes an authenticated session for an account.
#[async_trait]
pub trait SessionIssuer: Send + Sync {
    async fn issue(
        &self,
        account: &Account,
        provider: Option<ProviderKind>,
    ) -> Result<Session, SessionError>;
}

/// Issues fixed-lifetime sessions into a [`SessionStore`].
#[derive(Clone)]
pub struct StoredSessionIssuer {
    store: Arc<dyn SessionStore>,
    duration: Duration,
}

impl StoredSessionIssuer {
    #[must_use]
    pub fn new(store: Arc<dyn SessionStore>, duration: Duration) -> Self {
        Self { store, duration }
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }
}

#[async_trait]
impl SessionIssuer for StoredSessionIssuer {
    async fn issue(
        &self,
        account: &Account,
        provider: Option<ProviderKind>,
    ) -> Result<Session, SessionError> {
        let session = Session::new(SessionId::generate(), account.id(), provider, self.duration);
        self.store.create(&session).await?;
        tracing::debug!(account_id = %account.id(), "issued session");
        Ok(session)
    }
}
