//! In-memory store implementations.
//!
//! Used by tests and by local development without a database. Each store
//! holds its records behind a single mutex, so uniqueness checks and inserts
//! happen atomically just like a database constraint.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crewboard_core::{AccountId, OrganizationId};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use crate::account::{Account, normalize_email};
use crate::error::{SessionError, StoreError};
use crate::membership::{MembershipRole, MembershipStore, OrganizationMembership};
use crate::session::{Session, SessionId, SessionStore};
use crate::store::AccountStore;

fn poisoned(what: &str) -> StoreError {
    StoreError::Unavailable {
        details: format!("{what} lock poisoned"),
    }
}

/// Accounts kept in a map keyed by id.
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    accounts: Mutex<HashMap<AccountId, Account>>,
}

impl MemoryAccountStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<AccountId, Account>>, StoreError> {
        self.accounts.lock().map_err(|_| poisoned("account store"))
    }

    /// Number of stored accounts.
    #[must_use]
    pub fn len(&self) -> usize {
        self.accounts.lock().map(|a| a.len()).unwrap_or_default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, StoreError> {
        Ok(self.lock()?.get(&id).cloned())
    }

    async fn find_by_identity(
        &self,
        provider: &str,
        uid: &str,
    ) -> Result<Option<Account>, StoreError> {
        Ok(self
            .lock()?
            .values()
            .find(|a| a.provider() == Some(provider) && a.uid() == Some(uid))
            .cloned())
    }

    async fn insert(&self, account: &Account) -> Result<(), StoreError> {
        let mut accounts = self.lock()?;

        if let (Some(provider), Some(uid)) = (account.provider(), account.uid()) {
            let taken = accounts
                .values()
                .any(|a| a.provider() == Some(provider) && a.uid() == Some(uid));
            if taken {
                return Err(StoreError::DuplicateIdentity {
                    provider: provider.to_string(),
                    uid: uid.to_string(),
                });
            }
        }

        let email = normalize_email(account.email());
        if accounts
            .values()
            .any(|a| normalize_email(a.email()) == email)
        {
            return Err(StoreError::DuplicateEmail { email });
        }

        accounts.insert(account.id(), account.clone());
        Ok(())
    }

    async fn record_sign_in(
        &self,
        id: AccountId,
        at: DateTime<Utc>,
        ip: Option<String>,
    ) -> Result<(), StoreError> {
        let mut accounts = self.lock()?;
        let account = accounts
            .get_mut(&id)
            .ok_or_else(|| StoreError::NotFound { id: id.to_string() })?;
        account.record_sign_in(at, ip);
        Ok(())
    }
}

/// Memberships kept in a vector.
#[derive(Debug, Default)]
pub struct MemoryMembershipStore {
    memberships: Mutex<Vec<OrganizationMembership>>,
}

impl MemoryMembershipStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<OrganizationMembership>>, StoreError> {
        self.memberships.lock().map_err(|_| poisoned("membership store"))
    }
}

#[async_trait]
impl MembershipStore for MemoryMembershipStore {
    async fn add(&self, membership: &OrganizationMembership) -> Result<(), StoreError> {
        let mut memberships = self.lock()?;
        let duplicate = memberships.iter().any(|m| {
            m.account_id == membership.account_id
                && m.organization_id == membership.organization_id
        });
        if duplicate {
            return Err(StoreError::DuplicateMembership {
                account_id: membership.account_id.to_string(),
                organization_id: membership.organization_id.to_string(),
            });
        }
        memberships.push(membership.clone());
        Ok(())
    }

    async fn exists(
        &self,
        account_id: AccountId,
        organization_id: OrganizationId,
        role: Option<MembershipRole>,
    ) -> Result<bool, StoreError> {
        Ok(self.lock()?.iter().any(|m| {
            m.account_id == account_id
                && m.organization_id == organization_id
                && role.is_none_or(|r| m.role == r)
        }))
    }

    async fn list_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<OrganizationMembership>, StoreError> {
        Ok(self
            .lock()?
            .iter()
            .filter(|m| m.account_id == account_id)
            .cloned()
            .collect())
    }
}

/// Sessions kept in a map keyed by id.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: Mutex<HashMap<SessionId, Session>>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<SessionId, Session>>, SessionError> {
        self.sessions.lock().map_err(|_| SessionError::Storage {
            details: "session store lock poisoned".to_string(),
        })
    }

    /// Number of stored sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.lock().map(|s| s.len()).unwrap_or_default()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, session: &Session) -> Result<(), SessionError> {
        self.lock()?.insert(session.id().clone(), session.clone());
        Ok(())
    }

    async fn find_by_id(&self, id: &SessionId) -> Result<Option<Session>, SessionError> {
        Ok(self.lock()?.get(id).cloned())
    }

    async fn delete(&self, id: &SessionId) -> Result<(), SessionError> {
        self.lock()?.remove(id);
        Ok(())
    }

    async fn delete_expired(&self) -> Result<u64, SessionError> {
        let mut sessions = self.lock()?;
        let before = sessions.len();
        sessions.retain(|_, s| !s.is_expired());
        Ok((before - sessions.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::PasswordCredential;
    use chrono::Duration;

    fn account(email: &str) -> Account {
        Account::new(email, "Someone", PasswordCredential::from_digest("x"))
    }

    #[tokio::test]
    async fn insert_and_find() {
        let store = MemoryAccountStore::new();
        let account = account("a@example.com").with_identity("github", "1");
        store.insert(&account).await.expect("insert");

        assert_eq!(store.len(), 1);
        let by_id = store.find_by_id(account.id()).await.expect("find");
        assert_eq!(by_id.as_ref().map(Account::id), Some(account.id()));

        let by_identity = store.find_by_identity("github", "1").await.expect("find");
        assert!(by_identity.is_some());
        assert!(
            store
                .find_by_identity("google_oauth2", "1")
                .await
                .expect("find")
                .is_none()
        );
    }

    #[tokio::test]
    async fn duplicate_identity_is_rejected() {
        let store = MemoryAccountStore::new();
        store
            .insert(&account("a@example.com").with_identity("github", "1"))
            .await
            .expect("insert");

        let err = store
            .insert(&account("b@example.com").with_identity("github", "1"))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateIdentity { .. }));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn duplicate_email_is_rejected_case_insensitively() {
        let store = MemoryAccountStore::new();
        store.insert(&account("a@example.com")).await.expect("insert");

        let err = store.insert(&account("A@EXAMPLE.com")).await.unwrap_err();
        assert_eq!(
            err,
            StoreError::DuplicateEmail {
                email: "a@example.com".to_string()
            }
        );
    }

    #[tokio::test]
    async fn record_sign_in_updates_activity() {
        let store = MemoryAccountStore::new();
        let account = account("a@example.com");
        store.insert(&account).await.expect("insert");

        store
            .record_sign_in(account.id(), Utc::now(), Some("127.0.0.1".to_string()))
            .await
            .expect("record");

        let stored = store
            .find_by_id(account.id())
            .await
            .expect("find")
            .expect("present");
        assert_eq!(stored.sign_ins().sign_in_count, 1);
    }

    #[tokio::test]
    async fn record_sign_in_for_missing_account() {
        let store = MemoryAccountStore::new();
        let err = store
            .record_sign_in(AccountId::new(), Utc::now(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn one_membership_per_organization() {
        let store = MemoryMembershipStore::new();
        let account_id = AccountId::new();
        let org = OrganizationId::new();
        store
            .add(&OrganizationMembership::new(account_id, org, MembershipRole::Member))
            .await
            .expect("add");

        let err = store
            .add(&OrganizationMembership::new(account_id, org, MembershipRole::Admin))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::DuplicateMembership { .. }));
        assert_eq!(store.list_for_account(account_id).await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn expired_sessions_are_swept() {
        let store = MemorySessionStore::new();
        let live = Session::new(SessionId::generate(), AccountId::new(), None, Duration::hours(1));
        let dead = Session::new(
            SessionId::generate(),
            AccountId::new(),
            None,
            Duration::seconds(-5),
        );
        store.create(&live).await.expect("create");
        store.create(&dead).await.expect("create");

        assert_eq!(store.delete_expired().await.expect("sweep"), 1);
        assert!(store.find_by_id(live.id()).await.expect("find").is_some());
        assert!(store.find_by_id(dead.id()).await.expect("find").is_none());

        store.delete(live.id()).await.expect("delete");
        assert!(store.is_empty());
    }
}
