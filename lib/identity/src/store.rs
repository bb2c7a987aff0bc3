//! Account persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crewboard_core::AccountId;

use crate::account::Account;
use crate::error::StoreError;

/// Storage for accounts.
///
/// Implementations must enforce two uniqueness rules atomically on insert:
/// `(provider, uid)` when both are present, and email compared
/// case-insensitively. Violations are reported as
/// [`StoreError::DuplicateIdentity`] and [`StoreError::DuplicateEmail`].
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_by_id(&self, id: AccountId) -> Result<Option<Account>, StoreError>;

    /// Finds the account linked to an identity-provider pair (exact match).
    async fn find_by_identity(
        &self,
        provider: &str,
        uid: &str,
    ) -> Result<Option<Account>, StoreError>;

    async fn insert(&self, account: &Account) -> Result<(), StoreError>;

    /// Records a successful sign-in on the account.
    async fn record_sign_in(
        &self,
        id: AccountId,
        at: DateTime<Utc>,
        ip: Option<String>,
    ) -> Result<(), StoreError>;
}
