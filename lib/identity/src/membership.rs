//! Organization memberships and the two authorization checks built on them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use crewboard_core::{AccountId, MembershipId, OrganizationId};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::account::Account;
use crate::error::StoreError;

/// Role an account holds within an organization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MembershipRole {
    Member,
    Admin,
}

impl MembershipRole {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Member => "member",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for MembershipRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MembershipRole {
    type Err = StoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "member" => Ok(Self::Member),
            "admin" => Ok(Self::Admin),
            other => Err(StoreError::Unavailable {
                details: format!("unknown membership role '{other}'"),
            }),
        }
    }
}

/// Links an account to an organization with a role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizationMembership {
    pub id: MembershipId,
    pub account_id: AccountId,
    pub organization_id: OrganizationId,
    pub role: MembershipRole,
    pub created_at: DateTime<Utc>,
}

impl OrganizationMembership {
    #[must_use]
    pub fn new(account_id: AccountId, organization_id: OrganizationId, role: MembershipRole) -> Self {
        Self {
            id: MembershipId::new(),
            account_id,
            organization_id,
            role,
            created_at: Utc::now(),
        }
    }
}

/// Storage for memberships. An account holds at most one membership per
/// organization.
#[async_trait]
pub trait MembershipStore: Send + Sync {
    async fn add(&self, membership: &OrganizationMembership) -> Result<(), StoreError>;

    /// Returns true if a membership exists for the pair, optionally
    /// restricted to a role.
    async fn exists(
        &self,
        account_id: AccountId,
        organization_id: OrganizationId,
        role: Option<MembershipRole>,
    ) -> Result<bool, StoreError>;

    async fn list_for_account(
        &self,
        account_id: AccountId,
    ) -> Result<Vec<OrganizationMembership>, StoreError>;
}

impl Account {
    /// Returns true if the account administers `organization_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the membership store fails.
    pub async fn admin_of(
        &self,
        memberships: &dyn MembershipStore,
        organization_id: OrganizationId,
    ) -> Result<bool, StoreError> {
        memberships
            .exists(self.id(), organization_id, Some(MembershipRole::Admin))
            .await
    }

    /// Returns true if the account belongs to `organization_id` in any role.
    ///
    /// # Errors
    ///
    /// Returns an error if the membership store fails.
    pub async fn member_of(
        &self,
        memberships: &dyn MembershipStore,
        organization_id: OrganizationId,
    ) -> Result<bool, StoreError> {
        memberships.exists(self.id(), organization_id, None).await
    }
}
