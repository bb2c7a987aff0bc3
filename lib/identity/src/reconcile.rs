//! Maps an identity-provider payload onto a local account.
//!
//! Reconciliation is an explicit protocol rather than a single
//! find-or-create call:
//!
//! 1. look the account up by `(provider, uid)`;
//! 2. on a miss, build a candidate account from the payload;
//! 3. validate the candidate;
//! 4. insert it, and if another request inserted the same identity first,
//!    look it up once more.
//!
//! Every failure is folded into a [`Reconciliation`] value. Nothing here
//! returns a raw store error to the caller.

use chrono::Utc;
use std::fmt;
use std::sync::Arc;

use crate::account::{Account, is_valid_email};
use crate::confirmation::ConfirmationTracker;
use crate::credential::CredentialVerifier;
use crate::error::StoreError;
use crate::payload::AuthPayload;
use crate::store::AccountStore;

/// Message reported when the candidate's email belongs to another account.
pub const EMAIL_TAKEN: &str = "Email has already been taken";

/// Why a payload could not be reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidPayload {
    MissingPayload,
    MissingProvider,
    MissingUid,
    MissingEmail,
    MalformedEmail,
    /// Neither a name nor a usable email local part was supplied.
    EmptyName,
    /// The identity was inserted concurrently but could not be found again.
    Conflict,
    StoreUnavailable,
    CredentialUnavailable,
}

impl fmt::Display for InvalidPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::MissingPayload => "no payload was supplied",
            Self::MissingProvider => "payload has no provider",
            Self::MissingUid => "payload has no uid",
            Self::MissingEmail => "payload has no email",
            Self::MalformedEmail => "payload email is malformed",
            Self::EmptyName => "payload yields an empty name",
            Self::Conflict => "identity conflicts with a concurrent sign-in",
            Self::StoreUnavailable => "account store is unavailable",
            Self::CredentialUnavailable => "credential could not be issued",
        };
        f.write_str(text)
    }
}

/// Result of reconciling one payload.
#[derive(Debug, Clone)]
pub enum Reconciliation {
    /// The identity was already linked to this account.
    Existing(Account),
    /// A new account was created for the identity.
    Created(Account),
    /// A candidate was built but could not be stored.
    Unpersisted {
        candidate: Account,
        errors: Vec<String>,
    },
    /// The payload could not be turned into an account.
    Invalid(InvalidPayload),
}

impl Reconciliation {
    /// The resolved account, if the identity now maps to one.
    #[must_use]
    pub fn account(&self) -> Option<&Account> {
        match self {
            Self::Existing(account) | Self::Created(account) => Some(account),
            Self::Unpersisted { .. } | Self::Invalid(_) => None,
        }
    }
}

/// Fields extracted from a payload that passed validation.
struct Claims<'a> {
    payload: &'a AuthPayload,
    provider: &'a str,
    uid: &'a str,
    email: &'a str,
    name: String,
    image: Option<&'a str>,
}

fn extract(payload: &AuthPayload) -> Result<Claims<'_>, InvalidPayload> {
    let provider = payload.provider().ok_or(InvalidPayload::MissingProvider)?;
    let uid = payload.uid().ok_or(InvalidPayload::MissingUid)?;
    let email = payload.email().ok_or(InvalidPayload::MissingEmail)?;
    if !is_valid_email(email) {
        return Err(InvalidPayload::MalformedEmail);
    }

    let name = match payload.name() {
        Some(name) => name.to_string(),
        None => email
            .split_once('@')
            .map(|(local, _)| local)
            .unwrap_or_default()
            .to_string(),
    };
    if name.trim().is_empty() {
        return Err(InvalidPayload::EmptyName);
    }

    Ok(Claims {
        payload,
        provider,
        uid,
        email,
        name,
        image: payload.image(),
    })
}

/// Resolves provider payloads to local accounts.
#[derive(Clone)]
pub struct IdentityReconciler {
    accounts: Arc<dyn AccountStore>,
    credentials: Arc<dyn CredentialVerifier>,
    confirmation: Arc<dyn ConfirmationTracker>,
}

impl IdentityReconciler {
    #[must_use]
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        credentials: Arc<dyn CredentialVerifier>,
        confirmation: Arc<dyn ConfirmationTracker>,
    ) -> Self {
        Self {
            accounts,
            credentials,
            confirmation,
        }
    }

    /// Reconciles `payload` with the account store.
    pub async fn reconcile(&self, payload: Option<&AuthPayload>) -> Reconciliation {
        let claims = match payload
            .ok_or(InvalidPayload::MissingPayload)
            .and_then(extract)
        {
            Ok(claims) => claims,
            Err(reason) => {
                tracing::debug!(%reason, "rejected identity payload");
                return Reconciliation::Invalid(reason);
            }
        };

        match self.lookup(&claims).await {
            Ok(Some(account)) => return Reconciliation::Existing(account),
            Ok(None) => {}
            Err(reason) => return Reconciliation::Invalid(reason),
        }

        let password = match self.credentials.issue_random() {
            Ok(password) => password,
            Err(report) => {
                tracing::error!(error = %report, "failed to issue credential for new account");
                return Reconciliation::Invalid(InvalidPayload::CredentialUnavailable);
            }
        };

        let now = Utc::now();
        let candidate = Account::new(claims.email, claims.name.clone(), password)
            .with_identity(claims.provider, claims.uid)
            .with_avatar(claims.image.map(str::to_string))
            .with_confirmed_at(self.confirmation.confirmation_for(claims.payload, now));

        let errors = candidate.validate();
        if !errors.is_empty() {
            return Reconciliation::Unpersisted { candidate, errors };
        }

        match self.accounts.insert(&candidate).await {
            Ok(()) => {
                tracing::info!(
                    account_id = %candidate.id(),
                    provider = claims.provider,
                    confirmed = candidate.is_confirmed(),
                    "created account from identity provider"
                );
                Reconciliation::Created(candidate)
            }
            Err(StoreError::DuplicateEmail { .. }) => Reconciliation::Unpersisted {
                candidate,
                errors: vec![EMAIL_TAKEN.to_string()],
            },
            Err(StoreError::DuplicateIdentity { .. }) => {
                tracing::debug!(
                    provider = claims.provider,
                    "identity inserted concurrently, retrying lookup"
                );
                match self.lookup(&claims).await {
                    Ok(Some(account)) => Reconciliation::Existing(account),
                    Ok(None) => Reconciliation::Invalid(InvalidPayload::Conflict),
                    Err(reason) => Reconciliation::Invalid(reason),
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to store new account");
                Reconciliation::Invalid(InvalidPayload::StoreUnavailable)
            }
        }
    }

    async fn lookup(&self, claims: &Claims<'_>) -> Result<Option<Account>, InvalidPayload> {
        self.accounts
            .find_by_identity(claims.provider, claims.uid)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "failed to look up identity");
                InvalidPayload::StoreUnavailable
            })
    }
}
