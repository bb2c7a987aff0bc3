//! Accounts and identity-provider sign-in for crewboard.
//!
//! This crate provides:
//! - The local `Account` with its validation rules and sign-in tracking
//! - `AuthPayload`, the data an identity provider reports after login
//! - `IdentityReconciler`, which maps a payload onto an existing or new account
//! - `CallbackHandler`, which turns a provider callback into a sign-in,
//!   a registration prompt or a rejection
//! - Capability traits for credentials, confirmation and sessions, plus
//!   store traits with in-memory implementations
//! - Organization memberships and the `admin_of` / `member_of` checks
//!
//! # Email trust
//!
//! Accounts created from a provider are confirmed immediately only when the
//! provider vouches for the email address:
//!
//! ```
//! use crewboard_identity::{AuthPayload, ProviderEmailTrust};
//! use serde_json::json;
//!
//! let google = AuthPayload::new("google_oauth2", "123456")
//!     .with_email(Some("test@example.com".to_string()))
//!     .with_extra(Some(json!({ "raw_info": { "email_verified": "true" } })));
//! assert!(ProviderEmailTrust::email_verified_by_provider(&google));
//!
//! let github = AuthPayload::new("github", "654321")
//!     .with_email(Some("github@example.com".to_string()));
//! assert!(ProviderEmailTrust::email_verified_by_provider(&github));
//! ```

pub mod account;
pub mod callback;
pub mod confirmation;
pub mod credential;
pub mod error;
pub mod membership;
pub mod memory;
pub mod messages;
pub mod payload;
pub mod provider;
pub mod reconcile;
pub mod session;
pub mod store;

pub use account::{Account, NAME_MAX_CHARS, SignInActivity, is_valid_email, normalize_email};
pub use callback::{
    CallbackHandler, CallbackOutcome, CallbackRoutes, Flash, ProviderException, ProviderFailure,
};
pub use confirmation::{ConfirmationTracker, ProviderEmailTrust};
pub use credential::{Argon2CredentialVerifier, CredentialVerifier, PasswordCredential};
pub use error::{CredentialError, SessionError, StoreError};
pub use membership::{MembershipRole, MembershipStore, OrganizationMembership};
pub use memory::{MemoryAccountStore, MemoryMembershipStore, MemorySessionStore};
pub use messages::MessageCatalog;
pub use payload::{AuthInfo, AuthPayload};
pub use provider::{ProviderKind, UnknownProvider};
pub use reconcile::{IdentityReconciler, InvalidPayload, Reconciliation};
pub use session::{Session, SessionId, SessionIssuer, SessionStore, StoredSessionIssuer};
pub use store::AccountStore;
