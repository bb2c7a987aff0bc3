//! Error types for the identity crate.
//!
//! - `StoreError`: persistence failures, with uniqueness conflicts split out
//!   so reconciliation can react to them
//! - `CredentialError`: failures generating or hashing credentials
//! - `SessionError`: failures issuing or loading sessions

use std::fmt;

/// Errors from account, membership and session stores.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Another account already uses this `(provider, uid)` pair.
    DuplicateIdentity { provider: String, uid: String },
    /// Another account already uses this email (case-insensitive).
    DuplicateEmail { email: String },
    /// The account already belongs to this organization.
    DuplicateMembership {
        account_id: String,
        organization_id: String,
    },
    /// The record to update does not exist.
    NotFound { id: String },
    /// The backing store failed.
    Unavailable { details: String },
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateIdentity { provider, uid } => {
                write!(f, "identity {provider}/{uid} is already linked to an account")
            }
            Self::DuplicateEmail { email } => {
                write!(f, "email '{email}' is already taken")
            }
            Self::DuplicateMembership {
                account_id,
                organization_id,
            } => {
                write!(
                    f,
                    "account {account_id} is already a member of {organization_id}"
                )
            }
            Self::NotFound { id } => write!(f, "record '{id}' not found"),
            Self::Unavailable { details } => write!(f, "store unavailable: {details}"),
        }
    }
}

impl std::error::Error for StoreError {}

/// Errors from credential generation and hashing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CredentialError {
    /// The operating system could not supply randomness.
    Randomness { reason: String },
    /// The password hasher rejected its input.
    Hashing { reason: String },
}

impl fmt::Display for CredentialError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Randomness { reason } => write!(f, "randomness unavailable: {reason}"),
            Self::Hashing { reason } => write!(f, "credential hashing failed: {reason}"),
        }
    }
}

impl std::error::Error for CredentialError {}

/// Errors from session operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Session not found.
    NotFound { session_id: String },
    /// Session has expired.
    Expired { session_id: String },
    /// Session storage failed.
    Storage { details: String },
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { session_id } => write!(f, "session '{session_id}' not found"),
            Self::Expired { session_id } => write!(f, "session '{session_id}' has expired"),
            Self::Storage { details } => write!(f, "session storage error: {details}"),
        }
    }
}

impl std::error::Error for SessionError {}
