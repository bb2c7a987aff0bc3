//! Core domain types shared by every crewboard crate.
//!
//! Only identifiers and the error-handling foundation live here; each crate
//! owns its domain-specific error types.

pub mod error;
pub mod id;

pub use error::Result;
pub use id::{AccountId, MembershipId, OrganizationId, ParseIdError};
