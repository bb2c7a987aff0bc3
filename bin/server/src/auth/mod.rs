//! Authentication for the crewboard server.
//!
//! This module provides:
//! - Sign-in through Google (OpenID Connect) and GitHub (OAuth 2.0)
//! - PostgreSQL-backed account, membership and session storage
//! - Authentication extractors for Axum routes
//!
//! # Flow
//!
//! `GET /auth/{provider}` stores the authorization state in a short-lived
//! cookie and redirects to the provider. The provider redirects back to
//! `GET /auth/{provider}/callback`, where the state is checked, the code is
//! exchanged for a payload and the payload is handed to
//! [`CallbackHandler`]. The handler's outcome becomes a session cookie, a
//! registration handoff cookie, or a flash alert, followed by a redirect.

pub mod client;
pub mod cookies;
pub mod db;
pub mod github;
pub mod google;
pub mod middleware;
pub mod routes;

use crewboard_identity::{AccountStore, CallbackHandler, MembershipStore, SessionStore};
use std::sync::Arc;

use crate::config::SessionConfig;

pub use client::{AuthProviderClient, AuthorizationState, ProviderError, ProviderRegistry};
pub use github::GitHubClient;
pub use google::GoogleClient;
pub use middleware::{CurrentAccount, OptionalAuth, RequireAuth};

/// Shared application state.
pub struct AppState {
    pub accounts: Arc<dyn AccountStore>,
    pub memberships: Arc<dyn MembershipStore>,
    pub sessions: Arc<dyn SessionStore>,
    /// Configured identity providers.
    pub providers: ProviderRegistry,
    /// Turns provider callbacks into outcomes.
    pub handler: CallbackHandler,
    pub session_config: SessionConfig,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        memberships: Arc<dyn MembershipStore>,
        sessions: Arc<dyn SessionStore>,
        providers: ProviderRegistry,
        handler: CallbackHandler,
        session_config: SessionConfig,
    ) -> Self {
        Self {
            accounts,
            memberships,
            sessions,
            providers,
            handler,
            session_config,
        }
    }
}
