//! crewboard web server.
//!
//! Serves sign-in through external identity providers, the registration
//! handoff for payloads that cannot become accounts on their own, and the
//! session-backed account endpoints.

pub mod app;
pub mod auth;
pub mod config;
