//! Centralized server configuration.
//!
//! This module provides strongly-typed configuration for the server,
//! loaded via the `config` crate from environment variables such as
//! `DATABASE_URL`, `SESSION__DURATION_MINUTES` or `GITHUB__CLIENT_ID`.

use chrono::Duration;
use crewboard_identity::{CallbackRoutes, MessageCatalog, ProviderEmailTrust};
use serde::Deserialize;
use std::collections::HashMap;

/// Server configuration.
#[derive(Debug, Deserialize)]
pub struct ServerConfig {
    /// PostgreSQL database connection URL.
    pub database_url: String,

    /// Address the HTTP listener binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Session configuration.
    #[serde(default)]
    pub session: SessionConfig,

    /// Email confirmation policy.
    #[serde(default)]
    pub confirmation: ConfirmationConfig,

    /// Redirect targets for sign-in outcomes.
    #[serde(default)]
    pub routes: CallbackRoutes,

    /// Overrides for user-facing messages, keyed like `omniauth.success`.
    #[serde(default)]
    pub messages: HashMap<String, String>,

    /// Google sign-in. Omitted when not configured.
    pub google: Option<ProviderConfig>,

    /// GitHub sign-in. Omitted when not configured.
    pub github: Option<ProviderConfig>,
}

/// Upper bound for configured durations: one hundred years.
const MAX_DURATION_MINUTES: i64 = 60 * 24 * 365 * 100;

/// Converts a configured minute count, rejecting values outside
/// `0..=MAX_DURATION_MINUTES`.
fn checked_minutes(key: &str, minutes: i64) -> Result<Duration, config::ConfigError> {
    if !(0..=MAX_DURATION_MINUTES).contains(&minutes) {
        return Err(config::ConfigError::Message(format!(
            "{key} must be between 0 and {MAX_DURATION_MINUTES}, got {minutes}"
        )));
    }
    Duration::try_minutes(minutes).ok_or_else(|| {
        config::ConfigError::Message(format!("{key} is out of range: {minutes}"))
    })
}

fn default_bind_addr() -> String {
    "127.0.0.1:3000".to_string()
}

/// Session-related configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    /// Session duration in minutes.
    #[serde(default = "default_session_duration_minutes")]
    pub duration_minutes: i64,

    /// Interval between session cleanup runs, in seconds.
    #[serde(default = "default_cleanup_interval_seconds")]
    pub cleanup_interval_seconds: u64,

    /// Whether to set the Secure flag on cookies (requires HTTPS).
    /// Set to false for local HTTP development.
    #[serde(default = "default_secure_cookies")]
    pub secure_cookies: bool,
}

fn default_session_duration_minutes() -> i64 {
    60 * 24 * 14
}

fn default_cleanup_interval_seconds() -> u64 {
    300
}

fn default_secure_cookies() -> bool {
    true
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            duration_minutes: default_session_duration_minutes(),
            cleanup_interval_seconds: default_cleanup_interval_seconds(),
            secure_cookies: default_secure_cookies(),
        }
    }
}

impl SessionConfig {
    /// Session lifetime, clamped to the accepted range.
    #[must_use]
    pub fn duration(&self) -> Duration {
        Duration::minutes(self.duration_minutes.clamp(0, MAX_DURATION_MINUTES))
    }
}

/// Email confirmation policy.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfirmationConfig {
    /// How long an unconfirmed account may still sign in after creation.
    #[serde(default)]
    pub unconfirmed_access_minutes: i64,
}

impl ConfirmationConfig {
    /// Builds the confirmation tracker for this policy.
    #[must_use]
    pub fn tracker(&self) -> ProviderEmailTrust {
        ProviderEmailTrust::new().with_unconfirmed_access(Duration::minutes(
            self.unconfirmed_access_minutes.clamp(0, MAX_DURATION_MINUTES),
        ))
    }
}

/// OAuth client registration for one identity provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    pub client_id: String,
    pub client_secret: String,
    /// Callback URL registered with the provider.
    pub redirect_uri: String,
    /// Space-separated scopes; provider defaults apply when unset.
    #[serde(default)]
    pub scopes: Option<String>,
    /// Issuer to discover, for OpenID Connect providers.
    #[serde(default)]
    pub issuer_url: Option<String>,
}

impl ProviderConfig {
    /// The configured scopes, or `defaults` when none are set.
    #[must_use]
    pub fn scopes_or(&self, defaults: &[&str]) -> Vec<String> {
        match self.scopes.as_deref().map(str::trim) {
            Some(scopes) if !scopes.is_empty() => {
                scopes.split_whitespace().map(str::to_string).collect()
            }
            _ => defaults.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required configuration is missing or invalid.
    pub fn from_env() -> Result<Self, config::ConfigError> {
        let config: Self = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects duration settings outside the accepted range.
    ///
    /// # Errors
    ///
    /// Returns an error naming the offending setting.
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        checked_minutes("session.duration_minutes", self.session.duration_minutes)?;
        checked_minutes(
            "confirmation.unconfirmed_access_minutes",
            self.confirmation.unconfirmed_access_minutes,
        )?;
        Ok(())
    }

    /// The message catalog with configured overrides applied.
    #[must_use]
    pub fn message_catalog(&self) -> MessageCatalog {
        MessageCatalog::new().with_overrides(self.messages.clone())
    }
}
