//! The seam between the callback routes and concrete identity providers.

use async_trait::async_trait;
use crewboard_identity::{AuthPayload, ProviderException, ProviderFailure, ProviderKind};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Data needed to complete an authorization-code exchange.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationState {
    pub csrf_token: String,
    pub pkce_verifier: String,
    /// Present for OpenID Connect providers only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
}

/// Failure while completing a login with a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    error_type: String,
    exception: Option<ProviderException>,
}

impl ProviderError {
    #[must_use]
    pub fn new(error_type: impl Into<String>) -> Self {
        Self {
            error_type: error_type.into(),
            exception: None,
        }
    }

    /// The provider rejected the code or returned an unusable identity.
    #[must_use]
    pub fn invalid_credentials(class: &str, message: impl Into<String>) -> Self {
        Self::new("invalid_credentials").with_exception(class, message)
    }

    /// The provider could not be reached or answered with an error.
    #[must_use]
    pub fn service_unavailable(class: &str, message: impl Into<String>) -> Self {
        Self::new("service_unavailable").with_exception(class, message)
    }

    /// The provider did not answer in time.
    #[must_use]
    pub fn timeout(class: &str, message: impl Into<String>) -> Self {
        Self::new("timeout").with_exception(class, message)
    }

    #[must_use]
    pub fn with_exception(mut self, class: &str, message: impl Into<String>) -> Self {
        self.exception = Some(ProviderException {
            class: class.to_string(),
            message: message.into(),
        });
        self
    }

    #[must_use]
    pub fn error_type(&self) -> &str {
        &self.error_type
    }

    #[must_use]
    pub fn exception(&self) -> Option<&ProviderException> {
        self.exception.as_ref()
    }

    /// Converts into the failure reported to the callback handler.
    #[must_use]
    pub fn into_failure(self, kind: ProviderKind) -> ProviderFailure {
        ProviderFailure {
            error_type: self.error_type,
            strategy: Some(kind.as_str().to_string()),
            exception: self.exception,
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.exception {
            Some(e) => write!(f, "{}: {} ({})", self.error_type, e.message, e.class),
            None => f.write_str(&self.error_type),
        }
    }
}

impl std::error::Error for ProviderError {}

/// Maps a `reqwest` failure onto a provider error.
pub(crate) fn transport_error(class: &str, e: &reqwest::Error) -> ProviderError {
    if e.is_timeout() {
        ProviderError::timeout(class, e.to_string())
    } else {
        ProviderError::service_unavailable(class, e.to_string())
    }
}

/// Errors building a provider client at startup.
#[derive(Debug)]
pub enum ProviderSetupError {
    /// Invalid URLs or credentials in the configuration.
    Configuration { details: String },
    /// Provider metadata could not be discovered.
    Discovery { details: String },
}

impl fmt::Display for ProviderSetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Configuration { details } => write!(f, "provider configuration error: {details}"),
            Self::Discovery { details } => write!(f, "provider discovery error: {details}"),
        }
    }
}

impl std::error::Error for ProviderSetupError {}

/// An identity provider that can run the authorization-code flow.
#[async_trait]
pub trait AuthProviderClient: Send + Sync {
    fn kind(&self) -> ProviderKind;

    /// Returns the URL to send the user to and the state to keep until the
    /// callback arrives.
    fn authorization_url(&self) -> (String, AuthorizationState);

    /// Exchanges the callback code and returns what the provider reports
    /// about the user.
    async fn fetch_payload(
        &self,
        code: &str,
        state: &AuthorizationState,
    ) -> Result<AuthPayload, ProviderError>;
}

/// Configured provider clients, keyed by provider.
#[derive(Clone, Default)]
pub struct ProviderRegistry {
    clients: HashMap<ProviderKind, Arc<dyn AuthProviderClient>>,
}

impl ProviderRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a client, replacing any previous client for its provider.
    #[must_use]
    pub fn with(mut self, client: Arc<dyn AuthProviderClient>) -> Self {
        self.clients.insert(client.kind(), client);
        self
    }

    #[must_use]
    pub fn get(&self, kind: ProviderKind) -> Option<Arc<dyn AuthProviderClient>> {
        self.clients.get(&kind).cloned()
    }

    /// Configured providers in a stable order.
    #[must_use]
    pub fn kinds(&self) -> Vec<ProviderKind> {
        ProviderKind::ALL
            .into_iter()
            .filter(|kind| self.clients.contains_key(kind))
            .collect()
    }
}
