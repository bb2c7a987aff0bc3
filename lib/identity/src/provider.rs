//! Identity providers the platform knows how to talk to.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A supported identity provider.
///
/// The wire name is what appears in callback paths and in payloads;
/// the display name is used in user-facing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    #[serde(rename = "google_oauth2")]
    Google,
    #[serde(rename = "github")]
    GitHub,
}

impl ProviderKind {
    /// All supported providers.
    pub const ALL: [ProviderKind; 2] = [ProviderKind::Google, ProviderKind::GitHub];

    /// The name used in routes and payloads.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Google => "google_oauth2",
            Self::GitHub => "github",
        }
    }

    /// The human-facing provider name.
    #[must_use]
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Google => "Google",
            Self::GitHub => "GitHub",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned for an unknown provider name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownProvider(pub String);

impl fmt::Display for UnknownProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown identity provider '{}'", self.0)
    }
}

impl std::error::Error for UnknownProvider {}

impl FromStr for ProviderKind {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google_oauth2" | "google" => Ok(Self::Google),
            "github" => Ok(Self::GitHub),
            other => Err(UnknownProvider(other.to_string())),
        }
    }
}
