//! User-facing message catalog.
//!
//! Messages are looked up by dotted key and may contain `%{name}`
//! placeholders. Deployments can override any entry.

use std::collections::HashMap;

pub const OAUTH_SUCCESS: &str = "omniauth.success";
pub const OAUTH_FAILURE: &str = "omniauth.failure";
pub const OAUTH_INVALID_CREDENTIALS: &str = "omniauth.invalid_credentials";
pub const UNCONFIRMED: &str = "sign_in.unconfirmed";
pub const SIGN_IN_UNAVAILABLE: &str = "sign_in.unavailable";
pub const SIGNED_OUT: &str = "sign_out.success";

const DEFAULTS: &[(&str, &str)] = &[
    (OAUTH_SUCCESS, "Successfully authenticated from %{kind} account."),
    (
        OAUTH_FAILURE,
        "Could not authenticate you from %{kind} because \"%{reason}\".",
    ),
    (OAUTH_INVALID_CREDENTIALS, "Invalid credentials"),
    ("omniauth.access_denied", "Access was denied"),
    ("omniauth.csrf_detected", "The login request could not be verified"),
    ("omniauth.timeout", "The provider did not respond in time"),
    ("omniauth.service_unavailable", "The provider is unavailable"),
    (
        UNCONFIRMED,
        "You have to confirm your email address before continuing.",
    ),
    (
        SIGN_IN_UNAVAILABLE,
        "We could not sign you in right now. Please try again.",
    ),
    (SIGNED_OUT, "Signed out successfully."),
];

/// Turns a token like `invalid_credentials` into `Invalid credentials`.
#[must_use]
pub fn humanize(token: &str) -> String {
    let token = token.strip_suffix("_id").unwrap_or(token);
    let spaced = token.replace('_', " ").trim().to_lowercase();
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Dotted-key message lookup with `%{name}` interpolation.
#[derive(Debug, Clone)]
pub struct MessageCatalog {
    entries: HashMap<String, String>,
}

impl Default for MessageCatalog {
    fn default() -> Self {
        Self {
            entries: DEFAULTS
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        }
    }
}

impl MessageCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces or adds entries.
    #[must_use]
    pub fn with_overrides(mut self, overrides: HashMap<String, String>) -> Self {
        self.entries.extend(overrides);
        self
    }

    /// Returns the raw template for `key`, if defined.
    #[must_use]
    pub fn lookup(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Renders `key` with `args`, or `fallback` when the key is undefined.
    #[must_use]
    pub fn translate_or(&self, key: &str, args: &[(&str, &str)], fallback: &str) -> String {
        let template = self.lookup(key).unwrap_or(fallback);
        args.iter().fold(template.to_string(), |text, (name, value)| {
            text.replace(&format!("%{{{name}}}"), value)
        })
    }

    /// Renders `key` with `args`; an undefined key renders as the key itself.
    #[must_use]
    pub fn translate(&self, key: &str, args: &[(&str, &str)]) -> String {
        self.translate_or(key, args, key)
    }

    /// Message explaining a provider-side failure for `error_type`.
    ///
    /// Unknown error types fall back to the humanized token.
    #[must_use]
    pub fn failure_reason(&self, error_type: &str) -> String {
        self.translate_or(&format!("omniauth.{error_type}"), &[], &humanize(error_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn humanize_tokens() {
        assert_eq!(humanize("invalid_credentials"), "Invalid credentials");
        assert_eq!(humanize("CSRF_detected"), "Csrf detected");
        assert_eq!(humanize("user_id"), "User");
        assert_eq!(humanize(""), "");
    }

    #[test]
    fn success_names_the_provider() {
        let catalog = MessageCatalog::new();
        assert_eq!(
            catalog.translate(OAUTH_SUCCESS, &[("kind", "GitHub")]),
            "Successfully authenticated from GitHub account."
        );
    }

    #[test]
    fn failure_interpolates_both_placeholders() {
        let catalog = MessageCatalog::new();
        let text = catalog.translate(
            OAUTH_FAILURE,
            &[("kind", "Google"), ("reason", "Access was denied")],
        );
        assert_eq!(
            text,
            "Could not authenticate you from Google because \"Access was denied\"."
        );
    }

    #[test]
    fn known_failure_reason_is_localized() {
        assert_eq!(
            MessageCatalog::new().failure_reason("invalid_credentials"),
            "Invalid credentials"
        );
    }

    #[test]
    fn unknown_failure_reason_is_humanized() {
        assert_eq!(
            MessageCatalog::new().failure_reason("no_authorization_code"),
            "No authorization code"
        );
    }

    #[test]
    fn overrides_replace_defaults() {
        let catalog = MessageCatalog::new().with_overrides(HashMap::from([(
            OAUTH_SUCCESS.to_string(),
            "Welcome via %{kind}!".to_string(),
        )]));
        assert_eq!(
            catalog.translate(OAUTH_SUCCESS, &[("kind", "Google")]),
            "Welcome via Google!"
        );
    }

    #[test]
    fn missing_key_renders_key() {
        assert_eq!(MessageCatalog::new().translate("nope.nothing", &[]), "nope.nothing");
    }
}
