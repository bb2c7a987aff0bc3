//! The identity-provider payload consumed by reconciliation.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Profile details the provider reports about the user.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

/// Data an identity provider reports after a completed login.
///
/// Every field is optional because providers are not trusted to send a
/// complete payload; reconciliation validates it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthPayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default)]
    pub info: AuthInfo,
    /// Provider-specific metadata, e.g. `{"raw_info": {"email_verified": true}}`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<Value>,
}

impl AuthPayload {
    /// Creates a payload for the given provider and provider-scoped uid.
    #[must_use]
    pub fn new(provider: impl Into<String>, uid: impl Into<String>) -> Self {
        Self {
            provider: Some(provider.into()),
            uid: Some(uid.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_email(mut self, email: Option<String>) -> Self {
        self.info.email = email;
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: Option<String>) -> Self {
        self.info.name = name;
        self
    }

    #[must_use]
    pub fn with_image(mut self, image: Option<String>) -> Self {
        self.info.image = image;
        self
    }

    #[must_use]
    pub fn with_extra(mut self, extra: Option<Value>) -> Self {
        self.extra = extra;
        self
    }

    /// Returns `value` if it contains anything other than whitespace.
    fn present(value: Option<&String>) -> Option<&str> {
        value.map(String::as_str).filter(|v| !v.trim().is_empty())
    }

    /// The provider name, if present and non-blank.
    #[must_use]
    pub fn provider(&self) -> Option<&str> {
        Self::present(self.provider.as_ref())
    }

    /// The provider-scoped uid, if present and non-blank.
    #[must_use]
    pub fn uid(&self) -> Option<&str> {
        Self::present(self.uid.as_ref())
    }

    /// The claimed email, if present and non-blank.
    #[must_use]
    pub fn email(&self) -> Option<&str> {
        Self::present(self.info.email.as_ref())
    }

    /// The claimed display name, if present and non-blank.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        Self::present(self.info.name.as_ref())
    }

    /// The claimed avatar URL, if present and non-blank.
    #[must_use]
    pub fn image(&self) -> Option<&str> {
        Self::present(self.info.image.as_ref())
    }

    /// Looks up a key under `extra`, first in `raw_info` then at the top level.
    #[must_use]
    pub fn extra_field(&self, key: &str) -> Option<&Value> {
        let extra = self.extra.as_ref()?;
        extra
            .get("raw_info")
            .and_then(|raw| raw.get(key))
            .or_else(|| extra.get(key))
    }

    /// Returns a copy without the provider-specific metadata.
    ///
    /// Used whenever the payload leaves the request, so provider internals
    /// are never written to the client.
    #[must_use]
    pub fn without_extra(&self) -> Self {
        Self {
            extra: None,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builder_sets_fields() {
        let payload = AuthPayload::new("google_oauth2", "123456")
            .with_email(Some("test@example.com".to_string()))
            .with_name(Some("Test User".to_string()))
            .with_image(Some("https://example.com/avatar.jpg".to_string()));

        assert_eq!(payload.provider(), Some("google_oauth2"));
        assert_eq!(payload.uid(), Some("123456"));
        assert_eq!(payload.email(), Some("test@example.com"));
        assert_eq!(payload.name(), Some("Test User"));
        assert_eq!(payload.image(), Some("https://example.com/avatar.jpg"));
    }

    #[test]
    fn blank_values_are_absent() {
        let payload = AuthPayload::new(" ", "")
            .with_email(Some("  ".to_string()))
            .with_name(Some(String::new()));

        assert!(payload.provider().is_none());
        assert!(payload.uid().is_none());
        assert!(payload.email().is_none());
        assert!(payload.name().is_none());
    }

    #[test]
    fn extra_field_prefers_raw_info() {
        let payload = AuthPayload::new("google_oauth2", "1").with_extra(Some(json!({
            "raw_info": { "email_verified": "true" },
            "email_verified": false
        })));
        assert_eq!(payload.extra_field("email_verified"), Some(&json!("true")));

        let flat = AuthPayload::new("google_oauth2", "1")
            .with_extra(Some(json!({ "email_verified": true })));
        assert_eq!(flat.extra_field("email_verified"), Some(&json!(true)));
        assert!(flat.extra_field("missing").is_none());
    }

    #[test]
    fn without_extra_drops_only_metadata() {
        let payload = AuthPayload::new("github", "654321")
            .with_email(Some("github@example.com".to_string()))
            .with_extra(Some(json!({ "raw_info": { "site_admin": false } })));

        let stripped = payload.without_extra();
        assert!(stripped.extra.is_none());
        assert_eq!(stripped.email(), Some("github@example.com"));

        let json = serde_json::to_value(&stripped).expect("serialize");
        assert!(json.get("extra").is_none());
    }

    #[test]
    fn deserializes_sparse_payload() {
        let payload: AuthPayload =
            serde_json::from_str(r#"{"uid":"123","info":{"email":"test@example.com"}}"#)
                .expect("deserialize");
        assert!(payload.provider().is_none());
        assert_eq!(payload.uid(), Some("123"));
    }
}
