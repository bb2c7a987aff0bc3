//! The local account and its validation rules.
//!
//! An account is created either by registration or by reconciling an
//! identity-provider payload. Accounts created from a provider carry the
//! `(provider, uid)` pair that identified them.

use chrono::{DateTime, Utc};
use crewboard_core::AccountId;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::LazyLock;

use crate::credential::PasswordCredential;

/// Maximum number of characters in an account name.
pub const NAME_MAX_CHARS: usize = 100;

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .expect("email pattern compiles")
});

/// Returns true if `email` is a syntactically valid address.
#[must_use]
pub fn is_valid_email(email: &str) -> bool {
    EMAIL_REGEX.is_match(email)
}

/// Canonical form used for storage and case-insensitive comparison.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Sign-in bookkeeping, updated every time a session is issued.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignInActivity {
    pub sign_in_count: i32,
    pub current_sign_in_at: Option<DateTime<Utc>>,
    pub last_sign_in_at: Option<DateTime<Utc>>,
    pub current_sign_in_ip: Option<String>,
    pub last_sign_in_ip: Option<String>,
}

impl SignInActivity {
    /// Records a sign-in: the current values move to `last_*`.
    pub fn record(&mut self, at: DateTime<Utc>, ip: Option<String>) {
        self.last_sign_in_at = self.current_sign_in_at.take().or(Some(at));
        self.last_sign_in_ip = self.current_sign_in_ip.take().or_else(|| ip.clone());
        self.current_sign_in_at = Some(at);
        self.current_sign_in_ip = ip;
        self.sign_in_count += 1;
    }
}

/// A local user account.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    id: AccountId,
    email: String,
    name: String,
    password: PasswordCredential,
    provider: Option<String>,
    uid: Option<String>,
    confirmed_at: Option<DateTime<Utc>>,
    avatar: Option<String>,
    sign_ins: SignInActivity,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Account {
    /// Creates a new, unconfirmed account without a provider identity.
    ///
    /// The email is stored in its normalized (trimmed, lowercase) form.
    #[must_use]
    pub fn new(email: &str, name: impl Into<String>, password: PasswordCredential) -> Self {
        let now = Utc::now();
        Self {
            id: AccountId::new(),
            email: normalize_email(email),
            name: name.into(),
            password,
            provider: None,
            uid: None,
            confirmed_at: None,
            avatar: None,
            sign_ins: SignInActivity::default(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Reconstitutes an account from storage.
    #[must_use]
    #[expect(clippy::too_many_arguments)]
    pub fn with_all_fields(
        id: AccountId,
        email: String,
        name: String,
        password: PasswordCredential,
        provider: Option<String>,
        uid: Option<String>,
        confirmed_at: Option<DateTime<Utc>>,
        avatar: Option<String>,
        sign_ins: SignInActivity,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            email,
            name,
            password,
            provider,
            uid,
            confirmed_at,
            avatar,
            sign_ins,
            created_at,
            updated_at,
        }
    }

    /// Attaches the identity-provider pair that identifies this account.
    #[must_use]
    pub fn with_identity(mut self, provider: impl Into<String>, uid: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self.uid = Some(uid.into());
        self
    }

    /// Sets the avatar reference.
    #[must_use]
    pub fn with_avatar(mut self, avatar: Option<String>) -> Self {
        self.avatar = avatar;
        self
    }

    /// Sets the confirmation timestamp.
    #[must_use]
    pub fn with_confirmed_at(mut self, confirmed_at: Option<DateTime<Utc>>) -> Self {
        self.confirmed_at = confirmed_at;
        self
    }

    #[must_use]
    pub fn id(&self) -> AccountId {
        self.id
    }

    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn password(&self) -> &PasswordCredential {
        &self.password
    }

    #[must_use]
    pub fn provider(&self) -> Option<&str> {
        self.provider.as_deref()
    }

    #[must_use]
    pub fn uid(&self) -> Option<&str> {
        self.uid.as_deref()
    }

    #[must_use]
    pub fn confirmed_at(&self) -> Option<DateTime<Utc>> {
        self.confirmed_at
    }

    /// Returns true once the email address has been confirmed.
    #[must_use]
    pub fn is_confirmed(&self) -> bool {
        self.confirmed_at.is_some()
    }

    #[must_use]
    pub fn avatar(&self) -> Option<&str> {
        self.avatar.as_deref()
    }

    #[must_use]
    pub fn sign_ins(&self) -> &SignInActivity {
        &self.sign_ins
    }

    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[must_use]
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Records a successful sign-in.
    pub fn record_sign_in(&mut self, at: DateTime<Utc>, ip: Option<String>) {
        self.sign_ins.record(at, ip);
        self.updated_at = Utc::now();
    }

    /// Checks the record-level invariants.
    ///
    /// Returns the full messages for every failed rule; an empty vector means
    /// the account is valid. Uniqueness is enforced by the store, not here.
    #[must_use]
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.name.trim().is_empty() {
            errors.push("Name can't be blank".to_string());
        } else if self.name.chars().count() > NAME_MAX_CHARS {
            errors.push(format!(
                "Name is too long (maximum is {NAME_MAX_CHARS} characters)"
            ));
        }

        if self.email.is_empty() {
            errors.push("Email can't be blank".to_string());
        } else if !is_valid_email(&self.email) {
            errors.push("Email is invalid".to_string());
        }

        errors
    }
}

impl fmt::Debug for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Account")
            .field("id", &self.id)
            .field("email", &self.email)
            .field("name", &self.name)
            .field("provider", &self.provider)
            .field("uid", &self.uid)
            .field("confirmed_at", &self.confirmed_at)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(email: &str, name: &str) -> Account {
        Account::new(email, name, PasswordCredential::from_digest("digest"))
    }

    #[test]
    fn email_syntax() {
        assert!(is_valid_email("test@example.com"));
        assert!(is_valid_email("first.last+tag@sub.example.co"));
        assert!(is_valid_email("user@localhost"));
        assert!(!is_valid_email("invalid-email"));
        assert!(!is_valid_email("@example.com"));
        assert!(!is_valid_email("user@-example.com"));
        assert!(!is_valid_email("user@example.com "));
        assert!(!is_valid_email(""));
    }

    #[test]
    fn new_account_normalizes_email() {
        let account = account("  Mixed@Example.COM ", "Mixed");
        assert_eq!(account.email(), "mixed@example.com");
        assert!(!account.is_confirmed());
        assert!(account.provider().is_none());
    }

    #[test]
    fn identity_and_confirmation_builders() {
        let now = Utc::now();
        let account = account("a@example.com", "A")
            .with_identity("github", "42")
            .with_avatar(Some("https://example.com/a.png".to_string()))
            .with_confirmed_at(Some(now));

        assert_eq!(account.provider(), Some("github"));
        assert_eq!(account.uid(), Some("42"));
        assert_eq!(account.avatar(), Some("https://example.com/a.png"));
        assert_eq!(account.confirmed_at(), Some(now));
    }

    #[test]
    fn valid_account_has_no_errors() {
        assert!(account("a@example.com", "Alice").validate().is_empty());
    }

    #[test]
    fn blank_name_is_rejected() {
        let errors = account("a@example.com", "   ").validate();
        assert_eq!(errors, vec!["Name can't be blank"]);
    }

    #[test]
    fn name_length_counts_characters() {
        let at_limit = "é".repeat(NAME_MAX_CHARS);
        assert!(account("a@example.com", &at_limit).validate().is_empty());

        let too_long = "x".repeat(NAME_MAX_CHARS + 1);
        let errors = account("a@example.com", &too_long).validate();
        assert_eq!(
            errors,
            vec!["Name is too long (maximum is 100 characters)"]
        );
    }

    #[test]
    fn bad_email_is_rejected() {
        assert_eq!(account("", "A").validate(), vec!["Email can't be blank"]);
        assert_eq!(account("nope", "A").validate(), vec!["Email is invalid"]);
    }

    #[test]
    fn sign_in_moves_current_to_last() {
        let mut activity = SignInActivity::default();
        let first = Utc::now() - chrono::Duration::hours(1);
        let second = Utc::now();

        activity.record(first, Some("10.0.0.1".to_string()));
        assert_eq!(activity.sign_in_count, 1);
        assert_eq!(activity.last_sign_in_at, Some(first));
        assert_eq!(activity.current_sign_in_ip.as_deref(), Some("10.0.0.1"));

        activity.record(second, Some("10.0.0.2".to_string()));
        assert_eq!(activity.sign_in_count, 2);
        assert_eq!(activity.current_sign_in_at, Some(second));
        assert_eq!(activity.last_sign_in_at, Some(first));
        assert_eq!(activity.last_sign_in_ip.as_deref(), Some("10.0.0.1"));
        assert_eq!(activity.current_sign_in_ip.as_deref(), Some("10.0.0.2"));
    }

    #[test]
    fn debug_omits_password() {
        let rendered = format!("{:?}", account("a@example.com", "A"));
        assert!(!rendered.contains("digest"));
    }
}
