//! Email confirmation decisions.
//!
//! An account created from a provider is confirmed on the spot only when the
//! provider is trusted to have verified the address. Everyone else goes
//! through a separate confirmation step before getting full access.

use chrono::{DateTime, Duration, Utc};
use serde_json::Value;

use crate::account::Account;
use crate::payload::AuthPayload;
use crate::provider::ProviderKind;

/// Decides when an account counts as confirmed.
pub trait ConfirmationTracker: Send + Sync {
    /// Returns the confirmation timestamp a new account created from
    /// `payload` should carry, or `None` if it must stay unconfirmed.
    fn confirmation_for(&self, payload: &AuthPayload, now: DateTime<Utc>) -> Option<DateTime<Utc>>;

    /// Returns true if `account` may be signed in at `now`.
    fn may_sign_in(&self, account: &Account, now: DateTime<Utc>) -> bool;
}

/// Trusts the email address only when the provider vouches for it.
///
/// - Google: the `email_verified` flag must be `true` or `"true"`.
/// - GitHub: any reported email counts, since only verified addresses
///   are surfaced.
/// - Anything else: never trusted.
#[derive(Debug, Clone)]
pub struct ProviderEmailTrust {
    unconfirmed_access: Duration,
}

impl Default for ProviderEmailTrust {
    fn default() -> Self {
        Self {
            unconfirmed_access: Duration::zero(),
        }
    }
}

impl ProviderEmailTrust {
    /// Unconfirmed accounts may not sign in at all.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lets unconfirmed accounts sign in for `window` after creation.
    #[must_use]
    pub fn with_unconfirmed_access(mut self, window: Duration) -> Self {
        self.unconfirmed_access = window;
        self
    }

    /// Returns true if the provider vouches for the payload's email.
    #[must_use]
    pub fn email_verified_by_provider(payload: &AuthPayload) -> bool {
        match payload.provider().and_then(|p| p.parse::<ProviderKind>().ok()) {
            Some(ProviderKind::Google) => {
                matches!(
                    payload.extra_field("email_verified"),
                    Some(Value::Bool(true))
                ) || matches!(
                    payload.extra_field("email_verified"),
                    Some(Value::String(flag)) if flag == "true"
                )
            }
            Some(ProviderKind::GitHub) => payload.email().is_some(),
            None => false,
        }
    }
}

impl ConfirmationTracker for ProviderEmailTrust {
    fn confirmation_for(&self, payload: &AuthPayload, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        Self::email_verified_by_provider(payload).then_some(now)
    }

    fn may_sign_in(&self, account: &Account, now: DateTime<Utc>) -> bool {
        if account.is_confirmed() {
            return true;
        }
        // A window past the representable range never closes.
        match account.created_at().checked_add_signed(self.unconfirmed_access) {
            Some(deadline) => now < deadline,
            None => self.unconfirmed_access > Duration::zero(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credential::PasswordCredential;
    use serde_json::json;

    fn google(flag: Option<Value>) -> AuthPayload {
        AuthPayload::new("google_oauth2", "123")
            .with_email(Some("test@example.com".to_string()))
            .with_extra(flag.map(|f| json!({ "raw_info": { "email_verified": f } })))
    }

    #[test]
    fn google_trusts_boolean_true() {
        assert!(ProviderEmailTrust::email_verified_by_provider(&google(Some(
            json!(true)
        ))));
    }

    #[test]
    fn google_trusts_string_true() {
        assert!(ProviderEmailTrust::email_verified_by_provider(&google(Some(
            json!("true")
        ))));
    }

    #[test]
    fn google_distrusts_false_or_missing() {
        assert!(!ProviderEmailTrust::email_verified_by_provider(&google(
            Some(json!(false))
        )));
        assert!(!ProviderEmailTrust::email_verified_by_provider(&google(
            Some(json!("false"))
        )));
        assert!(!ProviderEmailTrust::email_verified_by_provider(&google(
            None
        )));
    }

    #[test]
    fn github_trusts_any_email() {
        let payload =
            AuthPayload::new("github", "654321").with_email(Some("gh@example.com".to_string()));
        assert!(ProviderEmailTrust::email_verified_by_provider(&payload));

        let no_email = AuthPayload::new("github", "654321");
        assert!(!ProviderEmailTrust::email_verified_by_provider(&no_email));
    }

    #[test]
    fn other_providers_are_untrusted() {
        let payload = AuthPayload::new("twitter", "1")
            .with_email(Some("t@example.com".to_string()))
            .with_extra(Some(json!({ "raw_info": { "email_verified": true } })));
        assert!(!ProviderEmailTrust::email_verified_by_provider(&payload));
    }

    #[test]
    fn confirmation_uses_supplied_clock() {
        let now = Utc::now();
        let tracker = ProviderEmailTrust::new();
        assert_eq!(
            tracker.confirmation_for(&google(Some(json!(true))), now),
            Some(now)
        );
        assert_eq!(tracker.confirmation_for(&google(None), now), None);
    }

    #[test]
    fn unconfirmed_access_window() {
        let account = Account::new("a@example.com", "A", PasswordCredential::from_digest("x"));
        let now = Utc::now();

        assert!(!ProviderEmailTrust::new().may_sign_in(&account, now));

        let lenient = ProviderEmailTrust::new().with_unconfirmed_access(Duration::days(2));
        assert!(lenient.may_sign_in(&account, now));
        assert!(!lenient.may_sign_in(&account, now + Duration::days(3)));

        let confirmed = account.with_confirmed_at(Some(now));
        assert!(ProviderEmailTrust::new().may_sign_in(&confirmed, now));
    }

    #[test]
    fn oversized_window_does_not_overflow() {
        let account = Account::new("a@example.com", "A", PasswordCredential::from_digest("x"));
        let now = Utc::now();

        let forever =
            ProviderEmailTrust::new().with_unconfirmed_access(Duration::minutes(100_000_000_000_000));
        assert!(forever.may_sign_in(&account, now));

        let never = ProviderEmailTrust::new()
            .with_unconfirmed_access(Duration::minutes(-100_000_000_000_000));
        assert!(!never.may_sign_in(&account, now));
    }
}
