//! Cookies carried between the sign-in redirects.
//!
//! Structured values are stored as URL-safe base64 JSON so they survive
//! cookie encoding unchanged.

use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use crewboard_identity::{AuthPayload, Flash, ProviderKind};
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use time::Duration as TimeDuration;

use super::client::AuthorizationState;

/// Session cookie name.
pub const SESSION_COOKIE: &str = "session";

/// Authorization state cookie (CSRF protection during the provider flow).
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";

/// One-shot message for the next page.
pub const FLASH_COOKIE: &str = "flash";

/// Provider payload awaiting manual registration.
pub const PENDING_REGISTRATION_COOKIE: &str = "oauth_data";

/// Lifetime of the authorization state cookie.
pub const OAUTH_STATE_MAX_AGE: TimeDuration = TimeDuration::minutes(10);

/// Lifetime of the pending registration cookie.
pub const PENDING_REGISTRATION_MAX_AGE: TimeDuration = TimeDuration::hours(1);

/// Authorization state plus the provider it was issued for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingAuthorization {
    pub provider: ProviderKind,
    #[serde(flatten)]
    pub state: AuthorizationState,
}

pub(crate) fn encode<T: Serialize>(value: &T) -> Option<String> {
    serde_json::to_vec(value)
        .ok()
        .map(|json| URL_SAFE_NO_PAD.encode(json))
}

pub(crate) fn decode<T: DeserializeOwned>(raw: &str) -> Option<T> {
    let json = URL_SAFE_NO_PAD.decode(raw).ok()?;
    serde_json::from_slice(&json).ok()
}

/// Builds an HTTP-only cookie scoped to the whole site.
pub fn build(
    name: &'static str,
    value: String,
    secure: bool,
    max_age: Option<TimeDuration>,
) -> Cookie<'static> {
    let mut cookie = Cookie::build((name, value))
        .path("/")
        .http_only(true)
        .secure(secure)
        .same_site(SameSite::Lax);
    if let Some(max_age) = max_age {
        cookie = cookie.max_age(max_age);
    }
    cookie.build()
}

/// A cookie that clears `name` in the browser.
pub fn removal(name: &'static str) -> Cookie<'static> {
    Cookie::build((name, ""))
        .path("/")
        .max_age(TimeDuration::ZERO)
        .build()
}

/// Reads and decodes a structured cookie value.
pub fn read<T: DeserializeOwned>(jar: &CookieJar, name: &str) -> Option<T> {
    jar.get(name).and_then(|cookie| decode(cookie.value()))
}

/// Stores `flash` for the next request. An empty flash clears the cookie.
pub fn set_flash(jar: CookieJar, flash: &Flash, secure: bool) -> CookieJar {
    match encode(flash).filter(|_| !flash.is_empty()) {
        Some(value) => jar.add(build(FLASH_COOKIE, value, secure, None)),
        None => jar.add(removal(FLASH_COOKIE)),
    }
}

/// Reads the flash and clears it.
pub fn take_flash(jar: CookieJar) -> (CookieJar, Flash) {
    let flash = read(&jar, FLASH_COOKIE).unwrap_or_default();
    (jar.add(removal(FLASH_COOKIE)), flash)
}

/// Holds a provider payload until the registration step.
///
/// Provider metadata is stripped before the payload is written.
pub fn stash_pending(jar: CookieJar, payload: &AuthPayload, secure: bool) -> CookieJar {
    match encode(&payload.without_extra()) {
        Some(value) => jar.add(build(
            PENDING_REGISTRATION_COOKIE,
            value,
            secure,
            Some(PENDING_REGISTRATION_MAX_AGE),
        )),
        None => jar,
    }
}

/// Reads the pending payload and clears it.
pub fn take_pending(jar: CookieJar) -> (CookieJar, Option<AuthPayload>) {
    let pending = read(&jar, PENDING_REGISTRATION_COOKIE);
    (jar.add(removal(PENDING_REGISTRATION_COOKIE)), pending)
}
