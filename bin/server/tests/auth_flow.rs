//! End-to-end tests of the sign-in routes against in-memory stores.

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, Response, StatusCode, header},
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::Duration;
use crewboard_core::OrganizationId;
use crewboard_identity::{
    Account, AccountStore, Argon2CredentialVerifier, AuthPayload, CallbackHandler, Flash,
    MembershipRole, MembershipStore, MemoryAccountStore, MemoryMembershipStore,
    MemorySessionStore, OrganizationMembership, PasswordCredential, ProviderEmailTrust,
    ProviderKind, StoredSessionIssuer,
};
use crewboard_server::app;
use crewboard_server::auth::{
    AppState, AuthProviderClient, AuthorizationState, ProviderError, ProviderRegistry,
};
use crewboard_server::config::SessionConfig;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;

const AUTHORIZE_URL: &str = "https://provider.example/authorize";
const CSRF_TOKEN: &str = "csrf-token";

/// Provider client that answers every code exchange with a fixed result.
struct FakeProvider {
    kind: ProviderKind,
    result: Result<AuthPayload, ProviderError>,
}

#[async_trait]
impl AuthProviderClient for FakeProvider {
    fn kind(&self) -> ProviderKind {
        self.kind
    }

    fn authorization_url(&self) -> (String, AuthorizationState) {
        (
            format!("{AUTHORIZE_URL}?state={CSRF_TOKEN}"),
            AuthorizationState {
                csrf_token: CSRF_TOKEN.to_string(),
                pkce_verifier: "verifier".to_string(),
                nonce: None,
            },
        )
    }

    async fn fetch_payload(
        &self,
        code: &str,
        state: &AuthorizationState,
    ) -> Result<AuthPayload, ProviderError> {
        assert_eq!(code, "good-code");
        assert_eq!(state.pkce_verifier, "verifier");
        self.result.clone()
    }
}

struct Harness {
    accounts: Arc<MemoryAccountStore>,
    memberships: Arc<MemoryMembershipStore>,
    sessions: Arc<MemorySessionStore>,
    router: Router,
}

impl Harness {
    fn github(result: Result<AuthPayload, ProviderError>) -> Self {
        Self::new(ProviderRegistry::new().with(Arc::new(FakeProvider {
            kind: ProviderKind::GitHub,
            result,
        })))
    }

    fn new(providers: ProviderRegistry) -> Self {
        let accounts = Arc::new(MemoryAccountStore::new());
        let memberships = Arc::new(MemoryMembershipStore::new());
        let sessions = Arc::new(MemorySessionStore::new());

        let handler = CallbackHandler::new(
            accounts.clone(),
            Arc::new(Argon2CredentialVerifier::new()),
            Arc::new(ProviderEmailTrust::new()),
            Arc::new(StoredSessionIssuer::new(sessions.clone(), Duration::hours(1))),
        );
        let session_config = SessionConfig {
            duration_minutes: 60,
            cleanup_interval_seconds: 300,
            secure_cookies: false,
        };

        let state = Arc::new(AppState::new(
            accounts.clone(),
            memberships.clone(),
            sessions.clone(),
            providers,
            handler,
            session_config,
        ));

        Self {
            accounts,
            memberships,
            sessions,
            router: app::router(state),
        }
    }

    async fn get(&self, uri: &str, cookies: &HashMap<String, String>) -> Response<Body> {
        self.send("GET", uri, cookies).await
    }

    async fn send(
        &self,
        method: &str,
        uri: &str,
        cookies: &HashMap<String, String>,
    ) -> Response<Body> {
        let mut request = Request::builder().method(method).uri(uri);
        if !cookies.is_empty() {
            let header_value = cookies
                .iter()
                .map(|(name, value)| format!("{name}={value}"))
                .collect::<Vec<_>>()
                .join("; ");
            request = request.header(header::COOKIE, header_value);
        }
        self.router
            .clone()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    /// Runs the start step and returns the cookies it set.
    async fn start(&self, provider: &str) -> HashMap<String, String> {
        let response = self.get(&format!("/auth/{provider}"), &HashMap::new()).await;
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        set_cookies(&response)
    }

    /// Runs a full sign-in and returns the callback response.
    async fn sign_in(&self) -> Response<Body> {
        let cookies = self.start("github").await;
        self.get(
            &format!("/auth/github/callback?code=good-code&state={CSRF_TOKEN}"),
            &cookies,
        )
        .await
    }
}

/// Cookies set by a response, by name. Removals map to an empty value.
fn set_cookies(response: &Response<Body>) -> HashMap<String, String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .filter_map(|pair| pair.split_once('='))
        .map(|(name, value)| (name.trim().to_string(), value.trim().to_string()))
        .collect()
}

fn location(response: &Response<Body>) -> &str {
    response
        .headers()
        .get(header::LOCATION)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
}

fn flash(cookies: &HashMap<String, String>) -> Flash {
    let raw = cookies.get("flash").expect("flash cookie");
    let json = URL_SAFE_NO_PAD.decode(raw).expect("base64 flash");
    serde_json::from_slice(&json).expect("flash json")
}

async fn json_body(response: Response<Body>) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn github_payload() -> AuthPayload {
    AuthPayload::new("github", "654321")
        .with_email(Some("github@example.com".to_string()))
        .with_name(Some("GitHub User".to_string()))
        .with_extra(Some(json!({ "raw_info": { "login": "octocat" } })))
}

fn only(cookie: &str, cookies: &HashMap<String, String>) -> HashMap<String, String> {
    cookies
        .get(cookie)
        .map(|v| HashMap::from([(cookie.to_string(), v.clone())]))
        .unwrap_or_default()
}

#[tokio::test]
async fn start_redirects_to_provider_with_state_cookie() {
    let harness = Harness::github(Ok(github_payload()));
    let response = harness.get("/auth/github", &HashMap::new()).await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).starts_with(AUTHORIZE_URL));
    let cookies = set_cookies(&response);
    assert!(!cookies.get("oauth_state").expect("state cookie").is_empty());
}

#[tokio::test]
async fn unknown_provider_is_not_found() {
    let harness = Harness::github(Ok(github_payload()));
    let response = harness.get("/auth/myspace", &HashMap::new()).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unconfigured_provider_is_not_implemented() {
    let harness = Harness::github(Ok(github_payload()));
    let response = harness.get("/auth/google_oauth2", &HashMap::new()).await;
    assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);

    let response = harness
        .get("/auth/google_oauth2/callback?code=x&state=y", &HashMap::new())
        .await;
    assert_eq!(response.status(), StatusCode::NOT_IMPLEMENTED);
}

#[tokio::test]
async fn providers_lists_configured_only() {
    let harness = Harness::github(Ok(github_payload()));
    let response = harness.get("/auth/providers", &HashMap::new()).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(
        body,
        json!({
            "providers": [
                { "name": "github", "display_name": "GitHub", "start_path": "/auth/github" }
            ]
        })
    );
}

#[tokio::test]
async fn callback_creates_account_and_signs_in() {
    let harness = Harness::github(Ok(github_payload()));
    let response = harness.sign_in().await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");

    let cookies = set_cookies(&response);
    assert!(!cookies.get("session").expect("session cookie").is_empty());
    assert_eq!(cookies.get("oauth_state").map(String::as_str), Some(""));
    assert_eq!(
        flash(&cookies).notice.as_deref(),
        Some("Successfully authenticated from GitHub account.")
    );
    assert_eq!(harness.accounts.len(), 1);
    assert_eq!(harness.sessions.len(), 1);

    let me = harness.get("/users/me", &only("session", &cookies)).await;
    assert_eq!(me.status(), StatusCode::OK);
    let body = json_body(me).await;
    assert_eq!(body["email"], "github@example.com");
    assert_eq!(body["name"], "GitHub User");
    assert_eq!(body["provider"], "github");
    assert_eq!(body["confirmed"], true);
    assert_eq!(body["sign_in_count"], 1);
}

#[tokio::test]
async fn repeat_sign_in_reuses_account() {
    let harness = Harness::github(Ok(github_payload()));
    harness.sign_in().await;
    let response = harness.sign_in().await;

    assert_eq!(location(&response), "/");
    assert_eq!(harness.accounts.len(), 1);
    assert_eq!(harness.sessions.len(), 2);
}

#[tokio::test]
async fn taken_email_hands_off_to_registration() {
    let harness = Harness::github(Ok(github_payload()));
    harness
        .accounts
        .insert(&Account::new(
            "GitHub@Example.com",
            "Someone Else",
            PasswordCredential::from_digest("digest"),
        ))
        .await
        .unwrap();

    let response = harness.sign_in().await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/users/sign_up");

    let cookies = set_cookies(&response);
    assert!(!cookies.contains_key("session"));
    assert!(!cookies.get("oauth_data").expect("pending cookie").is_empty());
    assert_eq!(harness.accounts.len(), 1);

    let mut handoff = only("oauth_data", &cookies);
    handoff.extend(only("flash", &cookies));
    let sign_up = harness.get("/users/sign_up", &handoff).await;
    assert_eq!(sign_up.status(), StatusCode::OK);
    assert_eq!(
        set_cookies(&sign_up).get("oauth_data").map(String::as_str),
        Some("")
    );

    let body = json_body(sign_up).await;
    assert_eq!(body["alert"], "Email has already been taken");
    assert_eq!(body["prefill"]["info"]["email"], "github@example.com");
    assert_eq!(body["prefill"]["uid"], "654321");
    assert!(body["prefill"].get("extra").is_none());
}

#[tokio::test]
async fn payload_without_uid_is_rejected() {
    let payload = AuthPayload::new("github", "")
        .with_email(Some("github@example.com".to_string()));
    let harness = Harness::github(Ok(payload));

    let response = harness.sign_in().await;
    assert_eq!(location(&response), "/users/sign_up");

    let cookies = set_cookies(&response);
    assert_eq!(flash(&cookies).alert.as_deref(), Some("Invalid credentials"));
    assert!(!cookies.contains_key("oauth_data"));
    assert!(harness.accounts.is_empty());
}

#[tokio::test]
async fn provider_error_becomes_failure_alert() {
    let harness = Harness::github(Err(ProviderError::invalid_credentials(
        "TokenExchange",
        "bad_verification_code",
    )));

    let response = harness.sign_in().await;
    assert_eq!(location(&response), "/");
    assert_eq!(
        flash(&set_cookies(&response)).alert.as_deref(),
        Some("Could not authenticate you from GitHub because \"Invalid credentials\".")
    );
    assert!(harness.accounts.is_empty());
}

#[tokio::test]
async fn state_mismatch_is_rejected_as_csrf() {
    let harness = Harness::github(Ok(github_payload()));
    let cookies = harness.start("github").await;

    let response = harness
        .get("/auth/github/callback?code=good-code&state=forged", &cookies)
        .await;
    assert_eq!(location(&response), "/");
    assert_eq!(
        flash(&set_cookies(&response)).alert.as_deref(),
        Some(
            "Could not authenticate you from GitHub because \"The login request could not be verified\"."
        )
    );
    assert!(harness.accounts.is_empty());
}

#[tokio::test]
async fn missing_state_cookie_is_rejected_as_csrf() {
    let harness = Harness::github(Ok(github_payload()));
    let response = harness
        .get(
            &format!("/auth/github/callback?code=good-code&state={CSRF_TOKEN}"),
            &HashMap::new(),
        )
        .await;

    let alert = flash(&set_cookies(&response)).alert.unwrap_or_default();
    assert!(alert.contains("could not be verified"));
    assert!(harness.sessions.is_empty());
}

#[tokio::test]
async fn provider_reported_error_is_shown() {
    let harness = Harness::github(Ok(github_payload()));
    let cookies = harness.start("github").await;

    let response = harness
        .get(
            "/auth/github/callback?error=access_denied&error_description=The+user+declined",
            &cookies,
        )
        .await;
    assert_eq!(location(&response), "/");
    assert_eq!(
        flash(&set_cookies(&response)).alert.as_deref(),
        Some("Could not authenticate you from GitHub because \"Access was denied\".")
    );
}

#[tokio::test]
async fn failure_endpoint_humanizes_unknown_reasons() {
    let harness = Harness::github(Ok(github_payload()));
    let response = harness
        .get(
            "/auth/failure?message=invalid_response&strategy=google_oauth2",
            &HashMap::new(),
        )
        .await;

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
    assert_eq!(
        flash(&set_cookies(&response)).alert.as_deref(),
        Some("Could not authenticate you from Google because \"Invalid response\".")
    );
}

#[tokio::test]
async fn logout_ends_session() {
    let harness = Harness::github(Ok(github_payload()));
    let session = only("session", &set_cookies(&harness.sign_in().await));
    assert_eq!(harness.sessions.len(), 1);

    let response = harness.send("POST", "/auth/logout", &session).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");

    let cookies = set_cookies(&response);
    assert_eq!(cookies.get("session").map(String::as_str), Some(""));
    assert_eq!(
        flash(&cookies).notice.as_deref(),
        Some("Signed out successfully.")
    );
    assert!(harness.sessions.is_empty());

    let me = harness.get("/users/me", &session).await;
    assert_eq!(me.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn me_requires_session() {
    let harness = Harness::github(Ok(github_payload()));
    let response = harness.get("/users/me", &HashMap::new()).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let bogus = HashMap::from([("session".to_string(), "nope".to_string())]);
    let response = harness.get("/users/me", &bogus).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn signed_in_user_skips_registration() {
    let harness = Harness::github(Ok(github_payload()));
    let session = only("session", &set_cookies(&harness.sign_in().await));

    let response = harness.get("/users/sign_up", &session).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(location(&response), "/");
}

#[tokio::test]
async fn organization_access_reflects_memberships() {
    let harness = Harness::github(Ok(github_payload()));
    let session = only("session", &set_cookies(&harness.sign_in().await));
    let account = harness
        .accounts
        .find_by_identity("github", "654321")
        .await
        .unwrap()
        .expect("account");

    let administered = OrganizationId::new();
    let joined = OrganizationId::new();
    let foreign = OrganizationId::new();
    harness
        .memberships
        .add(&OrganizationMembership::new(
            account.id(),
            administered,
            MembershipRole::Admin,
        ))
        .await
        .unwrap();
    harness
        .memberships
        .add(&OrganizationMembership::new(
            account.id(),
            joined,
            MembershipRole::Member,
        ))
        .await
        .unwrap();

    let check = |org: OrganizationId| {
        let session = session.clone();
        let harness = &harness;
        async move {
            let response = harness
                .get(&format!("/organizations/{org}/access"), &session)
                .await;
            assert_eq!(response.status(), StatusCode::OK);
            let body = json_body(response).await;
            (body["member"].clone(), body["admin"].clone())
        }
    };

    assert_eq!(check(administered).await, (json!(true), json!(true)));
    assert_eq!(check(joined).await, (json!(true), json!(false)));
    assert_eq!(check(foreign).await, (json!(false), json!(false)));

    let me = json_body(harness.get("/users/me", &session).await).await;
    assert_eq!(me["memberships"].as_array().map(Vec::len), Some(2));

    let response = harness
        .get("/organizations/not-an-id/access", &session)
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
