//! Authentication routes for provider sign-in, registration handoff and logout.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use crewboard_core::OrganizationId;
use crewboard_identity::{
    AuthPayload, CallbackOutcome, Flash, OrganizationMembership, ProviderFailure, ProviderKind,
    SessionId, messages,
};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::Arc;
use time::Duration as TimeDuration;

use super::AppState;
use super::client::AuthProviderClient;
use super::cookies::{
    self, OAUTH_STATE_COOKIE, OAUTH_STATE_MAX_AGE, PendingAuthorization, SESSION_COOKIE,
};
use super::middleware::{OptionalAuth, RequireAuth};

/// Query parameters on a provider callback.
#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    /// Set by the provider when the user declined or the request was bad.
    error: Option<String>,
    error_description: Option<String>,
}

/// Query parameters on the failure endpoint.
#[derive(Debug, Default, Deserialize)]
pub struct FailureQuery {
    message: Option<String>,
    strategy: Option<String>,
}

fn resolve_provider(
    state: &AppState,
    name: &str,
) -> Result<(ProviderKind, Arc<dyn AuthProviderClient>), AuthError> {
    let kind =
        ProviderKind::from_str(name).map_err(|_| AuthError::UnknownProvider(name.to_string()))?;
    let client = state
        .providers
        .get(kind)
        .ok_or(AuthError::ProviderNotConfigured(kind))?;
    Ok((kind, client))
}

/// Redirects the user to the identity provider.
pub async fn start(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    jar: CookieJar,
) -> Result<impl IntoResponse, AuthError> {
    let (kind, client) = resolve_provider(&state, &provider)?;
    let (auth_url, auth_state) = client.authorization_url();

    let value = cookies::encode(&PendingAuthorization {
        provider: kind,
        state: auth_state,
    })
    .ok_or_else(|| AuthError::Internal("failed to encode authorization state".to_string()))?;

    let cookie = cookies::build(
        OAUTH_STATE_COOKIE,
        value,
        state.session_config.secure_cookies,
        Some(OAUTH_STATE_MAX_AGE),
    );

    tracing::debug!(provider = %kind, "redirecting to identity provider");
    Ok((jar.add(cookie), Redirect::to(&auth_url)))
}

/// Handles the provider redirect back to the application.
#[tracing::instrument(skip_all)]
pub async fn callback(
    State(state): State<Arc<AppState>>,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
    headers: HeaderMap,
    jar: CookieJar,
) -> Result<Response, AuthError> {
    let (kind, client) = resolve_provider(&state, &provider)?;

    let pending: Option<PendingAuthorization> = cookies::read(&jar, OAUTH_STATE_COOKIE);
    let jar = jar.add(cookies::removal(OAUTH_STATE_COOKIE));

    let outcome = match complete(client.as_ref(), kind, &query, pending).await {
        Ok(payload) => {
            state
                .handler
                .handle_success(kind, Some(&payload), client_ip(&headers))
                .await
        }
        Err(failure) => state.handler.handle_failure(&failure),
    };

    Ok(finish(jar, &outcome, state.session_config.secure_cookies))
}

/// Validates the callback and fetches the payload from the provider.
async fn complete(
    client: &dyn AuthProviderClient,
    kind: ProviderKind,
    query: &CallbackQuery,
    pending: Option<PendingAuthorization>,
) -> Result<AuthPayload, ProviderFailure> {
    let failure = |error_type: &str| ProviderFailure::new(error_type).with_strategy(kind.as_str());

    if let Some(error) = query.error.as_deref() {
        let failure = failure(error);
        return Err(match query.error_description.as_deref() {
            Some(description) => failure.with_exception("ProviderCallback", description),
            None => failure,
        });
    }

    let pending = pending
        .filter(|p| p.provider == kind)
        .filter(|p| query.state.as_deref() == Some(p.state.csrf_token.as_str()))
        .ok_or_else(|| failure("csrf_detected"))?;

    let code = query
        .code
        .as_deref()
        .filter(|code| !code.is_empty())
        .ok_or_else(|| failure("invalid_credentials"))?;

    client
        .fetch_payload(code, &pending.state)
        .await
        .map_err(|e| e.into_failure(kind))
}

/// Writes the outcome's cookies and redirects.
fn finish(jar: CookieJar, outcome: &CallbackOutcome, secure: bool) -> Response {
    let jar = cookies::set_flash(jar, &outcome.flash(), secure);
    let jar = match outcome {
        CallbackOutcome::Authenticated { session, .. } => jar.add(cookies::build(
            SESSION_COOKIE,
            session.id().as_str().to_string(),
            secure,
            Some(TimeDuration::seconds(session.remaining().num_seconds())),
        )),
        CallbackOutcome::NeedsRegistration { pending, .. } => {
            cookies::stash_pending(jar, pending, secure)
        }
        CallbackOutcome::Rejected { .. } => jar,
    };
    (jar, Redirect::to(outcome.location())).into_response()
}

/// First address in `X-Forwarded-For`, else `X-Real-IP`.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    let header = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.split(',').next())
            .map(str::trim)
            .filter(|ip| !ip.is_empty())
    };
    header("x-forwarded-for")
        .or_else(|| header("x-real-ip"))
        .map(str::to_string)
}

/// Generic failure landing, e.g. `/auth/failure?message=access_denied&strategy=github`.
pub async fn failure(
    State(state): State<Arc<AppState>>,
    Query(query): Query<FailureQuery>,
    jar: CookieJar,
) -> Response {
    let mut failure =
        ProviderFailure::new(query.message.unwrap_or_else(|| "unknown_error".to_string()));
    if let Some(strategy) = query.strategy {
        failure = failure.with_strategy(strategy);
    }
    let outcome = state.handler.handle_failure(&failure);
    finish(jar, &outcome, state.session_config.secure_cookies)
}

#[derive(Debug, Serialize)]
struct ProviderEntry {
    name: &'static str,
    display_name: &'static str,
    start_path: String,
}

#[derive(Debug, Serialize)]
pub struct ProvidersResponse {
    providers: Vec<ProviderEntry>,
}

/// Lists the configured identity providers.
pub async fn providers(State(state): State<Arc<AppState>>) -> Json<ProvidersResponse> {
    let providers = state
        .providers
        .kinds()
        .into_iter()
        .map(|kind| ProviderEntry {
            name: kind.as_str(),
            display_name: kind.display_name(),
            start_path: format!("/auth/{kind}"),
        })
        .collect();
    Json(ProvidersResponse { providers })
}

#[derive(Debug, Serialize)]
pub struct SignUpResponse {
    #[serde(flatten)]
    flash: Flash,
    /// Provider data to prefill the form with, if a sign-in was handed off.
    prefill: Option<AuthPayload>,
}

/// Registration form data, consuming any handed-off provider payload.
pub async fn sign_up(
    State(state): State<Arc<AppState>>,
    OptionalAuth(current): OptionalAuth,
    jar: CookieJar,
) -> Response {
    if current.is_some() {
        return Redirect::to(&state.handler.routes().after_sign_in).into_response();
    }

    let (jar, flash) = cookies::take_flash(jar);
    let (jar, prefill) = cookies::take_pending(jar);
    (jar, Json(SignUpResponse { flash, prefill })).into_response()
}

/// Ends the current session.
pub async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> impl IntoResponse {
    if let Some(session_cookie) = jar.get(SESSION_COOKIE) {
        let session_id = SessionId::from(session_cookie.value());
        if let Err(e) = state.sessions.delete(&session_id).await {
            tracing::warn!(error = %e, "failed to delete session on logout");
        }
    }

    let notice = state.handler.messages().translate(messages::SIGNED_OUT, &[]);
    let jar = cookies::set_flash(
        jar.add(cookies::removal(SESSION_COOKIE)),
        &Flash::notice(notice),
        state.session_config.secure_cookies,
    );

    (jar, Redirect::to(&state.handler.routes().home))
}

#[derive(Debug, Serialize)]
pub struct AccountResponse {
    id: String,
    email: String,
    name: String,
    avatar: Option<String>,
    provider: Option<String>,
    confirmed: bool,
    sign_in_count: i32,
    memberships: Vec<OrganizationMembership>,
}

/// The signed-in account.
pub async fn me(
    State(state): State<Arc<AppState>>,
    RequireAuth(current): RequireAuth,
) -> Result<Json<AccountResponse>, AuthError> {
    let account = current.account;
    let memberships = state
        .memberships
        .list_for_account(account.id())
        .await
        .map_err(|e| AuthError::Store(e.to_string()))?;

    Ok(Json(AccountResponse {
        id: account.id().to_string(),
        email: account.email().to_string(),
        name: account.name().to_string(),
        avatar: account.avatar().map(str::to_string),
        provider: account.provider().map(str::to_string),
        confirmed: account.is_confirmed(),
        sign_in_count: account.sign_ins().sign_in_count,
        memberships,
    }))
}

#[derive(Debug, Serialize)]
pub struct OrganizationAccess {
    organization_id: String,
    member: bool,
    admin: bool,
}

/// Whether the signed-in account belongs to or administers an organization.
pub async fn organization_access(
    State(state): State<Arc<AppState>>,
    RequireAuth(current): RequireAuth,
    Path(organization_id): Path<String>,
) -> Result<Json<OrganizationAccess>, AuthError> {
    let organization_id = OrganizationId::from_str(&organization_id)
        .map_err(|_| AuthError::InvalidOrganization(organization_id))?;
    let store = state.memberships.as_ref();

    let member = current
        .account
        .member_of(store, organization_id)
        .await
        .map_err(|e| AuthError::Store(e.to_string()))?;
    let admin = current
        .account
        .admin_of(store, organization_id)
        .await
        .map_err(|e| AuthError::Store(e.to_string()))?;

    Ok(Json(OrganizationAccess {
        organization_id: organization_id.to_string(),
        member,
        admin,
    }))
}

/// Authentication errors.
#[derive(Debug)]
pub enum AuthError {
    UnknownProvider(String),
    ProviderNotConfigured(ProviderKind),
    InvalidOrganization(String),
    Store(String),
    Internal(String),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        match self {
            Self::UnknownProvider(name) => {
                (StatusCode::NOT_FOUND, format!("Unknown provider '{name}'")).into_response()
            }
            Self::ProviderNotConfigured(kind) => (
                StatusCode::NOT_IMPLEMENTED,
                format!("{} sign-in is not configured", kind.display_name()),
            )
                .into_response(),
            Self::InvalidOrganization(id) => (
                StatusCode::BAD_REQUEST,
                format!("Invalid organization id '{id}'"),
            )
                .into_response(),
            Self::Store(msg) => {
                tracing::error!("Store error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
            Self::Internal(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn client_ip_prefers_first_forwarded_address() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "x-forwarded-for",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        headers.insert("x-real-ip", HeaderValue::from_static("10.0.0.2"));
        assert_eq!(client_ip(&headers).as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn client_ip_falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.4"));
        assert_eq!(client_ip(&headers).as_deref(), Some("198.51.100.4"));
        assert!(client_ip(&HeaderMap::new()).is_none());
    }

    #[test]
    fn blank_forwarded_entry_falls_back_to_real_ip() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static(" , 10.0.0.1"));
        headers.insert("x-real-ip", HeaderValue::from_static("198.51.100.4"));
        assert_eq!(client_ip(&headers).as_deref(), Some("198.51.100.4"));
    }
}
