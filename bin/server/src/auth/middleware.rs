//! Authentication extractors for Axum.

use axum::{
    extract::{FromRef, FromRequestParts},
    http::{StatusCode, request::Parts},
    response::{IntoResponse, Response},
};
use axum_extra::extract::CookieJar;
use crewboard_identity::{Account, Session, SessionId};
use std::sync::Arc;

use super::AppState;
use super::cookies::SESSION_COOKIE;

/// The signed-in account and the session that authenticated it.
#[derive(Debug, Clone)]
pub struct CurrentAccount {
    pub session: Session,
    pub account: Account,
}

/// Extractor for requiring a signed-in account.
pub struct RequireAuth(pub CurrentAccount);

impl<S> FromRequestParts<S> for RequireAuth
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = AuthRejection;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let app_state = Arc::<AppState>::from_ref(state);
        let jar = CookieJar::from_request_parts(parts, state)
            .await
            .map_err(|_| AuthRejection::InternalError)?;

        let session_cookie = jar
            .get(SESSION_COOKIE)
            .ok_or(AuthRejection::NotAuthenticated)?;
        let session_id = SessionId::from(session_cookie.value());

        let session = app_state
            .sessions
            .find_by_id(&session_id)
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "failed to load session");
                AuthRejection::InternalError
            })?
            .ok_or(AuthRejection::NotAuthenticated)?;

        if session.is_expired() {
            if let Err(e) = app_state.sessions.delete(&session_id).await {
                tracing::warn!(error = %e, "failed to delete expired session");
            }
            return Err(AuthRejection::SessionExpired);
        }

        let account = app_state
            .accounts
            .find_by_id(session.account_id())
            .await
            .map_err(|e| {
                tracing::error!(error = %e, "failed to load account");
                AuthRejection::InternalError
            })?
            .ok_or(AuthRejection::NotAuthenticated)?;

        Ok(RequireAuth(CurrentAccount { session, account }))
    }
}

/// Extractor for optionally getting the signed-in account.
pub struct OptionalAuth(pub Option<CurrentAccount>);

impl<S> FromRequestParts<S> for OptionalAuth
where
    Arc<AppState>: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match RequireAuth::from_request_parts(parts, state).await {
            Ok(RequireAuth(current)) => Ok(OptionalAuth(Some(current))),
            Err(_) => Ok(OptionalAuth(None)),
        }
    }
}

/// Rejection type for authentication extractors.
#[derive(Debug)]
pub enum AuthRejection {
    NotAuthenticated,
    SessionExpired,
    InternalError,
}

impl IntoResponse for AuthRejection {
    fn into_response(self) -> Response {
        match self {
            Self::NotAuthenticated => (StatusCode::UNAUTHORIZED, "Not signed in").into_response(),
            Self::SessionExpired => (StatusCode::UNAUTHORIZED, "Session expired").into_response(),
            Self::InternalError => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }
}
