//! HTTP routing.

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::auth::{AppState, routes};

/// Builds the application router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/auth/providers", get(routes::providers))
        .route("/auth/failure", get(routes::failure))
        .route("/auth/logout", post(routes::logout).get(routes::logout))
        .route("/auth/{provider}", get(routes::start).post(routes::start))
        .route("/auth/{provider}/callback", get(routes::callback))
        .route("/users/sign_up", get(routes::sign_up))
        .route("/users/me", get(routes::me))
        .route(
            "/organizations/{organization_id}/access",
            get(routes::organization_access),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
