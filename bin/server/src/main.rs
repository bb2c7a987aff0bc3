use crewboard_identity::{
    Argon2CredentialVerifier, CallbackHandler, SessionStore, StoredSessionIssuer,
};
use crewboard_server::{
    app,
    auth::{
        AppState, GitHubClient, GoogleClient, ProviderRegistry,
        db::{PgAccountRepository, PgMembershipRepository, PgSessionRepository},
    },
    config::ServerConfig,
};
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration from environment
    let config = ServerConfig::from_env().expect("failed to load configuration");
    tracing::info!("Loaded configuration");

    // Create database connection pool
    let db_pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database_url)
        .await
        .expect("failed to connect to database");

    // Run migrations
    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations")
        .run(&db_pool)
        .await
        .expect("failed to run migrations");

    let accounts = Arc::new(PgAccountRepository::new(db_pool.clone()));
    let memberships = Arc::new(PgMembershipRepository::new(db_pool.clone()));
    let sessions: Arc<dyn SessionStore> = Arc::new(PgSessionRepository::new(db_pool));

    // Cleanup expired sessions on startup
    match sessions.delete_expired().await {
        Ok(count) if count > 0 => {
            tracing::info!(
                deleted_sessions = count,
                "Cleaned up expired sessions on startup"
            );
        }
        Ok(_) => {}
        Err(e) => {
            tracing::warn!(error = %e, "Failed to cleanup expired sessions on startup");
        }
    }

    // Spawn periodic session cleanup task
    let cleanup_sessions = sessions.clone();
    let cleanup_interval_secs = config.session.cleanup_interval_seconds;
    tokio::spawn(async move {
        let mut interval =
            tokio::time::interval(std::time::Duration::from_secs(cleanup_interval_secs));
        loop {
            interval.tick().await;
            match cleanup_sessions.delete_expired().await {
                Ok(count) if count > 0 => {
                    tracing::debug!(deleted_sessions = count, "Periodic session cleanup");
                }
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to cleanup expired sessions");
                }
            }
        }
    });

    // Register the configured identity providers
    let mut providers = ProviderRegistry::new();
    if let Some(google) = &config.google {
        tracing::info!("Discovering Google OpenID Connect provider...");
        let client = GoogleClient::discover(google)
            .await
            .expect("failed to discover Google provider");
        providers = providers.with(Arc::new(client));
    }
    if let Some(github) = &config.github {
        let client = GitHubClient::new(github).expect("failed to configure GitHub provider");
        providers = providers.with(Arc::new(client));
    }
    if providers.kinds().is_empty() {
        tracing::warn!("No identity providers configured; sign-in is disabled");
    }

    let handler = CallbackHandler::new(
        accounts.clone(),
        Arc::new(Argon2CredentialVerifier::new()),
        Arc::new(config.confirmation.tracker()),
        Arc::new(StoredSessionIssuer::new(
            sessions.clone(),
            config.session.duration(),
        )),
    )
    .with_routes(config.routes.clone())
    .with_messages(config.message_catalog());

    // Create application state
    let app_state = Arc::new(AppState::new(
        accounts,
        memberships,
        sessions,
        providers,
        handler,
        config.session.clone(),
    ));

    let app = app::router(app_state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("failed to bind to address");

    tracing::info!("listening on http://{}", config.bind_addr);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server error");
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutting down");
}
