//! HTTP API module for Citycast
//!
//! JSON endpoints for registration, login/logout, password reset and the
//! feeling-lucky draw. Sessions travel in a signed cookie.

mod auth;
pub mod routes;

use crate::auth::CredentialStore;
use crate::error::{CoreError, Result};
use crate::lucky::LuckySelector;
use crate::session::SessionManager;

use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use std::future::Future;
use std::net::SocketAddr;
use tower_http::trace::TraceLayer;

pub use auth::CurrentUser;

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionManager,
    pub credentials: CredentialStore,
    /// None until a city table has been imported
    pub lucky: Option<LuckySelector>,
}

/// Serve the API until `shutdown` resolves, then drain in-flight requests
pub async fn serve<F>(addr: SocketAddr, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| CoreError::Api(e.to_string()))?;

    tracing::info!("HTTP server stopped");
    Ok(())
}

/// Create the API router with all routes
pub fn create_router(state: AppState) -> Router {
    // Routes that need a live session
    let session_routes = Router::new()
        .route("/lucky", post(routes::lucky_draw))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_session,
        ));

    let api_routes = Router::new()
        .route("/users", post(routes::register))
        .route("/login", post(routes::login))
        .route("/logout", post(routes::logout))
        .route("/session", get(routes::session_status))
        .route("/password-reset/question", get(routes::reset_question))
        .route("/password-reset", post(routes::reset_password))
        .merge(session_routes);

    Router::new()
        .route("/health", get(routes::health))
        .nest("/api", api_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Graceful shutdown signal handler
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received, starting graceful shutdown");
}
