//! Axum server setup
//!
//! Server skeleton with:
//! - Permissive CORS (any origin, method, header)
//! - Tracing middleware
//! - Graceful shutdown on SIGTERM/Ctrl+C, then the pool is drained

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::routes;
use crate::db::{Connector, Database, Session};

/// Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to (default: 0.0.0.0:5000)
    pub bind_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
        }
    }
}

/// Shared application state
pub struct AppState<C: Connector> {
    pub db: Database<C>,
}

impl<C> AppState<C>
where
    C: Connector,
    C::Connection: Session,
{
    pub fn new(db: Database<C>) -> Self {
        Self { db }
    }
}

/// Build the application router with all routes.
pub fn build_router<C>(state: Arc<AppState<C>>) -> Router
where
    C: Connector,
    C::Connection: Session,
{
    Router::new()
        .merge(routes::health::router())
        .merge(routes::users::router())
        .merge(routes::climbs::router())
        .merge(routes::tutorials::router())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Run the HTTP server.
///
/// Probes the database once (a failed probe is logged, not fatal), serves
/// until a shutdown signal, then shuts the pool down.
///
/// # Example
///
/// ```ignore
/// let db = Database::new(Pool::new(MySqlConnector::new(&db_config), PoolConfig::default()));
/// run_server(db, ServerConfig::default()).await?;
/// ```
pub async fn run_server<C>(db: Database<C>, config: ServerConfig) -> Result<(), ServerError>
where
    C: Connector,
    C::Connection: Session,
{
    match db.pool().ping().await {
        Ok(()) => tracing::info!("Connected to database"),
        Err(e) => tracing::error!(error = %e, "Database connection error"),
    }

    let state = Arc::new(AppState::new(db.clone()));
    let app = build_router(state);

    // Bind listener
    let listener = TcpListener::bind(config.bind_addr).await?;
    tracing::info!("Server listening on {}", config.bind_addr);

    // Run with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    db.pool().shutdown().await;
    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
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
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting shutdown");
        }
    }
}

/// Server error type
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
