use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    routing::get,
    Router,
};
use tower_http::cors::CorsLayer;

use crate::api_handlers::*;
use crate::config::ServerConfig;
use crate::logging::{log_error, log_error_stderr, log_info, log_warning};
use crate::store::{InMemoryCardStore, PoolFileError};

pub struct AppState {
    pub store: InMemoryCardStore,
    pub config: ServerConfig,
}

impl AppState {
    pub fn new(store: InMemoryCardStore, config: ServerConfig) -> Self {
        Self { store, config }
    }

    /// Write the pool to the configured file; failures are logged, never fatal.
    pub fn persist_pool(&self) {
        let Some(path) = &self.config.pool_file else {
            return;
        };
        match self.store.dump_to_file(path) {
            Ok(message) => log_info(&message),
            Err(e) => log_error(&format!("Failed to dump card pool: {e}")),
        }
    }
}

/// Load the pool from the configured file, or generate a fresh one (and save it when a file is configured).
pub fn load_pool(config: &ServerConfig, regenerate: bool) -> Result<InMemoryCardStore, PoolFileError> {
    if let Some(path) = &config.pool_file {
        if path.exists() && !regenerate {
            let store = InMemoryCardStore::load_from_file(path)?;
            log_info(&format!("Loaded card pool from {}", path.display()));
            return Ok(store);
        }
    }

    let store = InMemoryCardStore::generate(config.pool_size as usize);
    if let Some(path) = &config.pool_file {
        log_info(&store.dump_to_file(path)?);
    }
    Ok(store)
}

pub fn build_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        // Card store routes
        .route("/cards/unclaimed", get(handle_unclaimed))
        .route("/cards/{card_id}", get(handle_get_card).patch(handle_conditional_update))
        .route("/cards/{card_id}/owner", get(handle_get_owner))
        // Pool administration routes
        .route("/status", get(handle_status))
        .route("/reset", axum::routing::post(handle_reset))
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

pub fn start_server(config: ServerConfig, store: InMemoryCardStore) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let app_state = Arc::new(AppState::new(store, config.clone()));

        if let Some(warning) = config.admin_id_warning() {
            log_warning(&warning);
        }

        match app_state.store.stats() {
            Ok(stats) => log_info(&format!(
                "Card pool ready: {} cards, {} claimed, {} unclaimed",
                stats.total, stats.claimed, stats.unclaimed
            )),
            Err(e) => log_warning(&format!("Could not read pool statistics: {e}")),
        }

        let app = build_router(Arc::clone(&app_state));

        let addr = SocketAddr::from((config.host.parse::<std::net::IpAddr>().unwrap_or([127, 0, 0, 1].into()), config.port));
        let listener = match tokio::net::TcpListener::bind(&addr).await {
            Ok(listener) => listener,
            Err(e) => {
                log_error_stderr(&format!("Failed to start API server: {e}"));
                return;
            }
        };

        log_info(&format!("Server starting on {addr}"));

        let shutdown = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                log_error(&format!("Failed to listen for shutdown signal: {e}"));
            }
        };

        if let Err(err) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
            log_error(&format!("Server error: {err:?}"));
        }

        app_state.persist_pool();
        log_info("Server shutdown complete");
    })
}
