//! HTTP API assembly
//!
//! Builds the shared [`AppState`] from configuration and merges every
//! service's routes into one axum router with tracing, CORS and a request
//! timeout layered on top. A timed-out request gets a JSON 500; work the
//! handler spawned keeps running.

mod extract;

pub use extract::ApiJson;

use crate::chain::{build_verifier, ChainVerifier};
use crate::config::Config;
use crate::database::{open_store, DocumentStore};
use crate::error::{Error, Result};
use crate::services::economy::{self, EconomyService, EconomyStats};
use crate::services::matches::{self, LogSettlement, MatchService, MatchStats, Settlement};
use crate::services::ai;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// State shared by every handler
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub economy: Arc<EconomyService>,
    pub matches: Arc<MatchService>,
    pub started_at: Instant,
}

impl AppState {
    /// Open the configured store and chain verifier and build the services
    pub fn from_config(config: Config) -> Result<Self> {
        let store = open_store(&config.database)?;
        let verifier = build_verifier(&config.chain)?;
        Ok(Self::with_parts(config, store, verifier, Arc::new(LogSettlement)))
    }

    /// Build the services over explicit collaborators
    pub fn with_parts(
        config: Config,
        store: Arc<dyn DocumentStore>,
        verifier: Arc<dyn ChainVerifier>,
        settlement: Arc<dyn Settlement>,
    ) -> Self {
        let economy = EconomyService::new(config.economy.clone(), store.clone(), verifier);
        let matches = MatchService::new(config.matches.clone(), store, settlement);

        Self {
            config: Arc::new(config),
            economy: Arc::new(economy),
            matches: Arc::new(matches),
            started_at: Instant::now(),
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: String,
    pub version: &'static str,
    pub uptime_secs: u64,
    pub economy: EconomyStats,
    pub matches: MatchStats,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        service: state.config.app.name.clone(),
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: state.started_at.elapsed().as_secs(),
        economy: state.economy.stats(),
        matches: state.matches.stats(),
    })
}

async fn fallback() -> Error {
    Error::NotFound("Route not found".to_string())
}

/// Answer with a JSON 500 when a handler outlives the request budget
async fn request_timeout(
    State(limit): State<Duration>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();

    match tokio::time::timeout(limit, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            tracing::warn!(%method, %uri, ?limit, "request timed out");
            Error::Internal("Request timed out".to_string()).into_response()
        }
    }
}

/// The complete application router
pub fn router(state: AppState) -> Router {
    let cors = if state.config.server.permissive_cors {
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
    };

    Router::new()
        .route("/health", get(health))
        .merge(economy::http::routes())
        .merge(matches::http::routes())
        .merge(ai::routes())
        .fallback(fallback)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(middleware::from_fn_with_state(
                    state.config.server.request_timeout,
                    request_timeout,
                ))
                .into_inner(),
        )
        .with_state(state)
}

/// Bind the configured address and serve until `shutdown` resolves
pub async fn serve<F>(state: AppState, shutdown: F) -> Result<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    let addr = state.config.server.listen_address.clone();
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local = listener.local_addr()?;
    tracing::info!(address = %local, "GameHub listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Network(e.to_string()))?;

    tracing::info!("server stopped");
    Ok(())
}
