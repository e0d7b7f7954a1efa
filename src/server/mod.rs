use axum::{
    body::Body,
    http::Request,
    middleware,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, info_span, warn};
use uuid::Uuid;

use crate::config::ServerConfig;
use crate::error::{WaypointError, WaypointResult};
use crate::service::PathService;

pub mod auth;
pub mod handlers;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PathService>,
    pub auth_token: Option<Arc<str>>,
}

impl AppState {
    pub fn new(service: Arc<PathService>, auth_token: Option<&str>) -> Self {
        Self {
            service,
            auth_token: auth_token.map(Arc::from),
        }
    }
}

pub fn router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/generate-path", post(handlers::generate_path))
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_bearer_token,
        ));

    Router::new()
        .route("/health", get(handlers::health))
        .merge(protected)
        .with_state(state)
        .layer(
            TraceLayer::new_for_http().make_span_with(|req: &Request<Body>| {
                info_span!(
                    "http_request",
                    method = %req.method(),
                    uri = %req.uri(),
                    request_id = %Uuid::new_v4(),
                )
            }),
        )
        .layer(CorsLayer::permissive())
}

pub async fn run_http_server(config: &ServerConfig, state: AppState) -> WaypointResult<()> {
    if state.auth_token.is_none() {
        warn!("No API token configured; /generate-path will reject every request");
    }

    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|err| WaypointError::Config(format!("invalid server address: {err}")))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|err| WaypointError::Internal(format!("failed to bind server: {err}")))?;

    info!(%addr, "Listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| WaypointError::Internal(format!("server error: {err}")))?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        warn!(error = %err, "Failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
