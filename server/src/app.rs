//! HTTP surface: page, static assets and the relay WebSocket.

use std::future::Future;
use std::path::Path;

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::services::{ServeDir, ServeFile};
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::relay_loop::spawn_relay;
use crate::ws::{ws_handler, AppState};

/// `/ws` relay endpoint, `/` page and `/static/*` assets from `static_dir`.
pub fn build_router(app_state: AppState, static_dir: &Path) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route_service("/", ServeFile::new(static_dir.join("index.html")))
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state)
}

/// Start the relay loop and serve on `listener` until `shutdown` resolves.
pub async fn run<F>(listener: TcpListener, config: ServerConfig, shutdown: F) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send + 'static,
{
    config.validate()?;

    let (relay, _relay_task) = spawn_relay(config.command_queue_capacity);
    let app_state = AppState {
        relay,
        session_queue_capacity: config.session_queue_capacity,
        max_message_bytes: config.max_message_bytes,
    };
    let app = build_router(app_state, &config.static_dir);

    if let Ok(addr) = listener.local_addr() {
        tracing::info!("Relay listening on {}", addr);
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(ServerError::Serve)
}
