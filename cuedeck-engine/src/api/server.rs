//! HTTP server setup and routing
//!
//! Sets up the Axum server with routes for show control and SSE.

use crate::error::{Error, Result};
use crate::playback::engine::EngineHandle;
use crate::state::SharedState;
use axum::{
    routing::{delete, get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::info;

/// Shared application context passed to all handlers
#[derive(Clone)]
pub struct AppContext {
    pub state: Arc<SharedState>,
    pub engine: EngineHandle,
}

/// Build the router with all control-surface routes
pub fn create_router(ctx: AppContext) -> Router {
    Router::new()
        // Health endpoint
        .route("/health", get(super::handlers::health))

        // Status and events
        .route("/status", get(super::handlers::status))
        .route("/events", get(super::sse::event_stream))

        // Show transport
        .route("/show/go", post(super::handlers::go_live))
        .route("/show/play", post(super::handlers::play_selected))
        .route("/show/snapshot", get(super::handlers::get_snapshot))
        .route("/show/snapshot", put(super::handlers::restore_snapshot))

        // Deck transport
        .route("/decks/:deck/play", post(super::handlers::deck_play))
        .route("/decks/:deck/stop", post(super::handlers::deck_stop))
        .route("/decks/:deck/pause", post(super::handlers::deck_pause))
        .route("/decks/:deck/seek", post(super::handlers::deck_seek))
        .route("/decks/:deck/volume", post(super::handlers::deck_volume))
        .route("/decks/:deck/loop", post(super::handlers::deck_loop))

        // Scene editing and selection
        .route("/scenes", post(super::handlers::add_scene))
        .route("/scenes/:scene_id", delete(super::handlers::remove_scene))
        .route("/scenes/:scene_id/select", post(super::handlers::select_scene))
        .route("/scenes/:scene_id/rename", post(super::handlers::rename_scene))

        // Cue editing and selection
        .route("/cues", post(super::handlers::add_cue))
        .route("/cues/:cue_id", delete(super::handlers::remove_cue))
        .route("/cues/:cue_id/select", post(super::handlers::select_cue))
        .route("/cues/:cue_id/trim", post(super::handlers::trim_cue))
        .route("/cues/:cue_id/move", post(super::handlers::move_cue))
        .route("/cues/:cue_id/meta", post(super::handlers::update_cue_meta))
        .route("/cues/:cue_id/preview", post(super::handlers::request_preview))

        // Slide-deck navigation
        .route("/slides/next", post(super::handlers::slide_next))
        .route("/slides/previous", post(super::handlers::slide_previous))

        // Attach application context
        .with_state(ctx)

        // Enable CORS for local access
        .layer(CorsLayer::permissive())
}

/// Run the HTTP API server until the shutdown future resolves
pub async fn run(
    port: u16,
    ctx: AppContext,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let app = create_router(ctx);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!("Starting HTTP server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| Error::Http(format!("Failed to bind to {}: {}", addr, e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| Error::Http(format!("Server error: {}", e)))?;

    Ok(())
}
