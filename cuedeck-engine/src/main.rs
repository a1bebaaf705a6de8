//! CueDeck Engine - Main entry point
//!
//! Wires the pieces together: configuration, the process registry and its
//! shutdown guard, the engine control task, and the HTTP/SSE control
//! surface. The registry guard is held for the whole lifetime of `main`,
//! so even an unwinding exit terminates every spawned player process.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cuedeck_engine::api;
use cuedeck_engine::config::Config;
use cuedeck_engine::output::LoggingSecondScreen;
use cuedeck_engine::playback::spawn_engine;
use cuedeck_engine::registry::{ProcessRegistry, ShutdownGuard};
use cuedeck_engine::slides::{CommandSlideController, NullSlideController, SlideController};
use cuedeck_engine::SharedState;

/// Command-line arguments for cuedeck-engine
#[derive(Parser, Debug)]
#[command(name = "cuedeck-engine")]
#[command(about = "Live-event cue playback engine for CueDeck")]
#[command(version)]
struct Args {
    /// Port to listen on (overrides the config file)
    #[arg(short, long, env = "CUEDECK_PORT")]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cuedeck=debug,cuedeck_engine=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config = Config::load(args.port).context("Failed to load configuration")?;

    info!("Starting CueDeck engine on port {}", config.port);
    info!(
        "Second screen: {}x{} at {},{}",
        config.second_screen.width,
        config.second_screen.height,
        config.second_screen.left,
        config.second_screen.top
    );

    // Process registry with guaranteed cleanup for the whole engine
    // lifetime, normal exit or not
    let registry = Arc::new(ProcessRegistry::new(Duration::from_millis(
        config.terminate_grace_ms,
    )));
    let _guard = ShutdownGuard::new(Arc::clone(&registry));

    let state = Arc::new(SharedState::new(config.startup_volume));

    let slides: Arc<dyn SlideController> = match &config.slide_helper {
        Some(helper) => Arc::new(CommandSlideController::new(helper.clone())),
        None => Arc::new(NullSlideController::new()),
    };

    let (engine, engine_task) = spawn_engine(
        config.clone(),
        Arc::clone(&registry),
        Arc::clone(&state),
        Arc::new(LoggingSecondScreen),
        slides,
    );
    info!("Cue engine initialized");

    let ctx = api::AppContext {
        state,
        engine: engine.clone(),
    };
    api::server::run(config.port, ctx, shutdown_signal())
        .await
        .context("Server error")?;

    // Orderly teardown: decks stop their runners, then the guard sweeps
    // anything left in the registry
    engine.shutdown().await.ok();
    engine_task.await.ok();
    registry.terminate_all();

    info!("Shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
