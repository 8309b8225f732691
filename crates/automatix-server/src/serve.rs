// automatix-server/src/serve.rs
// ============================================================================
// Module: Process Entry Point
// Description: Boots ServerState, mounts the HTTP router, spawns the poll
//              loop, and serves until a shutdown signal arrives.
// Purpose: The one function automatix-cli's `serve` subcommand and this
//          crate's own integration tests both call into.
// Dependencies: automatix_core, axum, tokio, tower, tower-http
// ============================================================================

//! ## Overview
//! [`run`] owns process lifetime: it builds [`ServerState`] from
//! [`AppConfig`], binds the HTTP listener (mapping a bind failure to exit
//! code 1), spawns [`poll_loop::run`] alongside it, and serves until SIGINT
//! or SIGTERM. Shutdown is cooperative — both the HTTP server and the poll
//! loop are given a chance to stop cleanly before the process exits 0.

use std::sync::Arc;

use automatix_core::Clock;
use automatix_core::SystemClock;
use tokio::sync::watch;
use tower::limit::ConcurrencyLimitLayer;
use tower_http::trace::TraceLayer;

use crate::config::AppConfig;
use crate::error::ServerError;
use crate::handlers::router;
use crate::poll_loop;
use crate::state::ServerState;

/// Boots and serves the platform process until shutdown, per the exit code
/// contract: configuration and bind/serve failures map to 1, registry
/// failures to 2, storage failures to 3, and a clean shutdown to 0.
///
/// # Errors
/// Returns [`ServerError`] if any startup step fails; see
/// [`ServerState::build`] and [`ServerError::exit_code`].
pub async fn run(config: AppConfig) -> Result<(), ServerError> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let max_parallel_executions = config.runtime.max_parallel_executions;
    let listen_addr = config.http.listen_addr.clone();
    let state = ServerState::build(config, clock)?;

    let app = router(state.clone())
        .layer(ConcurrencyLimitLayer::new(max_parallel_executions as usize))
        .layer(TraceLayer::new_for_http());

    let socket_addr: std::net::SocketAddr =
        listen_addr.parse().map_err(|err: std::net::AddrParseError| ServerError::Bind(err.to_string()))?;
    let listener = tokio::net::TcpListener::bind(socket_addr)
        .await
        .map_err(|err| ServerError::Bind(err.to_string()))?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poll_loop_handle = tokio::spawn(poll_loop::run(state, shutdown_rx));

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|err| ServerError::Serve(err.to_string()))?;

    let _ = shutdown_tx.send(true);
    let _ = poll_loop_handle.await;
    Ok(())
}

/// Resolves once SIGINT or (on unix) SIGTERM is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        let Ok(mut signal) = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) else {
            return;
        };
        signal.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}
