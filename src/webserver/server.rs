/// Axum webserver implementation
///
/// Main server lifecycle management including startup, shutdown, and graceful termination
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;

use crate::global::{ is_shutting_down, SHUTDOWN };
use crate::logger::{ log, LogTag };
use crate::webserver::{ routes, state::AppState };

/// Start the webserver
///
/// This function blocks until the server is shut down
pub async fn start_server(state: Arc<AppState>) -> Result<(), String> {
    let host = state.config.webserver.host.clone();
    let port = state.config.webserver.port;

    // Parse bind address
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .map_err(|e| format!("Invalid bind address {}:{}: {}", host, port, e))?;

    // Build the router
    let app = build_app(state);

    // Create TCP listener
    let listener = TcpListener::bind(&addr).await.map_err(|e| {
        match e.kind() {
            std::io::ErrorKind::AddrInUse => {
                format!(
                    "Failed to bind to {}: Address already in use\n\
                     Another solsweep instance may be running. Stop it or change webserver.port.",
                    addr
                )
            }
            std::io::ErrorKind::PermissionDenied => {
                format!(
                    "Failed to bind to {}: Permission denied\n\
                     Port {} requires elevated privileges. Use a port above 1024.",
                    addr,
                    port
                )
            }
            _ => format!("Failed to bind to {}: {}", addr, e),
        }
    })?;

    log(LogTag::Webserver, "LISTEN", &format!("🌐 Webserver listening on http://{}", addr));

    // Run the server with graceful shutdown
    let shutdown_signal = async {
        if !is_shutting_down() {
            SHUTDOWN.notified().await;
        }
        log(LogTag::Webserver, "STOP", "Received shutdown signal, stopping webserver...");
    };

    axum
        ::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal).await
        .map_err(|e| format!("Server error: {}", e))?;

    log(LogTag::Webserver, "STOPPED", "✅ Webserver stopped gracefully");

    Ok(())
}

/// Build the Axum application with all routes and middleware
fn build_app(state: Arc<AppState>) -> Router {
    // Clients are served from arbitrary origins.
    routes::create_router(state).layer(CorsLayer::permissive())
}
