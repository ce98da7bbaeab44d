use axum::{routing::get, Router};
use std::net::SocketAddr;
use tracing::{error, info};

/// Minimal liveness endpoint for the hosting platform's health checks. Runs
/// on its own task, independent of the gateway connection.
pub async fn serve(port: u16) {
    let app = Router::new().route("/", get(health));
    let addr = SocketAddr::from(([0, 0, 0, 0], port));

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind keep-alive listener on {}: {}", addr, e);
            return;
        }
    };

    info!("keep-alive endpoint listening on {}", addr);
    if let Err(e) = axum::serve(listener, app).await {
        error!("Keep-alive server exited: {}", e);
    }
}

async fn health() -> &'static str {
    "ok"
}
