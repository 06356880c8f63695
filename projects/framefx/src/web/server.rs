use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::net::{IpAddr, SocketAddr, TcpListener};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::web::{api, stream, AppContext};

pub async fn run_server(host: IpAddr, port: u16, ctx: Arc<AppContext>) -> Result<()> {
    let mut current_port = port;
    let listener = loop {
        let addr = SocketAddr::new(host, current_port);
        match TcpListener::bind(addr) {
            Ok(listener) => {
                // The listener must be non-blocking before Tokio takes it over
                listener.set_nonblocking(true)?;
                info!("Successfully bound to {}", addr);
                break listener;
            }
            Err(e) => {
                warn!("Failed to bind to {}: {}. Trying next port...", addr, e);
                current_port += 1;
                if current_port == 0 {
                    return Err(anyhow::anyhow!("No available ports found"));
                }
            }
        }
    };

    let app = Router::new()
        .route("/api/status", get(api::get_status))
        .route("/api/sources", get(api::get_sources))
        .route("/api/config", get(api::get_config).post(api::set_config))
        .route("/api/start", post(api::start_run))
        .route("/api/stop", post(api::stop_run))
        .route("/frame.jpg", get(stream::latest_frame))
        .route("/stream.mjpg", get(stream::stream_mjpg))
        .layer(TraceLayer::new_for_http())
        .with_state(ctx);

    let tokio_listener = tokio::net::TcpListener::from_std(listener)?;
    info!(
        "Framefx server started on http://{:?}",
        tokio_listener.local_addr()?
    );

    axum::serve(tokio_listener, app).await?;

    Ok(())
}
