//! Liveness endpoint: `GET /` answers "Hi!" while the process is up.
//!
//! Runs on its own thread and runtime so bot session restarts never take it
//! down.

use std::{net::SocketAddr, thread};

use axum::{routing::get, Router};
use tracing::{error, info};

pub fn router() -> Router {
    Router::new().route("/", get(hi))
}

async fn hi() -> &'static str {
    "Hi!"
}

pub async fn serve(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, "Starting livechecker");
    axum::serve(listener, router()).await
}

/// Start the endpoint on a dedicated thread.
pub fn spawn(port: u16) -> std::io::Result<thread::JoinHandle<()>> {
    thread::Builder::new()
        .name("livechecker".to_string())
        .spawn(move || {
            let runtime = match tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
            {
                Ok(rt) => rt,
                Err(e) => {
                    error!("livechecker runtime failed: {e}");
                    return;
                }
            };
            if let Err(e) = runtime.block_on(serve(port)) {
                error!("livechecker stopped: {e}");
            }
        })
}
