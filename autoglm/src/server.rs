//! HTTP server lifecycle
//!
//! Binds the listener, serves the API and, on shutdown, stops every capture
//! session so no scrcpy server or port forward outlives the process.

use anyhow::Context;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use autoglm_api::{create_router, AppState};
use autoglm_core::Config;

/// Ports tried when scanning for a free one
const PORT_SCAN_ATTEMPTS: u16 = 100;

pub struct Server {
    config: Config,
    state: AppState,
    scan_for_port: bool,
}

impl Server {
    /// With `scan_for_port`, a busy configured port is skipped in favor of
    /// the next free one.
    pub const fn new(config: Config, state: AppState, scan_for_port: bool) -> Self {
        Self {
            config,
            state,
            scan_for_port,
        }
    }

    pub async fn run(self) -> anyhow::Result<()> {
        let listener = self.bind().await?;
        let local_addr = listener.local_addr()?;

        info!("==================================================");
        info!("  AutoGLM server {}", env!("CARGO_PKG_VERSION"));
        info!("  Listening on http://{local_addr}");
        info!("  Video stream: ws://{local_addr}/api/video/stream?device_id=<id>");
        info!("  adb: {}", self.config.adb.path);
        info!("==================================================");

        let router = create_router(self.state.clone(), &self.config.server.cors_origins);

        if let Err(e) = axum::serve(listener, router)
            .with_graceful_shutdown(shutdown_signal())
            .await
        {
            error!("HTTP server error: {}", e);
        }

        self.shutdown().await;
        Ok(())
    }

    async fn bind(&self) -> anyhow::Result<TcpListener> {
        let host = self.config.server.host.as_str();
        let start = self.config.server.port;

        if !self.scan_for_port {
            return TcpListener::bind((host, start))
                .await
                .with_context(|| format!("Failed to bind {host}:{start}"));
        }

        for offset in 0..PORT_SCAN_ATTEMPTS {
            let Some(port) = start.checked_add(offset) else {
                break;
            };
            match TcpListener::bind((host, port)).await {
                Ok(listener) => {
                    if offset > 0 {
                        warn!(requested = start, port, "Configured port busy, using next free port");
                    }
                    return Ok(listener);
                }
                Err(e) => {
                    tracing::debug!(port, error = %e, "Port unavailable");
                }
            }
        }

        Err(anyhow::anyhow!(
            "No free port in {start}..{}",
            start.saturating_add(PORT_SCAN_ATTEMPTS)
        ))
    }

    async fn shutdown(&self) {
        info!("Shutting down AutoGLM server...");
        self.state.registry().shutdown().await;
        info!("Shutdown complete");
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT/Ctrl+C)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => { info!("Received Ctrl+C"); }
        () = terminate => { info!("Received SIGTERM"); }
    }
}
