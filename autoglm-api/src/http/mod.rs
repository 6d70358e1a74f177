//! HTTP router and shared handler state
//!
//! Routes:
//! - `GET  /api/health`
//! - `GET  /api/devices`
//! - `POST /api/devices/connect_wifi`
//! - `POST /api/devices/disconnect_wifi`
//! - `POST /api/devices/connect_wifi_manual`
//! - `POST /api/devices/pair_wifi`
//! - `POST /api/screenshot`
//! - `GET  /api/video/stream?device_id=` (WebSocket)
//! - `POST /api/video/reset[?device_id=]`

pub mod devices;
pub mod error;
pub mod health;
pub mod screenshot;
pub mod video;

use std::sync::Arc;
use std::time::Duration;

use autoglm_core::adb::DeviceTransport;
use autoglm_core::device::{ConnectionManager, IdentityResolver};
use autoglm_core::Config;
use autoglm_stream::{CaptureLauncher, Relay, RelayConfig, SessionRegistry};
use axum::http::HeaderValue;
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

pub use error::{AppError, AppResult};

/// Shared state for every handler
#[derive(Clone)]
pub struct AppState {
    pub connections: Arc<ConnectionManager>,
    pub identities: Arc<IdentityResolver>,
    pub relay: Arc<Relay>,
    pub transport: Arc<dyn DeviceTransport>,
}

impl AppState {
    /// Wire the services around one transport and one capture launcher.
    pub fn new(
        config: &Config,
        transport: Arc<dyn DeviceTransport>,
        launcher: Arc<dyn CaptureLauncher>,
    ) -> Self {
        let registry = Arc::new(SessionRegistry::new(launcher));
        let relay = Relay::new(registry, RelayConfig::from(&config.stream));

        Self {
            connections: Arc::new(ConnectionManager::new(
                transport.clone(),
                Duration::from_millis(config.adb.tcpip_settle_ms),
            )),
            identities: Arc::new(IdentityResolver::new(
                transport.clone(),
                config.identity.policy,
            )),
            relay: Arc::new(relay),
            transport,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        self.relay.registry()
    }
}

/// Allow the configured origins, or any origin when none are listed.
fn cors_layer(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed.is_empty() {
        layer.allow_origin(Any)
    } else {
        layer.allow_origin(AllowOrigin::list(allowed))
    }
}

/// Build the application router
pub fn create_router(state: AppState, cors_origins: &[String]) -> Router {
    let router = Router::new()
        .merge(health::create_health_router())
        .merge(devices::create_devices_router())
        .merge(screenshot::create_screenshot_router())
        .merge(video::create_video_router());

    // Apply layers before state
    let router = router
        .layer(cors_layer(cors_origins))
        .layer(TraceLayer::new_for_http());

    router.with_state(state)
}
