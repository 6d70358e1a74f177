//! Device listing and WiFi connection endpoints
//!
//! Connection routes always answer 200 with a [`ConnectionAttempt`]; clients
//! branch on `success` and `error_code`.

use autoglm_core::adb::ConnectionType;
use autoglm_core::device::{ConnectionAttempt, ResolvedDevice, DEFAULT_ADB_PORT};
use axum::{
    extract::State,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::http::{AppResult, AppState};

pub fn create_devices_router() -> Router<AppState> {
    Router::new()
        .route("/api/devices", get(list_devices))
        .route("/api/devices/connect_wifi", post(connect_wifi))
        .route("/api/devices/disconnect_wifi", post(disconnect_wifi))
        .route("/api/devices/connect_wifi_manual", post(connect_wifi_manual))
        .route("/api/devices/pair_wifi", post(pair_wifi))
}

const fn default_port() -> i64 {
    DEFAULT_ADB_PORT as i64
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeviceView {
    pub id: String,
    pub model: String,
    pub status: String,
    pub connection_type: ConnectionType,
    pub serial: Option<String>,
}

impl From<ResolvedDevice> for DeviceView {
    fn from(device: ResolvedDevice) -> Self {
        Self {
            id: device.info.device_id,
            model: device.info.model.unwrap_or_else(|| "Unknown".to_string()),
            status: device.info.status,
            connection_type: device.info.connection_type,
            serial: device.serial,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DeviceListResponse {
    pub devices: Vec<DeviceView>,
}

#[derive(Debug, Deserialize)]
pub struct ConnectWifiRequest {
    pub device_id: Option<String>,
    #[serde(default = "default_port")]
    pub port: i64,
}

#[derive(Debug, Deserialize)]
pub struct DisconnectWifiRequest {
    pub device_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ConnectWifiManualRequest {
    pub ip: String,
    #[serde(default = "default_port")]
    pub port: i64,
}

#[derive(Debug, Deserialize)]
pub struct PairWifiRequest {
    pub ip: String,
    pub pairing_port: i64,
    pub pairing_code: String,
    #[serde(default = "default_port")]
    pub connection_port: i64,
}

pub async fn list_devices(State(state): State<AppState>) -> AppResult<Json<DeviceListResponse>> {
    let devices = state.identities.list_devices().await?;
    Ok(Json(DeviceListResponse {
        devices: devices.into_iter().map(DeviceView::from).collect(),
    }))
}

pub async fn connect_wifi(
    State(state): State<AppState>,
    Json(req): Json<ConnectWifiRequest>,
) -> Json<ConnectionAttempt> {
    let result = state
        .connections
        .connect_wifi(req.device_id.as_deref(), req.port)
        .await;
    Json(result.into())
}

pub async fn disconnect_wifi(
    State(state): State<AppState>,
    Json(req): Json<DisconnectWifiRequest>,
) -> Json<ConnectionAttempt> {
    let attempt = match state.connections.disconnect(&req.device_id).await {
        Ok(message) => {
            // The address may belong to a different device next time
            state.identities.forget(&req.device_id);
            ConnectionAttempt {
                success: true,
                message,
                device_id: Some(req.device_id),
                address: None,
                error_code: None,
            }
        }
        Err(e) => ConnectionAttempt {
            success: false,
            message: e.message(),
            device_id: Some(req.device_id),
            address: None,
            error_code: Some(e.code().to_string()),
        },
    };
    Json(attempt)
}

pub async fn connect_wifi_manual(
    State(state): State<AppState>,
    Json(req): Json<ConnectWifiManualRequest>,
) -> Json<ConnectionAttempt> {
    let result = state.connections.connect_manual(&req.ip, req.port).await;
    if result.is_ok() {
        info!(ip = %req.ip, port = req.port, "Manual WiFi connection established");
    }
    Json(result.into())
}

pub async fn pair_wifi(
    State(state): State<AppState>,
    Json(req): Json<PairWifiRequest>,
) -> Json<ConnectionAttempt> {
    let result = state
        .connections
        .pair_and_connect(&req.ip, req.pairing_port, &req.pairing_code, req.connection_port)
        .await;
    Json(result.into())
}
