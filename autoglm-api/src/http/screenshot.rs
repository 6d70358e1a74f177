//! Screen capture endpoint
//!
//! Like the connection routes, failures still answer 200 with
//! `success: false` and an `error_code`.

use autoglm_core::device::{capture_screenshot, Screenshot};
use axum::{extract::State, routing::post, Json, Router};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

use crate::http::AppState;

pub fn create_screenshot_router() -> Router<AppState> {
    Router::new().route("/api/screenshot", post(take_screenshot))
}

#[derive(Debug, Default, Deserialize)]
pub struct ScreenshotRequest {
    pub device_id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ScreenshotResponse {
    pub success: bool,
    /// Base64 (standard alphabet) PNG; empty on failure
    pub image: String,
    pub width: u32,
    pub height: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

impl From<Screenshot> for ScreenshotResponse {
    fn from(shot: Screenshot) -> Self {
        Self {
            success: true,
            image: STANDARD.encode(&shot.png),
            width: shot.width,
            height: shot.height,
            error: None,
            error_code: None,
        }
    }
}

/// Capture the screen of the requested device, or the first online one.
/// The body may be omitted entirely.
pub async fn take_screenshot(
    State(state): State<AppState>,
    request: Option<Json<ScreenshotRequest>>,
) -> Json<ScreenshotResponse> {
    let request = request.map(|Json(r)| r).unwrap_or_default();

    let captured =
        capture_screenshot(state.transport.as_ref(), request.device_id.as_deref()).await;
    let response = match captured {
        Ok(shot) => shot.into(),
        Err(e) => {
            tracing::warn!(device_id = ?request.device_id, error = %e, "Screenshot failed");
            ScreenshotResponse {
                success: false,
                image: String::new(),
                width: 0,
                height: 0,
                error: Some(e.message()),
                error_code: Some(e.code().to_string()),
            }
        }
    };
    Json(response)
}
