use std::sync::Arc;

use autoglm_api::{create_router, AppState};
use autoglm_core::adb::mock::{png_header, MockTransport};
use autoglm_core::adb::{CommandOutcome, ScreenCapture};
use autoglm_core::device::DeviceIdentity;
use autoglm_core::Config;
use autoglm_stream::mock::{MockLauncher, MockScript};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

fn test_state(transport: MockTransport) -> (AppState, Arc<MockTransport>) {
    let mut config = Config::default();
    config.adb.tcpip_settle_ms = 0;

    let transport = Arc::new(transport);
    let launcher = Arc::new(MockLauncher::new(MockScript::healthy()));
    (AppState::new(&config, transport.clone(), launcher), transport)
}

fn app(state: AppState) -> Router {
    create_router(state, &[])
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_empty(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

#[tokio::test]
async fn test_health_reports_active_streams() {
    let (state, _) = test_state(MockTransport::new());
    state
        .registry()
        .get_or_create("USB1", &DeviceIdentity::from_address("USB1"))
        .await
        .unwrap();

    let (status, body) = send(app(state), get("/api/health")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["active_streams"], 1);
}

#[tokio::test]
async fn test_list_devices_includes_serials() {
    let (state, _) = test_state(
        MockTransport::new()
            .with_device("USB1", "device")
            .with_device("10.0.0.9:5555", "offline")
            .with_serial("USB1", "0123456789ABCDEF"),
    );

    let (status, body) = send(app(state), get("/api/devices")).await;
    assert_eq!(status, StatusCode::OK);

    let devices = body["devices"].as_array().unwrap();
    assert_eq!(devices.len(), 2);
    assert_eq!(devices[0]["id"], "USB1");
    assert_eq!(devices[0]["model"], "Pixel_7");
    assert_eq!(devices[0]["connection_type"], "usb");
    assert_eq!(devices[0]["serial"], "0123456789ABCDEF");
    assert_eq!(devices[1]["connection_type"], "remote");
    assert_eq!(devices[1]["serial"], Value::Null);
}

#[tokio::test]
async fn test_connect_wifi_promotes_usb_device() {
    let (state, transport) = test_state(
        MockTransport::new()
            .with_device("USB1", "device")
            .with_wifi_ip("USB1", "192.168.1.50")
            .with_connect(
                "192.168.1.50:5555",
                CommandOutcome::ok("connected to 192.168.1.50:5555"),
            ),
    );

    let (status, body) = send(
        app(state),
        post_json("/api/devices/connect_wifi", &json!({ "device_id": "USB1" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["address"], "192.168.1.50:5555");
    assert_eq!(body.get("error_code"), None);
    assert_eq!(transport.call_count("enable_tcpip"), 1);
}

#[tokio::test]
async fn test_connect_wifi_without_device_is_reported() {
    let (state, _) = test_state(MockTransport::new());

    let (status, body) = send(app(state), post_json("/api/devices/connect_wifi", &json!({}))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["error_code"], "device_not_found");
}

#[tokio::test]
async fn test_connect_manual_rejects_bad_ip_before_adb() {
    let (state, transport) = test_state(MockTransport::new());

    let (status, body) = send(
        app(state),
        post_json(
            "/api/devices/connect_wifi_manual",
            &json!({ "ip": "999.1.1.1", "port": 5555 }),
        ),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["error_code"], "invalid_ip");
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn test_pair_rejects_short_code_before_adb() {
    let (state, transport) = test_state(MockTransport::new());

    let (_, body) = send(
        app(state),
        post_json(
            "/api/devices/pair_wifi",
            &json!({ "ip": "192.168.1.100", "pairing_port": 37831, "pairing_code": "19787" }),
        ),
    )
    .await;

    assert_eq!(body["success"], false);
    assert_eq!(body["error_code"], "invalid_pairing_code");
    assert!(transport.calls().is_empty());
}

#[tokio::test]
async fn test_pair_then_connect_failure() {
    let (state, _) = test_state(
        MockTransport::new()
            .with_pair_output("Successfully paired to 192.168.1.100:37831 [guid=adb-XYZ]"),
    );

    let (_, body) = send(
        app(state),
        post_json(
            "/api/devices/pair_wifi",
            &json!({
                "ip": "192.168.1.100",
                "pairing_port": 37831,
                "pairing_code": "197872",
            }),
        ),
    )
    .await;

    assert_eq!(body["success"], false);
    assert_eq!(body["error_code"], "paired_not_connected");
    assert!(body["message"]
        .as_str()
        .unwrap()
        .starts_with("Paired successfully but connection failed"));
}

#[tokio::test]
async fn test_disconnect_wifi() {
    let (state, transport) = test_state(MockTransport::new());

    let (_, body) = send(
        app(state),
        post_json(
            "/api/devices/disconnect_wifi",
            &json!({ "device_id": "192.168.1.50:5555" }),
        ),
    )
    .await;

    assert_eq!(body["success"], true);
    assert_eq!(body["device_id"], "192.168.1.50:5555");
    assert_eq!(transport.calls(), vec!["disconnect 192.168.1.50:5555"]);
}

#[tokio::test]
async fn test_screenshot_returns_base64_png() {
    let png = png_header(720, 1600);
    let (state, transport) = test_state(
        MockTransport::new()
            .with_device("USB1", "device")
            .with_screenshot(
                "USB1",
                ScreenCapture {
                    ok: true,
                    png: png.clone(),
                    message: String::new(),
                },
            ),
    );

    let (status, body) = send(
        app(state),
        post_json("/api/screenshot", &json!({ "device_id": "USB1" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["width"], 720);
    assert_eq!(body["height"], 1600);
    assert_eq!(body.get("error"), None);
    // Standard alphabet with padding
    let image = body["image"].as_str().unwrap();
    assert!(image.starts_with("iVBORw0KGgo"));
    assert_eq!(image.len(), png.len().div_ceil(3) * 4);
    assert_eq!(transport.call_count("screenshot"), 1);
}

#[tokio::test]
async fn test_screenshot_without_body_and_device_is_reported() {
    let (state, transport) = test_state(MockTransport::new());

    let (status, body) = send(app(state), post_empty("/api/screenshot")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["image"], "");
    assert_eq!(body["error_code"], "device_not_found");
    assert_eq!(body["error"], "No connected device");
    assert_eq!(transport.call_count("screenshot"), 0);
}

#[tokio::test]
async fn test_reset_single_stream() {
    let (state, _) = test_state(MockTransport::new());
    let session = state
        .registry()
        .get_or_create("USB1", &DeviceIdentity::from_address("USB1"))
        .await
        .unwrap()
        .session;

    let (status, body) = send(app(state.clone()), post_empty("/api/video/reset?device_id=USB1")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Video stream reset for device USB1");
    assert!(!session.state().is_live());

    let (_, body) = send(app(state), post_empty("/api/video/reset?device_id=USB1")).await;
    assert_eq!(body["message"], "No active video stream for device USB1");
}

#[tokio::test]
async fn test_reset_all_streams() {
    let (state, _) = test_state(MockTransport::new());
    for key in ["USB1", "USB2"] {
        state
            .registry()
            .get_or_create(key, &DeviceIdentity::from_address(key))
            .await
            .unwrap();
    }

    let (_, body) = send(app(state.clone()), post_empty("/api/video/reset")).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "All video streams reset");
    assert_eq!(state.registry().active_count(), 0);
}

#[tokio::test]
async fn test_stream_requires_websocket_upgrade() {
    let (state, _) = test_state(MockTransport::new());

    let response = app(state)
        .oneshot(get("/api/video/stream?device_id=USB1"))
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}
