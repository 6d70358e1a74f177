//! Scripted in-memory transport for tests

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::{CommandOutcome, ConnectionType, DeviceInfo, DeviceTransport, ScreenCapture};
use crate::error::Result;

#[derive(Debug, Default)]
struct MockState {
    devices: Vec<DeviceInfo>,
    tcpip: Option<CommandOutcome>,
    wifi_ips: HashMap<String, String>,
    route_ips: HashMap<String, String>,
    connect: HashMap<String, CommandOutcome>,
    disconnect: Option<CommandOutcome>,
    pair_output: String,
    serials: HashMap<String, String>,
    screenshots: HashMap<String, ScreenCapture>,
    calls: Vec<String>,
}

/// Transport whose answers are set up front. Every call is recorded as
/// `"<method> <args>"` so tests can assert which commands were issued.
#[derive(Debug, Default)]
pub struct MockTransport {
    state: Mutex<MockState>,
}

impl MockTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_device(self, device_id: &str, status: &str) -> Self {
        self.state.lock().devices.push(DeviceInfo {
            device_id: device_id.to_string(),
            status: status.to_string(),
            connection_type: ConnectionType::from_device_id(device_id),
            model: Some("Pixel_7".to_string()),
        });
        self
    }

    #[must_use]
    pub fn with_tcpip(self, outcome: CommandOutcome) -> Self {
        self.state.lock().tcpip = Some(outcome);
        self
    }

    #[must_use]
    pub fn with_wifi_ip(self, device_id: &str, ip: &str) -> Self {
        self.state
            .lock()
            .wifi_ips
            .insert(device_id.to_string(), ip.to_string());
        self
    }

    #[must_use]
    pub fn with_route_ip(self, device_id: &str, ip: &str) -> Self {
        self.state
            .lock()
            .route_ips
            .insert(device_id.to_string(), ip.to_string());
        self
    }

    /// Unscripted addresses fail to connect.
    #[must_use]
    pub fn with_connect(self, address: &str, outcome: CommandOutcome) -> Self {
        self.state
            .lock()
            .connect
            .insert(address.to_string(), outcome);
        self
    }

    #[must_use]
    pub fn with_disconnect(self, outcome: CommandOutcome) -> Self {
        self.state.lock().disconnect = Some(outcome);
        self
    }

    #[must_use]
    pub fn with_pair_output(self, output: &str) -> Self {
        self.state.lock().pair_output = output.to_string();
        self
    }

    #[must_use]
    pub fn with_serial(self, address: &str, serial: &str) -> Self {
        self.state
            .lock()
            .serials
            .insert(address.to_string(), serial.to_string());
        self
    }

    /// Devices without a scripted capture fail with "device offline".
    #[must_use]
    pub fn with_screenshot(self, device_id: &str, capture: ScreenCapture) -> Self {
        self.state
            .lock()
            .screenshots
            .insert(device_id.to_string(), capture);
        self
    }

    /// Every call made so far, in order
    #[must_use]
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    /// Number of recorded calls whose method name is `method`
    #[must_use]
    pub fn call_count(&self, method: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.split(' ').next() == Some(method))
            .count()
    }

    fn record(&self, call: String) {
        self.state.lock().calls.push(call);
    }
}

#[async_trait]
impl DeviceTransport for MockTransport {
    async fn list_devices(&self) -> Result<Vec<DeviceInfo>> {
        self.record("list_devices".to_string());
        Ok(self.state.lock().devices.clone())
    }

    async fn enable_tcpip(&self, port: u16, device_id: &str) -> Result<CommandOutcome> {
        self.record(format!("enable_tcpip {device_id} {port}"));
        Ok(self
            .state
            .lock()
            .tcpip
            .clone()
            .unwrap_or_else(|| CommandOutcome::ok(format!("restarting in TCP mode port: {port}"))))
    }

    async fn get_wifi_ip(&self, device_id: &str) -> Option<String> {
        self.record(format!("get_wifi_ip {device_id}"));
        self.state.lock().wifi_ips.get(device_id).cloned()
    }

    async fn get_device_ip(&self, device_id: &str) -> Option<String> {
        self.record(format!("get_device_ip {device_id}"));
        self.state.lock().route_ips.get(device_id).cloned()
    }

    async fn connect(&self, address: &str) -> Result<CommandOutcome> {
        self.record(format!("connect {address}"));
        Ok(self.state.lock().connect.get(address).cloned().unwrap_or_else(|| {
            CommandOutcome::failed(format!(
                "cannot connect to {address}: Connection refused (111)"
            ))
        }))
    }

    async fn disconnect(&self, device_id: &str) -> Result<CommandOutcome> {
        self.record(format!("disconnect {device_id}"));
        Ok(self
            .state
            .lock()
            .disconnect
            .clone()
            .unwrap_or_else(|| CommandOutcome::ok(format!("disconnected {device_id}"))))
    }

    async fn pair(&self, address: &str, code: &str) -> Result<String> {
        self.record(format!("pair {address} {code}"));
        Ok(self.state.lock().pair_output.clone())
    }

    async fn get_serial(&self, address: &str) -> Option<String> {
        self.record(format!("get_serial {address}"));
        self.state.lock().serials.get(address).cloned()
    }

    async fn screenshot(&self, device_id: &str) -> Result<ScreenCapture> {
        self.record(format!("screenshot {device_id}"));
        Ok(self
            .state
            .lock()
            .screenshots
            .get(device_id)
            .cloned()
            .unwrap_or_else(|| ScreenCapture {
                ok: false,
                png: Vec::new(),
                message: format!("error: device '{device_id}' offline"),
            }))
    }
}

/// Smallest byte string [`png_dimensions`](super::parse::png_dimensions)
/// accepts: signature plus an IHDR chunk.
#[must_use]
pub fn png_header(width: u32, height: u32) -> Vec<u8> {
    let mut png = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
    png.extend_from_slice(&13u32.to_be_bytes());
    png.extend_from_slice(b"IHDR");
    png.extend_from_slice(&width.to_be_bytes());
    png.extend_from_slice(&height.to_be_bytes());
    png.extend_from_slice(&[8, 6, 0, 0, 0]);
    png
}
