//! Device transport layer
//!
//! [`DeviceTransport`] is the seam between connection management and the
//! `adb` executable. [`AdbTransport`] drives the real binary; tests use the
//! scripted [`mock::MockTransport`].

mod command;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod parse;
mod transport;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use command::{Adb, AdbOutput};
pub use transport::AdbTransport;

use crate::error::Result;

/// How a device is attached to the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    Usb,
    /// TCP/IP, including mDNS wireless-debugging endpoints
    Remote,
}

impl ConnectionType {
    #[must_use]
    pub fn from_device_id(device_id: &str) -> Self {
        if device_id.contains(':') || device_id.contains("._adb-tls-connect.") {
            Self::Remote
        } else {
            Self::Usb
        }
    }
}

/// One entry of the transport's device list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Transport address (USB serial or `ip:port`)
    pub device_id: String,
    /// `device`, `offline`, `unauthorized`, ...
    pub status: String,
    pub connection_type: ConnectionType,
    pub model: Option<String>,
}

impl DeviceInfo {
    #[must_use]
    pub fn is_online(&self) -> bool {
        self.status == "device"
    }
}

/// Result of a transport command that ran to completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutcome {
    pub ok: bool,
    /// Trimmed output of the command
    pub message: String,
}

impl CommandOutcome {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            ok: true,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            message: message.into(),
        }
    }
}

/// Upstream device transport.
///
/// Raw result of a screen capture
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScreenCapture {
    pub ok: bool,
    /// PNG bytes when `ok`
    pub png: Vec<u8>,
    /// adb's diagnostics when not `ok`
    pub message: String,
}

/// `Err` is reserved for the command not running at all (missing binary,
/// timeout); a command that ran and reported failure is an `Ok` outcome.
#[async_trait]
pub trait DeviceTransport: Send + Sync {
    async fn list_devices(&self) -> Result<Vec<DeviceInfo>>;

    /// The named device, or the first online one when `device_id` is `None`.
    async fn get_device_info(&self, device_id: Option<&str>) -> Result<Option<DeviceInfo>> {
        let devices = self.list_devices().await?;
        Ok(match device_id {
            Some(id) => devices.into_iter().find(|d| d.device_id == id),
            None => devices.into_iter().find(DeviceInfo::is_online),
        })
    }

    /// Restart adbd on the device in TCP mode on `port`.
    async fn enable_tcpip(&self, port: u16, device_id: &str) -> Result<CommandOutcome>;

    /// Address of the WiFi interface, if it has one
    async fn get_wifi_ip(&self, device_id: &str) -> Option<String>;

    /// Any routable address of the device
    async fn get_device_ip(&self, device_id: &str) -> Option<String>;

    async fn connect(&self, address: &str) -> Result<CommandOutcome>;

    async fn disconnect(&self, device_id: &str) -> Result<CommandOutcome>;

    /// Raw output of a wireless-debugging pairing attempt.
    async fn pair(&self, address: &str, code: &str) -> Result<String>;

    /// Hardware serial (`ro.serialno`)
    async fn get_serial(&self, address: &str) -> Option<String>;

    /// Screen contents as `screencap -p` produced them.
    async fn screenshot(&self, device_id: &str) -> Result<ScreenCapture>;
}
