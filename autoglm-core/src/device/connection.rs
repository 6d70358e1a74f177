use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::adb::parse::{classify_pair_output, PairOutcome};
use crate::adb::{ConnectionType, DeviceTransport};
use crate::error::{Error, Result, TransportFailure};
use crate::validation::{validate_ip, validate_pairing_code, validate_port};

/// Default port adbd listens on in TCP mode
pub const DEFAULT_ADB_PORT: u16 = 5555;

/// Outcome of a connection-changing request, as reported to clients.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionAttempt {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub device_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
}

/// A device reachable at `address` after a composite flow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Connected {
    pub device_id: Option<String>,
    pub address: String,
    pub message: String,
}

impl From<Result<Connected>> for ConnectionAttempt {
    fn from(result: Result<Connected>) -> Self {
        match result {
            Ok(c) => Self {
                success: true,
                message: c.message,
                device_id: c.device_id,
                address: Some(c.address),
                error_code: None,
            },
            Err(e) => Self {
                success: false,
                message: e.message(),
                device_id: None,
                address: None,
                error_code: Some(e.code().to_string()),
            },
        }
    }
}

/// Reassign the failure kind of a transport error; other errors pass through.
fn rekind(err: Error, failure: TransportFailure) -> Error {
    match err {
        Error::Transport { message, .. } => Error::transport(failure, message),
        other => other,
    }
}

/// Switches devices between USB and WiFi and pairs new wireless devices.
///
/// Holds no state between calls; every operation goes straight to the
/// transport.
pub struct ConnectionManager {
    transport: Arc<dyn DeviceTransport>,
    tcpip_settle: Duration,
}

impl ConnectionManager {
    /// `tcpip_settle` is how long to wait for adbd to come back after
    /// switching to TCP mode.
    pub fn new(transport: Arc<dyn DeviceTransport>, tcpip_settle: Duration) -> Self {
        Self {
            transport,
            tcpip_settle,
        }
    }

    pub async fn enable_tcpip(&self, port: u16, device_id: &str) -> Result<()> {
        let failed = |message: String| Error::transport(TransportFailure::TcpipEnable, message);

        let info = self
            .transport
            .get_device_info(Some(device_id))
            .await
            .map_err(|e| failed(e.message()))?
            .ok_or_else(|| failed(format!("Device {device_id} not found")))?;
        if info.connection_type != ConnectionType::Usb {
            return Err(failed(format!("Device {device_id} is not connected via USB")));
        }

        let outcome = self
            .transport
            .enable_tcpip(port, device_id)
            .await
            .map_err(|e| failed(e.message()))?;
        if !outcome.ok {
            return Err(failed(format!("Failed to enable TCP/IP mode: {}", outcome.message)));
        }
        Ok(())
    }

    /// WiFi interface address first, then any routable address.
    pub async fn discover_ip(&self, device_id: &str) -> Result<String> {
        if let Some(ip) = self.transport.get_wifi_ip(device_id).await {
            return Ok(ip);
        }
        if let Some(ip) = self.transport.get_device_ip(device_id).await {
            return Ok(ip);
        }
        Err(Error::transport(
            TransportFailure::IpDiscovery,
            "Failed to get device IP address. Make sure the device is connected to WiFi",
        ))
    }

    pub async fn connect(&self, address: &str) -> Result<String> {
        let outcome = self
            .transport
            .connect(address)
            .await
            .map_err(|e| Error::transport(TransportFailure::Connect, e.message()))?;
        if outcome.ok {
            Ok(outcome.message)
        } else {
            Err(Error::transport(TransportFailure::Connect, outcome.message))
        }
    }

    pub async fn disconnect(&self, device_id: &str) -> Result<String> {
        let outcome = self
            .transport
            .disconnect(device_id)
            .await
            .map_err(|e| Error::transport(TransportFailure::Disconnect, e.message()))?;
        if outcome.ok {
            info!(device_id, "Disconnected");
            Ok(outcome.message)
        } else {
            Err(Error::transport(TransportFailure::Disconnect, outcome.message))
        }
    }

    /// Pair with a device in wireless-debugging mode. Returns `ip:port`.
    ///
    /// The code is checked before anything is sent; the device's answer is
    /// classified from adb's output text.
    pub async fn pair(&self, ip: &str, port: u16, code: &str) -> Result<String> {
        validate_pairing_code(code)?;

        let address = format!("{ip}:{port}");
        let output = self.transport.pair(&address, code).await.map_err(|e| {
            Error::transport(TransportFailure::Pair, format!("Pairing failed: {}", e.message()))
        })?;

        match classify_pair_output(&output) {
            PairOutcome::Paired => {
                info!(address = %address, "Paired");
                Ok(address)
            }
            PairOutcome::InvalidCode => Err(Error::transport(
                TransportFailure::InvalidPairingCode,
                "Invalid pairing code",
            )),
            PairOutcome::Refused => Err(Error::transport(
                TransportFailure::ConnectionRefused,
                "Connection refused - check IP and port",
            )),
            PairOutcome::Failed(out) => Err(Error::transport(
                TransportFailure::Pair,
                format!("Pairing failed: {out}"),
            )),
            PairOutcome::Unknown(out) if out.is_empty() => {
                Err(Error::transport(TransportFailure::Pair, "Unknown pairing error"))
            }
            PairOutcome::Unknown(out) => Err(Error::transport(TransportFailure::Pair, out)),
        }
    }

    /// Promote a USB device to WiFi. A device already on TCP/IP is reported
    /// as connected without touching it.
    pub async fn connect_wifi(&self, device_id: Option<&str>, port: i64) -> Result<Connected> {
        let port = validate_port("Port", port)?;

        let info = self
            .transport
            .get_device_info(device_id)
            .await?
            .ok_or_else(|| {
                Error::DeviceNotFound(device_id.map_or_else(
                    || "No connected device".to_string(),
                    |id| format!("Device {id} not found"),
                ))
            })?;

        if info.connection_type == ConnectionType::Remote {
            return Ok(Connected {
                device_id: Some(info.device_id.clone()),
                address: info.device_id,
                message: "Already connected over WiFi".to_string(),
            });
        }

        self.enable_tcpip(port, &info.device_id).await?;
        if !self.tcpip_settle.is_zero() {
            tokio::time::sleep(self.tcpip_settle).await;
        }

        let ip = self.discover_ip(&info.device_id).await?;
        let address = format!("{ip}:{port}");
        self.connect(&address).await?;

        info!(usb_id = %info.device_id, address = %address, "Switched device to WiFi");
        Ok(Connected {
            device_id: Some(address.clone()),
            address,
            message: "Switched to WiFi successfully".to_string(),
        })
    }

    /// Connect to a device already listening on `ip:port`, no USB involved.
    pub async fn connect_manual(&self, ip: &str, port: i64) -> Result<Connected> {
        validate_ip(ip)?;
        let port = validate_port("Port", port)?;

        let address = format!("{ip}:{port}");
        self.connect(&address)
            .await
            .map_err(|e| rekind(e, TransportFailure::ManualConnect))?;

        Ok(Connected {
            device_id: Some(address.clone()),
            address: address.clone(),
            message: format!("Successfully connected to {address}"),
        })
    }

    /// Pair on `pairing_port`, then connect on `connection_port`.
    pub async fn pair_and_connect(
        &self,
        ip: &str,
        pairing_port: i64,
        code: &str,
        connection_port: i64,
    ) -> Result<Connected> {
        validate_ip(ip)?;
        let pairing_port = validate_port("Pairing port", pairing_port)?;
        let connection_port = validate_port("Connection port", connection_port)?;
        validate_pairing_code(code)?;

        self.pair(ip, pairing_port, code).await?;

        let address = format!("{ip}:{connection_port}");
        if let Err(e) = self.connect(&address).await {
            warn!(address = %address, error = %e, "Connect after pairing failed");
            return Err(Error::transport(
                TransportFailure::PairedNotConnected,
                format!("Paired successfully but connection failed: {}", e.message()),
            ));
        }

        Ok(Connected {
            device_id: Some(address.clone()),
            address: address.clone(),
            message: format!("Successfully paired and connected to {address}"),
        })
    }
}
