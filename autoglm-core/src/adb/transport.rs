use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::command::Adb;
use super::parse;
use super::{CommandOutcome, DeviceInfo, DeviceTransport, ScreenCapture};
use crate::config::AdbConfig;
use crate::error::Result;

/// [`DeviceTransport`] backed by the `adb` executable.
#[derive(Debug, Clone)]
pub struct AdbTransport {
    adb: Adb,
    pair_timeout: Duration,
}

impl AdbTransport {
    #[must_use]
    pub fn new(config: &AdbConfig) -> Self {
        Self {
            adb: Adb::from_config(config),
            pair_timeout: config.pair_timeout(),
        }
    }

    /// Shared command runner, also used by the capture launcher
    #[must_use]
    pub const fn adb(&self) -> &Adb {
        &self.adb
    }

    async fn shell(&self, device_id: &str, args: &[&str]) -> Option<String> {
        let mut full = vec!["shell"];
        full.extend_from_slice(args);
        match self.adb.run(Some(device_id), &full).await {
            Ok(out) if out.success => Some(out.stdout),
            Ok(out) => {
                debug!(device_id, stderr = %out.stderr.trim(), "adb shell command failed");
                None
            }
            Err(e) => {
                warn!(device_id, error = %e, "adb shell command could not run");
                None
            }
        }
    }
}

#[async_trait]
impl DeviceTransport for AdbTransport {
    async fn list_devices(&self) -> Result<Vec<DeviceInfo>> {
        let out = self.adb.run(None, ["devices", "-l"]).await?;
        Ok(parse::parse_devices(&out.stdout))
    }

    async fn enable_tcpip(&self, port: u16, device_id: &str) -> Result<CommandOutcome> {
        let port_arg = port.to_string();
        let out = self
            .adb
            .run(Some(device_id), ["tcpip", port_arg.as_str()])
            .await?;
        let text = out.combined();
        if parse::tcpip_succeeded(&text, out.success) {
            info!(device_id, port, "Restarted adbd in TCP mode");
            Ok(CommandOutcome::ok(text.trim()))
        } else {
            Ok(CommandOutcome::failed(text.trim()))
        }
    }

    async fn get_wifi_ip(&self, device_id: &str) -> Option<String> {
        let out = self
            .shell(device_id, &["ip", "-f", "inet", "addr", "show", "wlan0"])
            .await?;
        parse::parse_inet_addr(&out)
    }

    async fn get_device_ip(&self, device_id: &str) -> Option<String> {
        let out = self.shell(device_id, &["ip", "route"]).await?;
        parse::parse_route_src(&out)
    }

    async fn connect(&self, address: &str) -> Result<CommandOutcome> {
        let out = self.adb.run(None, ["connect", address]).await?;
        let text = out.combined();
        if parse::connect_succeeded(&text) {
            info!(address, "adb connected");
            Ok(CommandOutcome::ok(text.trim()))
        } else {
            Ok(CommandOutcome::failed(text.trim()))
        }
    }

    async fn disconnect(&self, device_id: &str) -> Result<CommandOutcome> {
        let out = self.adb.run(None, ["disconnect", device_id]).await?;
        let text = out.combined();
        if parse::disconnect_succeeded(&text) {
            info!(device_id, "adb disconnected");
            Ok(CommandOutcome::ok(text.trim()))
        } else {
            Ok(CommandOutcome::failed(text.trim()))
        }
    }

    async fn pair(&self, address: &str, code: &str) -> Result<String> {
        let out = self
            .adb
            .run_with_timeout(None, ["pair", address, code], self.pair_timeout)
            .await?;
        Ok(out.combined())
    }

    async fn get_serial(&self, address: &str) -> Option<String> {
        let out = self.shell(address, &["getprop", "ro.serialno"]).await?;
        parse::parse_serial(&out)
    }

    async fn screenshot(&self, device_id: &str) -> Result<ScreenCapture> {
        // exec-out keeps the PNG free of shell line-ending translation
        let out = self
            .adb
            .run_binary(Some(device_id), ["exec-out", "screencap", "-p"])
            .await?;
        if out.status.success() {
            debug!(device_id, size = out.stdout.len(), "Captured screenshot");
            Ok(ScreenCapture {
                ok: true,
                png: out.stdout,
                message: String::new(),
            })
        } else {
            Ok(ScreenCapture {
                ok: false,
                png: Vec::new(),
                message: String::from_utf8_lossy(&out.stderr).trim().to_string(),
            })
        }
    }
}
