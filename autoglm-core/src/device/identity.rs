use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::adb::{DeviceInfo, DeviceTransport};
use crate::config::IdentityPolicy;
use crate::error::Result;

/// A device as seen through its current transport address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    /// What the transport talks to: USB serial or `ip:port`
    pub address: String,
    /// Hardware serial, when the device reported one
    pub serial: Option<String>,
}

impl DeviceIdentity {
    pub fn new(address: impl Into<String>, serial: Option<String>) -> Self {
        Self {
            address: address.into(),
            serial,
        }
    }

    /// Identity with no resolved serial; keys by address under every policy.
    pub fn from_address(address: impl Into<String>) -> Self {
        Self::new(address, None)
    }

    /// Key for per-device state under `policy`.
    #[must_use]
    pub fn key(&self, policy: IdentityPolicy) -> &str {
        match policy {
            IdentityPolicy::Address => &self.address,
            IdentityPolicy::Serial => self.serial.as_deref().unwrap_or(&self.address),
        }
    }
}

/// A listed device together with its hardware serial
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedDevice {
    #[serde(flatten)]
    pub info: DeviceInfo,
    pub serial: Option<String>,
}

/// Maps transport addresses to hardware serials.
///
/// Serials are cached per address. [`IdentityResolver::forget`] drops an
/// entry when the address stops pointing at the same device (disconnect).
pub struct IdentityResolver {
    transport: Arc<dyn DeviceTransport>,
    policy: IdentityPolicy,
    serials: DashMap<String, String>,
}

impl IdentityResolver {
    pub fn new(transport: Arc<dyn DeviceTransport>, policy: IdentityPolicy) -> Self {
        Self {
            transport,
            policy,
            serials: DashMap::new(),
        }
    }

    #[must_use]
    pub const fn policy(&self) -> IdentityPolicy {
        self.policy
    }

    pub async fn resolve(&self, address: &str) -> DeviceIdentity {
        if let Some(serial) = self.serials.get(address) {
            return DeviceIdentity::new(address, Some(serial.clone()));
        }

        let serial = self.transport.get_serial(address).await;
        match &serial {
            Some(s) => {
                debug!(address, serial = %s, "Resolved device serial");
                self.serials.insert(address.to_string(), s.clone());
            }
            None => debug!(address, "Device did not report a serial"),
        }
        DeviceIdentity::new(address, serial)
    }

    /// Resolve `address` and return the registry key for it.
    pub async fn key_for(&self, address: &str) -> (String, DeviceIdentity) {
        if self.policy == IdentityPolicy::Address {
            return (address.to_string(), DeviceIdentity::from_address(address));
        }
        let identity = self.resolve(address).await;
        (identity.key(self.policy).to_string(), identity)
    }

    pub fn forget(&self, address: &str) {
        self.serials.remove(address);
    }

    /// All devices with serials resolved for the online ones.
    pub async fn list_devices(&self) -> Result<Vec<ResolvedDevice>> {
        let devices = self.transport.list_devices().await?;
        let mut resolved = Vec::with_capacity(devices.len());
        for info in devices {
            let serial = if info.is_online() {
                self.resolve(&info.device_id).await.serial
            } else {
                None
            };
            resolved.push(ResolvedDevice { info, serial });
        }
        Ok(resolved)
    }
}
