//! Parsers for adb's free-text output
//!
//! adb exposes no structured status for most subcommands, so success and
//! failure are recognised from the text it prints. The pairing classifier in
//! particular is best-effort: it matches the wording of current platform-tools
//! releases and may misclassify future wording as a generic failure.

use super::{ConnectionType, DeviceInfo};

/// Parse `adb devices -l`.
///
/// ```text
/// List of devices attached
/// 0123456789ABCDEF       device usb:1-1 product:x model:Pixel_7 device:y transport_id:1
/// 192.168.1.100:5555     device product:x model:Pixel_7 device:y transport_id:2
/// ```
#[must_use]
pub fn parse_devices(output: &str) -> Vec<DeviceInfo> {
    output
        .lines()
        .map(str::trim)
        .filter(|line| {
            !line.is_empty() && !line.starts_with("List of devices") && !line.starts_with('*')
        })
        .filter_map(|line| {
            let mut parts = line.split_whitespace();
            let device_id = parts.next()?.to_string();
            let status = parts.next()?.to_string();
            let model = parts
                .find_map(|p| p.strip_prefix("model:"))
                .map(ToString::to_string);
            Some(DeviceInfo {
                connection_type: ConnectionType::from_device_id(&device_id),
                device_id,
                status,
                model,
            })
        })
        .collect()
}

/// First non-loopback IPv4 address from `ip -f inet addr show <iface>`.
#[must_use]
pub fn parse_inet_addr(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let mut parts = line.split_whitespace();
        while let Some(part) = parts.next() {
            if part == "inet" {
                let ip = parts.next()?.split('/').next()?;
                if !ip.starts_with("127.") {
                    return Some(ip.to_string());
                }
            }
        }
        None
    })
}

/// Source address from `ip route` (`... src 192.168.1.100 ...`).
#[must_use]
pub fn parse_route_src(output: &str) -> Option<String> {
    output.lines().find_map(|line| {
        let parts: Vec<&str> = line.split_whitespace().collect();
        parts
            .windows(2)
            .find(|w| w[0] == "src")
            .map(|w| w[1].to_string())
            .filter(|ip| !ip.starts_with("127."))
    })
}

/// `adb tcpip` prints `restarting in TCP mode port: 5555` on success.
#[must_use]
pub fn tcpip_succeeded(output: &str, exit_success: bool) -> bool {
    let lower = output.to_lowercase();
    if lower.contains("error") {
        return false;
    }
    lower.contains("restarting") || exit_success
}

/// `adb connect` exits 0 even on failure; only the text tells.
#[must_use]
pub fn connect_succeeded(output: &str) -> bool {
    let lower = output.to_lowercase();
    lower.contains("connected")
        && !lower.contains("cannot")
        && !lower.contains("failed")
        && !lower.contains("unable")
}

#[must_use]
pub fn disconnect_succeeded(output: &str) -> bool {
    let lower = output.to_lowercase();
    lower.contains("disconnected") && !lower.contains("error")
}

/// `getprop ro.serialno` output, if it holds a serial
#[must_use]
pub fn parse_serial(output: &str) -> Option<String> {
    let serial = output.trim();
    if serial.is_empty() || serial.contains("error") || serial.contains(char::is_whitespace) {
        None
    } else {
        Some(serial.to_string())
    }
}

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

/// Width and height from a PNG's IHDR chunk. `None` when `data` is not a PNG.
#[must_use]
pub fn png_dimensions(data: &[u8]) -> Option<(u32, u32)> {
    if data.len() < 24 || data[..8] != PNG_SIGNATURE || &data[12..16] != b"IHDR" {
        return None;
    }
    let width = u32::from_be_bytes(data[16..20].try_into().ok()?);
    let height = u32::from_be_bytes(data[20..24].try_into().ok()?);
    Some((width, height))
}

/// Outcome of `adb pair` as recognised from its output
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairOutcome {
    Paired,
    InvalidCode,
    Refused,
    /// Failure with the trimmed output
    Failed(String),
    /// No recognised indicator; carries the trimmed output
    Unknown(String),
}

#[must_use]
pub fn classify_pair_output(output: &str) -> PairOutcome {
    let lower = output.to_lowercase();
    let trimmed = output.trim().to_string();

    if lower.contains("successfully paired") || lower.contains("success") {
        PairOutcome::Paired
    } else if lower.contains("failed") {
        if lower.contains("pairing code") {
            PairOutcome::InvalidCode
        } else if lower.contains("refused") {
            PairOutcome::Refused
        } else {
            PairOutcome::Failed(trimmed)
        }
    } else {
        PairOutcome::Unknown(trimmed)
    }
}
