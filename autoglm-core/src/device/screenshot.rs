//! One-off screen captures

use tracing::{debug, warn};

use crate::adb::{parse, DeviceTransport};
use crate::error::{Error, Result, TransportFailure};

/// A decoded-enough PNG of the device screen
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screenshot {
    pub device_id: String,
    pub png: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

/// Capture the screen of `device_id`, or of the first online device.
///
/// Offline or unknown devices yield [`Error::DeviceNotFound`]. A capture
/// that fails on the device or does not start with a PNG header is a
/// [`TransportFailure::Screenshot`].
pub async fn capture_screenshot(
    transport: &dyn DeviceTransport,
    device_id: Option<&str>,
) -> Result<Screenshot> {
    let info = transport
        .get_device_info(device_id)
        .await?
        .filter(|d| d.is_online())
        .ok_or_else(|| {
            Error::DeviceNotFound(device_id.map_or_else(
                || "No connected device".to_string(),
                |id| format!("Device {id} not found"),
            ))
        })?;

    let capture = transport.screenshot(&info.device_id).await?;
    if !capture.ok {
        warn!(device_id = %info.device_id, message = %capture.message, "screencap failed");
        return Err(Error::transport(
            TransportFailure::Screenshot,
            format!("Screenshot failed: {}", capture.message),
        ));
    }

    let (width, height) = parse::png_dimensions(&capture.png).ok_or_else(|| {
        Error::transport(
            TransportFailure::Screenshot,
            "Screenshot failed: device did not return a PNG image",
        )
    })?;
    debug!(device_id = %info.device_id, width, height, "Screenshot captured");

    Ok(Screenshot {
        device_id: info.device_id,
        png: capture.png,
        width,
        height,
    })
}
