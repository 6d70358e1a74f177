//! Device screen capture
//!
//! A [`CaptureLauncher`] brings up the device-side capture server and hands
//! back the raw video socket; a [`CaptureSession`] owns what it returns.

mod bootstrap;
pub mod scrcpy;
mod session;

use async_trait::async_trait;
use tokio::io::AsyncRead;
use tokio::process::Child;

pub use bootstrap::BootstrapCache;
pub use scrcpy::{PortForward, ScrcpyLauncher};
pub use session::{CaptureSession, SessionState};

use crate::error::StreamResult;

/// Raw H.264 Annex-B byte stream
pub type VideoStream = Box<dyn AsyncRead + Send + Unpin>;

/// Everything a launch produced. Dropping it kills the process; the port
/// forward has to be removed explicitly.
pub struct CaptureChannel {
    pub video: VideoStream,
    pub process: Option<Child>,
    pub forward: Option<PortForward>,
}

impl CaptureChannel {
    pub fn new(video: VideoStream) -> Self {
        Self {
            video,
            process: None,
            forward: None,
        }
    }

    /// Kill the process and remove the port forward.
    pub async fn release(mut self) {
        if let Some(child) = self.process.as_mut() {
            let _ = child.start_kill();
        }
        if let Some(forward) = self.forward.take() {
            forward.remove().await;
        }
    }
}

/// Starts a capture server on a device reachable at `address`.
#[async_trait]
pub trait CaptureLauncher: Send + Sync {
    async fn launch(&self, address: &str) -> StreamResult<CaptureChannel>;
}
