//! AutoGLM video streaming: H.264 capture from Android devices and relay
//! to viewers.

pub mod capture;
pub mod error;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod nal;
pub mod recorder;
pub mod registry;
pub mod relay;

pub use capture::{CaptureLauncher, CaptureSession, ScrcpyLauncher, SessionState};
pub use error::{StreamError, StreamResult};
pub use registry::{DeviceGuard, SessionRegistry};
pub use relay::{Relay, RelayConfig, RelayOutcome, ViewerClosed, ViewerSink};
