//! scrcpy server launcher
//!
//! Pushes the server jar, forwards a local TCP port to the server's abstract
//! socket and starts the server in raw-stream mode, which writes a bare
//! H.264 Annex-B stream with no framing or metadata.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use autoglm_core::adb::Adb;
use autoglm_core::config::StreamConfig;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use super::{CaptureChannel, CaptureLauncher};
use crate::error::{StreamError, StreamResult};

/// Where the server jar lives on the device
const DEVICE_SERVER_PATH: &str = "/data/local/tmp/scrcpy-server.jar";

const SERVER_CLASS: &str = "com.genymobile.scrcpy.Server";

/// How long a freshly opened video socket may stay silent
const FIRST_BYTE_TIMEOUT: Duration = Duration::from_secs(10);

/// `adb forward tcp:<port> localabstract:...` owned by a capture session.
#[derive(Debug)]
pub struct PortForward {
    adb: Adb,
    serial: String,
    local_port: u16,
}

impl PortForward {
    #[must_use]
    pub const fn local_port(&self) -> u16 {
        self.local_port
    }

    pub async fn remove(self) {
        let local = format!("tcp:{}", self.local_port);
        match self
            .adb
            .run(Some(&self.serial), ["forward", "--remove", local.as_str()])
            .await
        {
            Ok(out) if out.success => debug!(device_id = %self.serial, port = self.local_port, "Removed port forward"),
            Ok(out) => warn!(
                device_id = %self.serial,
                port = self.local_port,
                output = %out.combined().trim(),
                "Failed to remove port forward"
            ),
            Err(e) => warn!(device_id = %self.serial, error = %e, "Failed to remove port forward"),
        }
    }

    /// Remove from a synchronous context (drop paths).
    pub fn spawn_remove(self) {
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(self.remove());
            }
            Err(_) => warn!(
                device_id = %self.serial,
                port = self.local_port,
                "No runtime available, port forward left in place"
            ),
        }
    }
}

/// [`CaptureLauncher`] that runs the scrcpy server through adb.
pub struct ScrcpyLauncher {
    adb: Adb,
    config: StreamConfig,
}

impl ScrcpyLauncher {
    pub const fn new(adb: Adb, config: StreamConfig) -> Self {
        Self { adb, config }
    }

    /// Server options after the version argument
    fn server_args(&self, scid: &str) -> Vec<String> {
        vec![
            format!("scid={scid}"),
            "log_level=info".to_string(),
            "tunnel_forward=true".to_string(),
            "audio=false".to_string(),
            "control=false".to_string(),
            "cleanup=false".to_string(),
            "raw_stream=true".to_string(),
            format!("max_size={}", self.config.max_size),
            format!("video_bit_rate={}", self.config.bit_rate),
            format!("max_fps={}", self.config.max_fps),
            "video_codec=h264".to_string(),
        ]
    }

    async fn push_server(&self, address: &str) -> StreamResult<()> {
        let out = self
            .adb
            .run(Some(address), ["push", self.config.server_path.as_str(), DEVICE_SERVER_PATH])
            .await
            .map_err(|e| StreamError::CaptureStart(e.to_string()))?;
        if !out.success {
            return Err(StreamError::CaptureStart(format!(
                "Failed to push {}: {}",
                self.config.server_path,
                out.combined().trim()
            )));
        }
        Ok(())
    }

    /// Forward a free local port; adb picks it when asked for `tcp:0`.
    async fn open_forward(&self, address: &str, scid: &str) -> StreamResult<PortForward> {
        let remote = format!("localabstract:scrcpy_{scid}");
        let out = self
            .adb
            .run(Some(address), ["forward", "tcp:0", remote.as_str()])
            .await
            .map_err(|e| StreamError::CaptureStart(e.to_string()))?;
        if !out.success {
            return Err(StreamError::CaptureStart(format!(
                "Failed to forward port: {}",
                out.combined().trim()
            )));
        }
        let local_port = out.stdout.trim().parse::<u16>().map_err(|_| {
            StreamError::CaptureStart(format!(
                "Unexpected adb forward output: {}",
                out.stdout.trim()
            ))
        })?;
        Ok(PortForward {
            adb: self.adb.clone(),
            serial: address.to_string(),
            local_port,
        })
    }

    fn spawn_server(&self, address: &str, scid: &str) -> StreamResult<tokio::process::Child> {
        let mut cmd = self.adb.command(Some(address));
        cmd.arg("shell")
            .arg(format!("CLASSPATH={DEVICE_SERVER_PATH}"))
            .args(["app_process", "/", SERVER_CLASS, self.config.server_version.as_str()])
            .args(self.server_args(scid))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| StreamError::CaptureStart(format!("Failed to start scrcpy server: {e}")))?;

        if let Some(stdout) = child.stdout.take() {
            forward_server_log(address.to_string(), stdout);
        }
        if let Some(stderr) = child.stderr.take() {
            forward_server_log(address.to_string(), stderr);
        }
        Ok(child)
    }

    /// The forward accepts before the server listens; such connections
    /// close without data and are retried.
    async fn connect_video(&self, address: &str, port: u16) -> StreamResult<TcpStream> {
        let attempts = self.config.connect_attempts;
        for attempt in 1..=attempts {
            match TcpStream::connect(("127.0.0.1", port)).await {
                Ok(stream) => {
                    let mut first = [0u8; 1];
                    match tokio::time::timeout(FIRST_BYTE_TIMEOUT, stream.peek(&mut first)).await {
                        Ok(Ok(n)) if n > 0 => {
                            debug!(device_id = address, port, attempt, "Video socket connected");
                            return Ok(stream);
                        }
                        Ok(Ok(_)) => debug!(device_id = address, attempt, "Video socket closed before data"),
                        Ok(Err(e)) => debug!(device_id = address, attempt, error = %e, "Video socket peek failed"),
                        Err(_) => {
                            return Err(StreamError::CaptureStart(format!(
                                "No video data from {address} within {}s",
                                FIRST_BYTE_TIMEOUT.as_secs()
                            )))
                        }
                    }
                }
                Err(e) => debug!(device_id = address, attempt, error = %e, "Video socket connect failed"),
            }
            tokio::time::sleep(self.config.connect_retry()).await;
        }
        Err(StreamError::CaptureStart(format!(
            "Could not connect to scrcpy server on {address} after {attempts} attempts"
        )))
    }
}

/// Relay the server's console output into the log.
fn forward_server_log<R>(device_id: String, output: R)
where
    R: AsyncRead + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(output).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            debug!(device_id = %device_id, "scrcpy: {line}");
        }
    });
}

#[async_trait]
impl CaptureLauncher for ScrcpyLauncher {
    async fn launch(&self, address: &str) -> StreamResult<CaptureChannel> {
        self.push_server(address).await?;

        let scid = format!("{:08x}", rand::random::<u32>() & 0x7FFF_FFFF);
        let forward = self.open_forward(address, &scid).await?;
        let port = forward.local_port();

        let mut process = match self.spawn_server(address, &scid) {
            Ok(child) => child,
            Err(e) => {
                forward.remove().await;
                return Err(e);
            }
        };

        match self.connect_video(address, port).await {
            Ok(stream) => {
                info!(device_id = address, port, scid = %scid, "scrcpy server started");
                Ok(CaptureChannel {
                    video: Box::new(stream),
                    process: Some(process),
                    forward: Some(forward),
                })
            }
            Err(e) => {
                let _ = process.start_kill();
                forward.remove().await;
                Err(e)
            }
        }
    }
}
