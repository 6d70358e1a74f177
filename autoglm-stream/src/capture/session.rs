use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::process::Child;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::bootstrap::BootstrapCache;
use super::scrcpy::PortForward;
use super::{CaptureChannel, CaptureLauncher, VideoStream};
use crate::error::{StreamError, StreamResult};
use crate::nal::{NalReader, NalUnit};

/// Capture session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Starting,
    /// Video socket open, bootstrap data not handed out yet
    Ready,
    /// Bootstrap data handed out at least once
    Streaming,
    Failed,
    Stopped,
}

impl SessionState {
    /// Usable by a new viewer
    #[must_use]
    pub const fn is_live(self) -> bool {
        matches!(self, Self::Ready | Self::Streaming)
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Failed | Self::Stopped)
    }
}

#[derive(Default)]
struct Resources {
    process: Option<Child>,
    forward: Option<PortForward>,
}

/// One running capture of one device.
///
/// Reads are serialized over the single video socket. Every path out of a
/// live state (stop, read failure, drop) goes through [`Self::teardown`].
pub struct CaptureSession {
    device_id: String,
    address: String,
    state: Mutex<SessionState>,
    cache: Mutex<BootstrapCache>,
    bootstrap_ready: Notify,
    reader: tokio::sync::Mutex<Option<NalReader<VideoStream>>>,
    resources: Mutex<Resources>,
    cancel: CancellationToken,
}

impl CaptureSession {
    /// `device_id` names the session in logs and the registry; `address` is
    /// what the launcher connects to.
    pub fn new(device_id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            address: address.into(),
            state: Mutex::new(SessionState::Starting),
            cache: Mutex::new(BootstrapCache::default()),
            bootstrap_ready: Notify::new(),
            reader: tokio::sync::Mutex::new(None),
            resources: Mutex::new(Resources::default()),
            cancel: CancellationToken::new(),
        }
    }

    #[must_use]
    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.lock()
    }

    /// Launch the capture server and open the video socket.
    pub async fn start(&self, launcher: &dyn CaptureLauncher) -> StreamResult<()> {
        if self.state() != SessionState::Starting {
            return Err(StreamError::CaptureStart(format!(
                "Session for {} cannot be started from {:?}",
                self.device_id,
                self.state()
            )));
        }

        let channel = match launcher.launch(&self.address).await {
            Ok(channel) => channel,
            Err(e) => {
                warn!(device_id = %self.device_id, error = %e, "Capture start failed");
                self.close(SessionState::Failed).await;
                return Err(e);
            }
        };

        let CaptureChannel {
            video,
            process,
            forward,
        } = channel;
        *self.reader.lock().await = Some(NalReader::new(video));

        // stop() may have run while launching and found nothing to release
        let leftover = {
            let mut state = self.state.lock();
            if state.is_terminal() {
                Some((process, forward))
            } else {
                let mut resources = self.resources.lock();
                resources.process = process;
                resources.forward = forward;
                *state = SessionState::Ready;
                None
            }
        };

        if let Some((process, forward)) = leftover {
            self.reader.lock().await.take();
            CaptureChannel {
                video: Box::new(tokio::io::empty()),
                process,
                forward,
            }
            .release()
            .await;
            return Err(StreamError::CaptureStart(format!(
                "Session for {} was stopped during start",
                self.device_id
            )));
        }

        info!(device_id = %self.device_id, address = %self.address, "Capture session ready");
        Ok(())
    }

    /// Read the next NAL unit, caching SPS/PPS/IDR when `auto_cache` is set.
    ///
    /// Any read failure is final: the session moves to `Failed`.
    pub async fn read_nal_unit(&self, auto_cache: bool) -> StreamResult<NalUnit> {
        let mut guard = self.reader.lock().await;
        if self.state().is_terminal() {
            guard.take();
            return Err(StreamError::Transport(format!(
                "Capture session for {} is closed",
                self.device_id
            )));
        }
        let Some(reader) = guard.as_mut() else {
            return Err(StreamError::Unexpected(format!(
                "Capture session for {} read before start",
                self.device_id
            )));
        };

        let result = tokio::select! {
            r = reader.read_unit() => r.map_err(|e| StreamError::Transport(e.to_string())),
            () = self.cancel.cancelled() => Err(StreamError::Transport(format!(
                "Capture session for {} was stopped",
                self.device_id
            ))),
        };

        match result {
            Ok(unit) => {
                drop(guard);
                if auto_cache {
                    self.cache_unit(&unit);
                }
                Ok(unit)
            }
            Err(e) => {
                guard.take();
                drop(guard);
                warn!(device_id = %self.device_id, error = %e, "Video read failed");
                self.close(SessionState::Failed).await;
                Err(e)
            }
        }
    }

    fn cache_unit(&self, unit: &NalUnit) {
        let mut cache = self.cache.lock();
        if cache.offer(unit) {
            let (sps, pps, idr) = cache.sizes();
            drop(cache);
            info!(device_id = %self.device_id, sps, pps, idr, "Bootstrap data cached");
            self.bootstrap_ready.notify_waiters();
        }
    }

    /// `SPS ++ PPS ++ IDR` once all three are cached. Never blocks.
    pub fn get_initialization_data(&self) -> Option<Bytes> {
        let blob = self.cache.lock().blob()?;
        let mut state = self.state.lock();
        if *state == SessionState::Ready {
            *state = SessionState::Streaming;
        }
        Some(blob)
    }

    /// Fresh-session bootstrap: read up to `attempts` units until the
    /// bootstrap set is complete.
    pub async fn initialize(&self, attempts: u32, retry_delay: Duration) -> StreamResult<Bytes> {
        for attempt in 1..=attempts {
            match self.read_nal_unit(true).await {
                Ok(unit) => debug!(
                    device_id = %self.device_id,
                    attempt,
                    nal_type = %unit.nal_type(),
                    size = unit.len(),
                    "Read NAL unit during initialization"
                ),
                Err(e) => {
                    warn!(device_id = %self.device_id, attempt, error = %e, "Failed to read NAL unit");
                    // A closed session cannot recover; report why instead of timing out
                    if self.state().is_terminal() {
                        return Err(e);
                    }
                    tokio::time::sleep(retry_delay).await;
                    continue;
                }
            }
            if let Some(blob) = self.get_initialization_data() {
                info!(device_id = %self.device_id, attempt, size = blob.len(), "Initialization complete");
                return Ok(blob);
            }
        }
        Err(StreamError::InitTimeout {
            device_id: self.device_id.clone(),
            attempts,
        })
    }

    /// Reused-session bootstrap: poll the cache, waking early when another
    /// reader completes it.
    pub async fn wait_for_initialization(
        &self,
        attempts: u32,
        delay: Duration,
    ) -> StreamResult<Bytes> {
        for attempt in 1..=attempts {
            let notified = self.bootstrap_ready.notified();
            if let Some(blob) = self.get_initialization_data() {
                return Ok(blob);
            }
            debug!(device_id = %self.device_id, attempt, attempts, "Waiting for initialization data");
            let _ = tokio::time::timeout(delay, notified).await;
        }
        self.get_initialization_data()
            .ok_or_else(|| StreamError::InitTimeout {
                device_id: self.device_id.clone(),
                attempts,
            })
    }

    /// Release everything. Safe to repeat and safe before `start` finishes.
    pub async fn stop(&self) {
        self.close(SessionState::Stopped).await;
    }

    async fn close(&self, terminal: SessionState) {
        if let Some(forward) = self.teardown(terminal) {
            forward.remove().await;
        }
    }

    /// Single exit from the live states. Returns the port forward, whose
    /// removal the caller completes (async or spawned).
    fn teardown(&self, terminal: SessionState) -> Option<PortForward> {
        {
            let mut state = self.state.lock();
            if state.is_terminal() {
                return None;
            }
            *state = terminal;
        }

        self.cancel.cancel();
        // A reader mid-read drops the socket itself once cancelled
        if let Ok(mut reader) = self.reader.try_lock() {
            reader.take();
        }

        let mut resources = self.resources.lock();
        if let Some(mut process) = resources.process.take() {
            let _ = process.start_kill();
        }
        debug!(device_id = %self.device_id, state = ?terminal, "Capture session closed");
        resources.forward.take()
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        if let Some(forward) = self.teardown(SessionState::Stopped) {
            forward.spawn_remove();
        }
    }
}
