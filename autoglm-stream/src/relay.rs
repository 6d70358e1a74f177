//! Per-viewer relay loop
//!
//! Attaches a viewer to its device's capture session, sends the bootstrap
//! blob as the first frame and then forwards one NAL unit per frame until
//! either side goes away.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use autoglm_core::config::StreamConfig;
use autoglm_core::device::DeviceIdentity;
use bytes::Bytes;
use tracing::{debug, error, info, warn};

use crate::capture::CaptureSession;
use crate::error::{StreamError, StreamResult};
use crate::recorder::DebugRecorder;
use crate::registry::SessionRegistry;

/// Units between progress log lines
const PROGRESS_INTERVAL: u64 = 100;

/// The viewer went away
#[derive(Debug, thiserror::Error)]
#[error("viewer disconnected")]
pub struct ViewerClosed;

/// Where relayed frames go. One `send_frame` is one binary message.
#[async_trait]
pub trait ViewerSink: Send {
    async fn send_frame(&mut self, frame: Bytes) -> Result<(), ViewerClosed>;

    /// Best effort; a viewer that is already gone is ignored.
    async fn send_error(&mut self, message: &str);
}

/// How a relay ended
#[derive(Debug)]
pub enum RelayOutcome {
    /// Session left running for other viewers
    ViewerDisconnected { forwarded: u64 },
    /// Session torn down and removed
    StreamFailed { forwarded: u64, error: StreamError },
    /// Never got as far as the first frame
    AttachFailed(StreamError),
}

impl RelayOutcome {
    /// NAL units forwarded after the bootstrap blob
    #[must_use]
    pub const fn forwarded(&self) -> u64 {
        match self {
            Self::ViewerDisconnected { forwarded } | Self::StreamFailed { forwarded, .. } => {
                *forwarded
            }
            Self::AttachFailed(_) => 0,
        }
    }
}

/// Bootstrap bounds and the optional debug capture directory
#[derive(Debug, Clone)]
pub struct RelayConfig {
    pub init_read_attempts: u32,
    pub init_retry_delay: Duration,
    pub cached_wait_attempts: u32,
    pub cached_wait_delay: Duration,
    pub debug_dir: Option<PathBuf>,
}

impl From<&StreamConfig> for RelayConfig {
    fn from(config: &StreamConfig) -> Self {
        Self {
            init_read_attempts: config.init_read_attempts,
            init_retry_delay: config.init_retry_delay(),
            cached_wait_attempts: config.cached_wait_attempts,
            cached_wait_delay: config.cached_wait_delay(),
            debug_dir: config
                .debug_save_stream
                .then(|| PathBuf::from(&config.debug_dir)),
        }
    }
}

pub struct Relay {
    registry: Arc<SessionRegistry>,
    config: RelayConfig,
}

impl Relay {
    pub const fn new(registry: Arc<SessionRegistry>, config: RelayConfig) -> Self {
        Self { registry, config }
    }

    #[must_use]
    pub const fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Serve one viewer of the device registered under `key`.
    pub async fn run<S>(&self, key: &str, identity: &DeviceIdentity, sink: &mut S) -> RelayOutcome
    where
        S: ViewerSink + ?Sized,
    {
        let mut recorder = self.open_recorder(key).await;

        let outcome = match self.attach(key, identity).await {
            Ok((session, blob)) => self.forward(key, &session, blob, sink, &mut recorder).await,
            Err(e) => {
                warn!(device_id = key, error = %e, "Failed to attach viewer");
                sink.send_error(&e.to_string()).await;
                RelayOutcome::AttachFailed(e)
            }
        };

        if let Some(recorder) = recorder {
            recorder.close().await;
        }
        info!(device_id = key, forwarded = outcome.forwarded(), "Stream ended");
        outcome
    }

    /// Get the session and its bootstrap blob while holding the device lock.
    async fn attach(
        &self,
        key: &str,
        identity: &DeviceIdentity,
    ) -> StreamResult<(Arc<CaptureSession>, Bytes)> {
        let guard = self.registry.lock_device(key).await;
        let acquired = self.registry.get_or_create_locked(&guard, identity).await?;
        let session = acquired.session;

        let blob = if acquired.created {
            match session
                .initialize(self.config.init_read_attempts, self.config.init_retry_delay)
                .await
            {
                Ok(blob) => blob,
                Err(e) => {
                    self.registry.remove_locked(&guard).await;
                    return Err(e);
                }
            }
        } else {
            session
                .wait_for_initialization(
                    self.config.cached_wait_attempts,
                    self.config.cached_wait_delay,
                )
                .await?
        };

        drop(guard);
        Ok((session, blob))
    }

    async fn forward<S>(
        &self,
        key: &str,
        session: &Arc<CaptureSession>,
        blob: Bytes,
        sink: &mut S,
        recorder: &mut Option<DebugRecorder>,
    ) -> RelayOutcome
    where
        S: ViewerSink + ?Sized,
    {
        let blob_len = blob.len();
        if sink.send_frame(blob.clone()).await.is_err() {
            info!(device_id = key, "Viewer disconnected before bootstrap");
            return RelayOutcome::ViewerDisconnected { forwarded: 0 };
        }
        record(recorder, &blob).await;
        debug!(device_id = key, size = blob_len, "Sent initialization data");

        let mut forwarded: u64 = 0;
        loop {
            let unit = match session.read_nal_unit(true).await {
                Ok(unit) => unit,
                Err(e) => {
                    error!(device_id = key, forwarded, error = %e, "Stream failed");
                    self.registry.discard(key, session).await;
                    sink.send_error(&e.to_string()).await;
                    return RelayOutcome::StreamFailed {
                        forwarded,
                        error: e,
                    };
                }
            };

            let data = unit.into_bytes();
            if sink.send_frame(data.clone()).await.is_err() {
                info!(device_id = key, forwarded, "Viewer disconnected");
                return RelayOutcome::ViewerDisconnected { forwarded };
            }
            record(recorder, &data).await;

            forwarded += 1;
            if forwarded % PROGRESS_INTERVAL == 0 {
                info!(device_id = key, forwarded, "Relaying NAL units");
            }
        }
    }

    async fn open_recorder(&self, key: &str) -> Option<DebugRecorder> {
        let dir = self.config.debug_dir.as_ref()?;
        match DebugRecorder::create(dir, key).await {
            Ok(recorder) => Some(recorder),
            Err(e) => {
                warn!(device_id = key, error = %e, "Could not open debug stream file");
                None
            }
        }
    }
}

/// Append to the debug file; a failed write stops recording.
async fn record(recorder: &mut Option<DebugRecorder>, data: &[u8]) {
    if let Some(rec) = recorder.as_mut() {
        if let Err(e) = rec.write(data).await {
            warn!(path = %rec.path().display(), error = %e, "Debug stream write failed, recording stopped");
            *recorder = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::{annex_b, idr, pps, slice, sps, MockLauncher, MockScript};

    /// Collects frames; disconnects after `limit` frames.
    #[derive(Default)]
    struct RecordingSink {
        frames: Vec<Bytes>,
        errors: Vec<String>,
        limit: usize,
    }

    impl RecordingSink {
        fn with_limit(limit: usize) -> Self {
            Self {
                limit,
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl ViewerSink for RecordingSink {
        async fn send_frame(&mut self, frame: Bytes) -> Result<(), ViewerClosed> {
            if self.frames.len() >= self.limit {
                return Err(ViewerClosed);
            }
            self.frames.push(frame);
            Ok(())
        }

        async fn send_error(&mut self, message: &str) {
            self.errors.push(message.to_string());
        }
    }

    fn relay_config() -> RelayConfig {
        RelayConfig {
            init_read_attempts: 20,
            init_retry_delay: Duration::from_millis(500),
            cached_wait_attempts: 10,
            cached_wait_delay: Duration::from_millis(500),
            debug_dir: None,
        }
    }

    fn setup(launcher: MockLauncher) -> (Arc<MockLauncher>, Relay) {
        let launcher = Arc::new(launcher);
        let registry = Arc::new(SessionRegistry::new(launcher.clone()));
        (launcher, Relay::new(registry, relay_config()))
    }

    fn usb1() -> DeviceIdentity {
        DeviceIdentity::from_address("USB1")
    }

    #[tokio::test]
    async fn test_first_frame_is_bootstrap_then_single_units() {
        let (_, relay) = setup(MockLauncher::new(MockScript::live(vec![
            slice(),
            sps(),
            slice(),
            pps(),
            idr(),
        ])));
        let mut sink = RecordingSink::with_limit(4);

        let outcome = relay.run("USB1", &usb1(), &mut sink).await;

        assert!(matches!(outcome, RelayOutcome::ViewerDisconnected { forwarded: 3 }));
        assert_eq!(sink.frames[0], annex_b(&[sps(), pps(), idr()]));
        for frame in &sink.frames[1..] {
            assert_eq!(frame, &slice());
        }
        // Viewer leaving does not stop the capture
        assert!(relay.registry().contains("USB1"));
    }

    #[tokio::test]
    async fn test_second_viewer_reuses_session_and_gets_bootstrap() {
        let (launcher, relay) = setup(MockLauncher::new(MockScript::healthy()));

        let mut first = RecordingSink::with_limit(2);
        relay.run("USB1", &usb1(), &mut first).await;
        let mut second = RecordingSink::with_limit(2);
        relay.run("USB1", &usb1(), &mut second).await;

        assert_eq!(launcher.launches(), 1);
        assert_eq!(second.frames[0], annex_b(&[sps(), pps(), idr()]));
        assert_eq!(second.frames[0], first.frames[0]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_viewers_share_one_capture() {
        let (launcher, relay) = setup(
            MockLauncher::new(MockScript::healthy()).with_delay(Duration::from_millis(20)),
        );
        let relay = Arc::new(relay);

        let handles: Vec<_> = (0..10)
            .map(|_| {
                let relay = relay.clone();
                tokio::spawn(async move {
                    let mut sink = RecordingSink::with_limit(3);
                    relay.run("USB1", &usb1(), &mut sink).await;
                    sink
                })
            })
            .collect();

        let blob = annex_b(&[sps(), pps(), idr()]);
        for handle in handles {
            let sink = handle.await.unwrap();
            assert_eq!(sink.frames[0], blob);
            assert!(sink.errors.is_empty());
        }
        assert_eq!(launcher.launches(), 1);
    }

    #[tokio::test]
    async fn test_mid_stream_failure_removes_session() {
        let (launcher, relay) = setup(
            MockLauncher::new(MockScript::healthy())
                .then(MockScript::finite(vec![sps(), pps(), idr(), slice(), slice()])),
        );

        let mut first = RecordingSink::with_limit(usize::MAX);
        let outcome = relay.run("USB1", &usb1(), &mut first).await;

        assert!(matches!(outcome, RelayOutcome::StreamFailed { .. }));
        assert_eq!(first.errors.len(), 1);
        assert!(first.errors[0].starts_with("Stream error:"));
        assert!(!relay.registry().contains("USB1"));

        let mut second = RecordingSink::with_limit(2);
        relay.run("USB1", &usb1(), &mut second).await;
        assert_eq!(launcher.launches(), 2);
        assert_eq!(second.frames[0], annex_b(&[sps(), pps(), idr()]));
    }

    #[tokio::test]
    async fn test_init_timeout_sends_no_partial_blob() {
        let (_, relay) = setup(MockLauncher::new(MockScript::live(vec![sps(), pps()])));
        let mut sink = RecordingSink::with_limit(usize::MAX);

        let outcome = relay.run("USB1", &usb1(), &mut sink).await;

        match outcome {
            RelayOutcome::AttachFailed(e) => assert_eq!(e.code(), "stream_init_timeout"),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert!(sink.frames.is_empty());
        assert_eq!(sink.errors.len(), 1);
        assert!(!relay.registry().contains("USB1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_reused_session_without_bootstrap_times_out() {
        let (_, relay) = setup(MockLauncher::new(MockScript::live(vec![sps(), pps()])));
        // Registered but never initialized
        relay
            .registry()
            .get_or_create("USB1", &usb1())
            .await
            .unwrap();

        let mut sink = RecordingSink::with_limit(usize::MAX);
        let outcome = relay.run("USB1", &usb1(), &mut sink).await;

        assert!(matches!(outcome, RelayOutcome::AttachFailed(StreamError::InitTimeout { attempts: 10, .. })));
        assert!(sink.frames.is_empty());
        assert!(sink.errors[0].contains("Initialization data not ready"));
        // A reused session is left for whoever owns it
        assert!(relay.registry().contains("USB1"));
    }

    #[tokio::test]
    async fn test_capture_start_failure_is_reported() {
        let (_, relay) = setup(MockLauncher::new(MockScript::fail("device offline")));
        let mut sink = RecordingSink::with_limit(usize::MAX);

        let outcome = relay.run("USB1", &usb1(), &mut sink).await;

        assert!(matches!(outcome, RelayOutcome::AttachFailed(StreamError::CaptureStart(_))));
        assert!(sink.errors[0].contains("device offline"));
    }

    #[tokio::test]
    async fn test_debug_recording_matches_frames() {
        let dir = tempfile::tempdir().unwrap();
        let launcher = Arc::new(MockLauncher::new(MockScript::healthy()));
        let registry = Arc::new(SessionRegistry::new(launcher));
        let relay = Relay::new(
            registry,
            RelayConfig {
                debug_dir: Some(dir.path().to_path_buf()),
                ..relay_config()
            },
        );

        let mut sink = RecordingSink::with_limit(3);
        relay.run("10.0.0.7:5555", &DeviceIdentity::from_address("10.0.0.7:5555"), &mut sink).await;

        let file = std::fs::read_dir(dir.path())
            .unwrap()
            .next()
            .unwrap()
            .unwrap()
            .path();
        let expected: Vec<u8> = sink.frames.iter().flat_map(|f| f.iter().copied()).collect();
        assert_eq!(std::fs::read(file).unwrap(), expected);
    }
}
