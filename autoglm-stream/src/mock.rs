//! Scripted capture launcher for tests
//!
//! Each launch gets an in-memory duplex pipe fed with Annex-B bytes from a
//! [`MockScript`], standing in for the scrcpy video socket.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::{BufMut, Bytes, BytesMut};
use parking_lot::Mutex;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

use crate::capture::{CaptureChannel, CaptureLauncher};
use crate::error::{StreamError, StreamResult};
use crate::nal::START_CODE;

const PIPE_CAPACITY: usize = 16 * 1024;

/// A NAL unit with its 4-byte start code
#[must_use]
pub fn unit(payload: &[u8]) -> Bytes {
    let mut data = BytesMut::with_capacity(START_CODE.len() + payload.len());
    data.put_slice(&START_CODE);
    data.put_slice(payload);
    data.freeze()
}

#[must_use]
pub fn sps() -> Bytes {
    unit(&[0x67, 0x42, 0xC0, 0x1F, 0xDA, 0x01, 0x40, 0x16, 0xE8])
}

#[must_use]
pub fn pps() -> Bytes {
    unit(&[0x68, 0xCE, 0x3C, 0x80])
}

#[must_use]
pub fn idr() -> Bytes {
    unit(&[0x65, 0x88, 0x84, 0x21, 0xA0, 0xFF])
}

/// Non-IDR slice
#[must_use]
pub fn slice() -> Bytes {
    unit(&[0x41, 0x9A, 0x02, 0x04, 0x8C])
}

/// Concatenate framed units
#[must_use]
pub fn annex_b(units: &[Bytes]) -> Bytes {
    let mut data = BytesMut::with_capacity(units.iter().map(Bytes::len).sum());
    for u in units {
        data.put_slice(u);
    }
    data.freeze()
}

/// What one launch produces
#[derive(Debug, Clone)]
pub enum MockScript {
    /// The units, then non-IDR slices for as long as someone reads
    Live(Vec<Bytes>),
    /// The units, then EOF
    Finite(Vec<Bytes>),
    /// Socket stays open without data
    Silent,
    /// Launch fails with `CaptureStart`
    Fail(String),
}

impl MockScript {
    #[must_use]
    pub const fn live(units: Vec<Bytes>) -> Self {
        Self::Live(units)
    }

    #[must_use]
    pub const fn finite(units: Vec<Bytes>) -> Self {
        Self::Finite(units)
    }

    #[must_use]
    pub const fn silent() -> Self {
        Self::Silent
    }

    #[must_use]
    pub fn fail(message: &str) -> Self {
        Self::Fail(message.to_string())
    }

    /// Bootstrap set followed by an endless stream
    #[must_use]
    pub fn healthy() -> Self {
        Self::Live(vec![sps(), pps(), idr()])
    }
}

async fn feed(mut pipe: DuplexStream, script: MockScript) {
    match script {
        MockScript::Live(units) => {
            if pipe.write_all(&annex_b(&units)).await.is_err() {
                return;
            }
            let filler = slice();
            // Ends when the reading side is dropped
            while pipe.write_all(&filler).await.is_ok() {}
        }
        MockScript::Finite(units) => {
            let _ = pipe.write_all(&annex_b(&units)).await;
        }
        MockScript::Silent => {
            // Returns once the other half is dropped
            let _ = pipe.read(&mut [0u8; 1]).await;
        }
        MockScript::Fail(_) => {}
    }
}

/// [`CaptureLauncher`] that plays scripts instead of starting a server.
///
/// Queued scripts are used first, one per launch; after that every launch
/// plays the default script.
pub struct MockLauncher {
    default: MockScript,
    queued: Mutex<VecDeque<MockScript>>,
    delay: Duration,
    launches: AtomicUsize,
}

impl MockLauncher {
    #[must_use]
    pub fn new(default: MockScript) -> Self {
        Self {
            default,
            queued: Mutex::new(VecDeque::new()),
            delay: Duration::ZERO,
            launches: AtomicUsize::new(0),
        }
    }

    /// Play `script` on the next launch that finds no earlier queued script.
    #[must_use]
    pub fn then(self, script: MockScript) -> Self {
        self.queued.lock().push_back(script);
        self
    }

    /// Make each launch take `delay`, widening race windows.
    #[must_use]
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Launches attempted so far
    #[must_use]
    pub fn launches(&self) -> usize {
        self.launches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CaptureLauncher for MockLauncher {
    async fn launch(&self, address: &str) -> StreamResult<CaptureChannel> {
        self.launches.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let script = self
            .queued
            .lock()
            .pop_front()
            .unwrap_or_else(|| self.default.clone());
        if let MockScript::Fail(message) = script {
            return Err(StreamError::CaptureStart(format!("{address}: {message}")));
        }

        let (local, remote) = tokio::io::duplex(PIPE_CAPACITY);
        tokio::spawn(feed(remote, script));
        Ok(CaptureChannel::new(Box::new(local)))
    }
}
