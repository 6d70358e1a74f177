// Per-device capture session registry.
//
// At most one live CaptureSession per device key, created under a per-key
// async mutex so concurrent viewers of one device share a single capture
// server. Different devices never contend.
//
// Locks are created on first use and kept for the life of the registry:
// removing them would let two tasks hold "the" lock for one key at once.

use std::sync::Arc;

use autoglm_core::device::DeviceIdentity;
use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info};

use crate::capture::{CaptureLauncher, CaptureSession};
use crate::error::StreamResult;

/// Proof that the caller holds the lock for one device key.
pub struct DeviceGuard {
    key: String,
    _guard: OwnedMutexGuard<()>,
}

impl DeviceGuard {
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }
}

/// A session handed out by the registry
pub struct Acquired {
    pub session: Arc<CaptureSession>,
    /// Started by this call rather than reused
    pub created: bool,
}

pub struct SessionRegistry {
    launcher: Arc<dyn CaptureLauncher>,
    sessions: DashMap<String, Arc<CaptureSession>>,
    locks: DashMap<String, Arc<Mutex<()>>>,
}

impl SessionRegistry {
    pub fn new(launcher: Arc<dyn CaptureLauncher>) -> Self {
        Self {
            launcher,
            sessions: DashMap::new(),
            locks: DashMap::new(),
        }
    }

    /// Wait for exclusive access to `key`.
    pub async fn lock_device(&self, key: &str) -> DeviceGuard {
        let lock = self
            .locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        DeviceGuard {
            key: key.to_string(),
            _guard: lock.lock_owned().await,
        }
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<Arc<CaptureSession>> {
        self.sessions.get(key).map(|s| s.clone())
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.sessions.contains_key(key)
    }

    /// Registered sessions
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.sessions.len()
    }

    /// Reuse the live session for the guarded key or start a new one.
    ///
    /// A registered session that is no longer live is stopped and replaced.
    pub async fn get_or_create_locked(
        &self,
        guard: &DeviceGuard,
        identity: &DeviceIdentity,
    ) -> StreamResult<Acquired> {
        let key = guard.key();

        if let Some(existing) = self.get(key) {
            if existing.state().is_live() {
                debug!(device_id = key, "Reusing capture session");
                return Ok(Acquired {
                    session: existing,
                    created: false,
                });
            }
            debug!(device_id = key, state = ?existing.state(), "Replacing stale capture session");
            self.sessions.remove(key);
            existing.stop().await;
        }

        info!(device_id = key, address = %identity.address, "Creating capture session");
        let session = Arc::new(CaptureSession::new(key, identity.address.clone()));
        session.start(self.launcher.as_ref()).await?;
        self.sessions.insert(key.to_string(), session.clone());

        Ok(Acquired {
            session,
            created: true,
        })
    }

    pub async fn get_or_create(&self, key: &str, identity: &DeviceIdentity) -> StreamResult<Acquired> {
        let guard = self.lock_device(key).await;
        self.get_or_create_locked(&guard, identity).await
    }

    /// Stop and unregister the guarded key's session. False if none.
    pub async fn remove_locked(&self, guard: &DeviceGuard) -> bool {
        match self.sessions.remove(guard.key()) {
            Some((_, session)) => {
                session.stop().await;
                info!(device_id = guard.key(), "Capture session removed");
                true
            }
            None => false,
        }
    }

    pub async fn remove(&self, key: &str) -> bool {
        let guard = self.lock_device(key).await;
        self.remove_locked(&guard).await
    }

    /// Drop `session` after it failed. The registration is only removed if
    /// it still points at this instance; a newer replacement is kept.
    pub async fn discard(&self, key: &str, session: &Arc<CaptureSession>) -> bool {
        let _guard = self.lock_device(key).await;
        let removed = self
            .sessions
            .remove_if(key, |_, registered| Arc::ptr_eq(registered, session))
            .is_some();
        session.stop().await;
        if removed {
            info!(device_id = key, "Failed capture session discarded");
        }
        removed
    }

    /// Stop one device's session, or every session when `key` is `None`.
    /// Returns how many were stopped.
    pub async fn reset(&self, key: Option<&str>) -> usize {
        match key {
            Some(key) => usize::from(self.remove(key).await),
            None => {
                let keys: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
                let mut stopped = 0;
                for key in keys {
                    if self.remove(&key).await {
                        stopped += 1;
                    }
                }
                info!(stopped, "All capture sessions reset");
                stopped
            }
        }
    }

    pub async fn shutdown(&self) {
        let stopped = self.reset(None).await;
        info!(stopped, "Session registry shut down");
    }
}
