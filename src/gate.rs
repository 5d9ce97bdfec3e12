//! Admission control for batches, keyed by caller identity.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use thiserror::Error;
use tokio::time::Instant;
use tracing::debug;

/// Callers above this many tracked windows trigger a sweep of expired ones.
const SWEEP_THRESHOLD: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("quota of {limit} batches per {window:?} exhausted, retry in {retry_after:?}")]
pub struct Rejection {
    pub limit: u32,
    pub window: Duration,
    pub retry_after: Duration,
}

/// Pre-flight check run once per batch before any network work.
pub trait AdmissionGate: Send + Sync {
    fn admit(&self, caller: &str) -> Result<(), Rejection>;
}

impl<G: AdmissionGate + ?Sized> AdmissionGate for Arc<G> {
    fn admit(&self, caller: &str) -> Result<(), Rejection> {
        (**self).admit(caller)
    }
}

/// Admits everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unlimited;

impl AdmissionGate for Unlimited {
    fn admit(&self, _caller: &str) -> Result<(), Rejection> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub max_batches: u32,
    pub window: Duration,
}

impl Default for Quota {
    fn default() -> Self {
        Self {
            max_batches: 60,
            window: Duration::from_secs(60),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Window {
    started: Instant,
    count: u32,
}

/// Counts batches per caller in fixed windows that start at the caller's
/// first admission.
#[derive(Debug)]
pub struct FixedWindowLimiter {
    quota: Quota,
    windows: Mutex<HashMap<String, Window>>,
}

impl FixedWindowLimiter {
    pub fn new(quota: Quota) -> Self {
        Self {
            quota,
            windows: Mutex::new(HashMap::new()),
        }
    }

    /// Batches admitted for `caller` in its current window.
    pub fn used(&self, caller: &str) -> u32 {
        let now = Instant::now();
        self.windows
            .lock()
            .get(caller)
            .filter(|window| now.duration_since(window.started) < self.quota.window)
            .map_or(0, |window| window.count)
    }
}

impl AdmissionGate for FixedWindowLimiter {
    fn admit(&self, caller: &str) -> Result<(), Rejection> {
        let now = Instant::now();
        let mut windows = self.windows.lock();

        if windows.len() > SWEEP_THRESHOLD {
            let span = self.quota.window;
            windows.retain(|_, window| now.duration_since(window.started) < span);
        }

        let window = windows.entry(caller.to_string()).or_insert(Window {
            started: now,
            count: 0,
        });
        let elapsed = now.duration_since(window.started);
        if elapsed >= self.quota.window {
            *window = Window {
                started: now,
                count: 0,
            };
        }

        if window.count >= self.quota.max_batches {
            let retry_after = self.quota.window.saturating_sub(now.duration_since(window.started));
            debug!(caller, limit = self.quota.max_batches, ?retry_after, "batch refused");
            return Err(Rejection {
                limit: self.quota.max_batches,
                window: self.quota.window,
                retry_after,
            });
        }
        window.count += 1;
        Ok(())
    }
}
