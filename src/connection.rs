//! Debounced connection-state tracking.
//!
//! Backends record probe and send outcomes here; the tracker itself never
//! initiates a probe. A recorded state is trusted only for a configurable
//! window, after which it decays to [`ConnectionState::Unknown`] and the
//! caller has to probe again. Timing uses a monotonic clock, so wall-clock
//! adjustments cannot stretch or shrink the window.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Transport health as last reported, or `Unknown` once that report has
/// aged out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Unknown,
    Connected,
    Disconnected,
}

#[derive(Debug)]
struct TrackerInner {
    state: ConnectionState,
    last_transition: Instant,
    timeout: Duration,
}

/// Shared tri-state machine with a decay window.
///
/// All methods are callable from any thread; state is replaced under a
/// lock, never partially updated.
#[derive(Debug)]
pub struct ConnectionStateTracker {
    inner: Mutex<TrackerInner>,
}

impl ConnectionStateTracker {
    pub fn new(timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(TrackerInner {
                state: ConnectionState::Unknown,
                last_transition: Instant::now(),
                timeout,
            }),
        }
    }

    /// Records a successful probe or send.
    pub fn mark_connected(&self) {
        self.transition(ConnectionState::Connected);
    }

    /// Records a failed probe or send.
    pub fn mark_disconnected(&self) {
        self.transition(ConnectionState::Disconnected);
    }

    /// Drops any recorded state, forcing the next reader to probe.
    pub fn reset(&self) {
        self.transition(ConnectionState::Unknown);
    }

    /// The last recorded state, or `Unknown` once it has outlived the
    /// debounce window.
    pub fn current_state(&self) -> ConnectionState {
        let inner = self.inner.lock().unwrap();
        if inner.state != ConnectionState::Unknown
            && inner.last_transition.elapsed() >= inner.timeout
        {
            ConnectionState::Unknown
        } else {
            inner.state
        }
    }

    /// Updates the debounce window; takes effect on the next read.
    pub fn set_timeout(&self, timeout: Duration) {
        self.inner.lock().unwrap().timeout = timeout;
    }

    fn transition(&self, state: ConnectionState) {
        let mut inner = self.inner.lock().unwrap();
        inner.state = state;
        inner.last_transition = Instant::now();
    }
}
