//! Readiness policies.
//!
//! A stdio server usually has no explicit "ready" signal, so deciding when
//! to send the first request is a policy choice. [`FixedDelay`] is the
//! best-effort wait; [`PollUntil`] waits for a caller-supplied signal.
//! Both bail out early with `false` when the process dies.

use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::supervisor::Liveness;

/// Default slice between liveness checks while waiting.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Decides when a freshly spawned process may receive requests.
pub trait ReadinessPolicy {
    /// Block until the process is considered ready.
    ///
    /// Returns `false` when the process is no longer usable.
    fn await_ready(&mut self, process: &mut dyn Liveness) -> bool;
}

/// Sleep for a fixed window, checking liveness along the way.
///
/// This is a heuristic: a `true` result only means the process is still
/// running after the delay.
#[derive(Debug, Clone)]
pub struct FixedDelay {
    /// Total time to wait.
    pub delay: Duration,
    /// Slice between liveness checks.
    pub poll_interval: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl ReadinessPolicy for FixedDelay {
    fn await_ready(&mut self, process: &mut dyn Liveness) -> bool {
        let deadline = Instant::now() + self.delay;
        loop {
            if !process.is_alive() {
                debug!("process exited during readiness delay");
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            thread::sleep(slice(deadline - now, self.poll_interval));
        }
    }
}

/// Poll a readiness signal until it fires or `max_wait` elapses.
pub struct PollUntil<F> {
    signal: F,
    /// Upper bound on the wait.
    pub max_wait: Duration,
    /// Slice between polls.
    pub poll_interval: Duration,
    /// Report ready anyway when the signal never fires.
    pub proceed_without_signal: bool,
}

impl<F: FnMut() -> bool> PollUntil<F> {
    /// Wait up to `max_wait` for `signal` to return true. If it never does,
    /// the process is still reported ready (with a warning) as long as it is
    /// alive; use [`PollUntil::strict`] to fail instead.
    pub fn new(max_wait: Duration, signal: F) -> Self {
        Self {
            signal,
            max_wait,
            poll_interval: DEFAULT_POLL_INTERVAL,
            proceed_without_signal: true,
        }
    }

    /// Treat a missing signal as "not ready".
    pub fn strict(mut self) -> Self {
        self.proceed_without_signal = false;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

impl<F: FnMut() -> bool> ReadinessPolicy for PollUntil<F> {
    fn await_ready(&mut self, process: &mut dyn Liveness) -> bool {
        let deadline = Instant::now() + self.max_wait;
        loop {
            if !process.is_alive() {
                debug!("process exited before signalling readiness");
                return false;
            }
            if (self.signal)() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                warn!(
                    max_wait = ?self.max_wait,
                    proceeding = self.proceed_without_signal,
                    "no readiness signal observed"
                );
                return self.proceed_without_signal;
            }
            thread::sleep(slice(deadline - now, self.poll_interval));
        }
    }
}

impl<F> std::fmt::Debug for PollUntil<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollUntil")
            .field("max_wait", &self.max_wait)
            .field("poll_interval", &self.poll_interval)
            .field("proceed_without_signal", &self.proceed_without_signal)
            .finish_non_exhaustive()
    }
}

fn slice(remaining: Duration, poll_interval: Duration) -> Duration {
    remaining.min(poll_interval.max(Duration::from_millis(1)))
}
