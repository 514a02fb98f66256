//! Platform abstraction traits for runtime services.
//!
//! The runtime never drives itself: the host decides when a requested tick
//! actually runs, and supplies the notion of time used by diagnostics.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Receives tick requests from the runtime.
///
/// A request is issued at most once per pending batch; the host answers it
/// by calling `Runtime::tick` at a point of its choosing (typically before
/// the next frame).
pub trait HostScheduler: Send + Sync {
    /// Request that the host run a scheduler tick.
    fn request_tick(&self);
}

/// Provides timing information for the runtime.
pub trait Clock {
    /// Milliseconds since an arbitrary, fixed origin.
    fn now_millis(&self) -> u64;
}

/// Host that ignores tick requests; ticks are driven manually.
#[derive(Debug, Default)]
pub struct NoopHost;

impl HostScheduler for NoopHost {
    fn request_tick(&self) {}
}

/// Host that counts tick requests, for tests.
#[derive(Debug, Default)]
pub struct TestHost {
    requests: AtomicUsize,
}

impl TestHost {
    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl HostScheduler for TestHost {
    fn request_tick(&self) {
        self.requests.fetch_add(1, Ordering::SeqCst);
    }
}

/// Clock that only moves when told to.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Rc<Cell<u64>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance_millis(&self, millis: u64) {
        self.now.set(self.now.get() + millis);
    }

    pub fn set_millis(&self, millis: u64) {
        self.now.set(millis);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.now.get()
    }
}
