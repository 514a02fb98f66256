//! Standard host services backed by Rust's `std` library.
//!
//! This crate provides concrete implementations of the platform traits
//! defined in `retain-core`. Applications construct a [`StdRuntime`] around
//! their renderer and poll [`StdRuntime::pump`] from their event loop.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use retain_core::{
    Clock, ConfigError, HostScheduler, Renderer, Runtime, RuntimeBuilder, RuntimeConfig, TickReport,
};

type Waker = Arc<dyn Fn() + Send + Sync + 'static>;

/// Host that records tick requests and optionally wakes an event loop.
pub struct StdHost {
    tick_requested: AtomicBool,
    waker: RwLock<Option<Waker>>,
}

impl StdHost {
    pub fn new() -> Self {
        Self {
            tick_requested: AtomicBool::new(false),
            waker: RwLock::new(None),
        }
    }

    /// Returns whether a tick has been requested since the last call.
    pub fn take_tick_request(&self) -> bool {
        self.tick_requested.swap(false, Ordering::SeqCst)
    }

    /// Registers a waker invoked whenever the runtime requests a tick.
    pub fn set_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
        if let Ok(mut slot) = self.waker.write() {
            *slot = Some(Arc::new(waker));
        }
    }

    pub fn clear_waker(&self) {
        if let Ok(mut slot) = self.waker.write() {
            *slot = None;
        }
    }

    fn wake(&self) {
        let waker = self.waker.read().ok().and_then(|slot| slot.clone());
        if let Some(waker) = waker {
            waker();
        }
    }
}

impl Default for StdHost {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StdHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdHost")
            .field("tick_requested", &self.tick_requested.load(Ordering::SeqCst))
            .finish()
    }
}

impl HostScheduler for StdHost {
    fn request_tick(&self) {
        self.tick_requested.store(true, Ordering::SeqCst);
        self.wake();
    }
}

/// Wall clock measured from the moment it was created.
#[derive(Debug, Clone, Copy)]
pub struct StdClock {
    origin: Instant,
}

impl StdClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Time since the clock was created.
    pub fn elapsed(&self) -> Duration {
        self.origin.elapsed()
    }
}

impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for StdClock {
    fn now_millis(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Runtime wired to the standard host and clock.
pub struct StdRuntime {
    host: Arc<StdHost>,
    runtime: Runtime,
}

impl StdRuntime {
    /// Creates a runtime with default configuration around `renderer`.
    pub fn new(renderer: impl Renderer) -> Result<Self, ConfigError> {
        Self::with_config(renderer, RuntimeConfig::default())
    }

    pub fn with_config(renderer: impl Renderer, config: RuntimeConfig) -> Result<Self, ConfigError> {
        Self::from_builder(Runtime::builder().renderer(renderer).config(config))
    }

    /// Completes `builder` with the standard host and clock. Any host or
    /// clock already set on it is replaced.
    pub fn from_builder(builder: RuntimeBuilder) -> Result<Self, ConfigError> {
        let host = Arc::new(StdHost::new());
        let runtime = builder.host(host.clone()).clock(StdClock::new()).build()?;
        Ok(Self { host, runtime })
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }

    pub fn host(&self) -> Arc<StdHost> {
        Arc::clone(&self.host)
    }

    /// Returns whether a tick was requested since the last poll.
    pub fn take_tick_request(&self) -> bool {
        self.host.take_tick_request()
    }

    pub fn set_waker(&self, waker: impl Fn() + Send + Sync + 'static) {
        self.host.set_waker(waker);
    }

    pub fn clear_waker(&self) {
        self.host.clear_waker();
    }

    /// Answers an outstanding tick request by ticking until idle. Returns
    /// nothing when no tick was requested.
    pub fn pump(&self) -> Vec<TickReport> {
        if !self.take_tick_request() {
            return Vec::new();
        }
        let reports = self.runtime.run_until_idle();
        log::trace!("pumped {} ticks", reports.len());
        reports
    }
}

impl fmt::Debug for StdRuntime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdRuntime")
            .field("host", &self.host)
            .field("roots", &self.runtime.roots())
            .finish()
    }
}
