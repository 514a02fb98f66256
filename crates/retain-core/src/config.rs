//! Runtime configuration.

use std::time::Duration;

/// Tunables for one runtime instance.
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    /// Render an error indicator in place of a subtree whose build failed
    /// instead of keeping its stale output.
    pub error_indicator: bool,
    /// Age after which an unmounted element that is still registered is
    /// reported by the leak sweep.
    pub leak_age: Duration,
    /// Upper bound on ticks driven by a single `run_until_idle` call.
    pub max_ticks_per_pump: usize,
    /// Keep every applied patch in the tick report.
    pub trace_patches: bool,
}

impl RuntimeConfig {
    pub fn with_error_indicator(mut self, enabled: bool) -> Self {
        self.error_indicator = enabled;
        self
    }

    pub fn with_leak_age(mut self, age: Duration) -> Self {
        self.leak_age = age;
        self
    }

    pub fn with_max_ticks_per_pump(mut self, ticks: usize) -> Self {
        self.max_ticks_per_pump = ticks.max(1);
        self
    }

    pub fn with_trace_patches(mut self, enabled: bool) -> Self {
        self.trace_patches = enabled;
        self
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            error_indicator: cfg!(debug_assertions),
            leak_age: Duration::from_secs(30),
            max_ticks_per_pump: 64,
            trace_patches: true,
        }
    }
}
