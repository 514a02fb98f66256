use std::sync::Arc;
use std::time::Duration;

use retain_core::{
    Diagnostic, ElementId, ManualClock, MemoryRenderer, RebuildError, Runtime, RuntimeConfig,
    TickReport, WidgetRef,
};
use retain_runtime_std::StdHost;

/// Headless harness for exercising element trees in tests.
///
/// `RetainTestRule` owns a runtime backed by a [`MemoryRenderer`], a host
/// that records tick requests and a manual clock, so tests decide exactly
/// when ticks run and how much time passes.
pub struct RetainTestRule {
    runtime: Runtime,
    host: Arc<StdHost>,
    clock: ManualClock,
    root: Option<ElementId>,
}

impl RetainTestRule {
    /// Rule with default configuration, except that failed builds keep
    /// their previous output instead of rendering an error indicator.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::default().with_error_indicator(false))
    }

    pub fn with_config(config: RuntimeConfig) -> Self {
        let host = Arc::new(StdHost::new());
        let clock = ManualClock::new();
        let built = Runtime::builder()
            .renderer(MemoryRenderer::new())
            .host(host.clone())
            .clock(clock.clone())
            .config(config)
            .build();
        let Ok(runtime) = built else {
            unreachable!("a renderer is always supplied");
        };
        Self {
            runtime,
            host,
            clock,
            root: None,
        }
    }

    /// Replace the current content with `widget`, mounting it as the root.
    pub fn set_content(&mut self, widget: WidgetRef) -> Result<ElementId, RebuildError> {
        if let Some(previous) = self.root.take() {
            self.runtime.unmount(previous);
        }
        let root = self.runtime.mount_root(widget)?;
        log::debug!("content mounted as {root}");
        self.root = Some(root);
        Ok(root)
    }

    /// Run a single tick regardless of whether one was requested.
    pub fn tick(&mut self) -> TickReport {
        self.host.take_tick_request();
        self.runtime.tick()
    }

    /// Tick until the dirty set is empty.
    pub fn pump_until_idle(&mut self) -> Vec<TickReport> {
        self.host.take_tick_request();
        self.runtime.run_until_idle()
    }

    /// Returns whether the runtime asked the host for a tick since the last
    /// call, tick or pump.
    pub fn take_tick_request(&self) -> bool {
        self.host.take_tick_request()
    }

    pub fn advance_time(&self, by: Duration) {
        self.clock
            .advance_millis(u64::try_from(by.as_millis()).unwrap_or(u64::MAX));
    }

    pub fn clock(&self) -> &ManualClock {
        &self.clock
    }

    /// Markup of everything committed to the renderer.
    pub fn markup(&self) -> String {
        self.runtime
            .with_renderer_as::<MemoryRenderer, _>(|renderer| renderer.markup())
            .unwrap_or_default()
    }

    /// Markup of the output `element` currently resolves to.
    pub fn markup_of(&self, element: ElementId) -> Option<String> {
        let output = self.runtime.element(element)?.output?;
        self.runtime
            .with_renderer_as::<MemoryRenderer, _>(|renderer| renderer.markup_of(output))
    }

    /// Mutable access to the in-memory renderer, e.g. to inject failures.
    pub fn renderer_mut<R>(&mut self, f: impl FnOnce(&mut MemoryRenderer) -> R) -> Option<R> {
        self.runtime.with_renderer_as_mut::<MemoryRenderer, _>(f)
    }

    pub fn take_diagnostics(&self) -> Vec<Diagnostic> {
        self.runtime.take_diagnostics()
    }

    pub fn has_content(&self) -> bool {
        self.root.is_some()
    }

    pub fn root(&self) -> Option<ElementId> {
        self.root
    }

    pub fn runtime(&self) -> &Runtime {
        &self.runtime
    }
}

impl Default for RetainTestRule {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience helper for tests that only need temporary access to a
/// `RetainTestRule`.
pub fn run_test_runtime<R>(f: impl FnOnce(&mut RetainTestRule) -> R) -> R {
    let mut rule = RetainTestRule::new();
    f(&mut rule)
}
