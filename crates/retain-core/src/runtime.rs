//! Runtime context owning every tree-wide structure.
//!
//! One [`Runtime`] holds the element arena, the dirty set, the dependency
//! graph, the resource registry and the renderer. All of them are plain
//! `RefCell`s: the runtime is single threaded and no borrow is ever held
//! while user build code runs, so re-entrant calls from builds, hooks and
//! listeners are safe.

use std::cell::{Cell, RefCell};
use std::mem;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use crate::config::RuntimeConfig;
use crate::context::StateUpdate;
use crate::debug::DebugInfo;
use crate::dependency::{Dependency, DependencyTracker, StateId};
use crate::diagnostics::Diagnostic;
use crate::element::{Element, ElementArena, ElementId, ElementInfo, Lifecycle};
use crate::error::{ConfigError, RebuildError, RenderError};
use crate::observable::StateObject;
use crate::patch::{Patch, PatchKind};
use crate::platform::{Clock, HostScheduler, ManualClock, NoopHost};
use crate::renderer::Renderer;
use crate::resource::{CleanupFn, LeakReport, ListenerFn, ResourceTracker};
use crate::scheduler::Scheduler;
use crate::vnode::{OutputHandle, Primitive};
use crate::widget::WidgetRef;

/// Result of a rebuild request that did not fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RebuildOutcome {
    /// The element rebuilt and `patches` non-trivial patches were applied.
    Rebuilt { patches: usize },
    /// Lifecycle violation; see the diagnostics channel.
    Rejected,
}

/// What one scheduler tick did.
#[derive(Debug, Default)]
pub struct TickReport {
    pub rebuilt: Vec<ElementId>,
    pub skipped: Vec<ElementId>,
    pub failures: Vec<RebuildError>,
    pub patches: Vec<Patch>,
    pub follow_up_scheduled: bool,
}

impl TickReport {
    pub fn is_empty(&self) -> bool {
        self.rebuilt.is_empty() && self.failures.is_empty() && self.patches.is_empty()
    }

    pub fn patch_count(&self, kind: PatchKind) -> usize {
        crate::patch::count_kind(&self.patches, kind)
    }
}

pub(crate) struct RuntimeInner {
    pub(crate) config: RuntimeConfig,
    this: Weak<RuntimeInner>,
    host: Arc<dyn HostScheduler>,
    clock: Rc<dyn Clock>,
    pub(crate) elements: RefCell<ElementArena>,
    pub(crate) scheduler: RefCell<Scheduler>,
    pub(crate) tracker: RefCell<DependencyTracker>,
    pub(crate) resources: RefCell<ResourceTracker>,
    pub(crate) renderer: RefCell<Box<dyn Renderer>>,
    pub(crate) container: OutputHandle,
    pub(crate) roots: RefCell<Vec<ElementId>>,
    diagnostics: RefCell<Vec<Diagnostic>>,
    failures: RefCell<Vec<RebuildError>>,
    patch_log: RefCell<Vec<Patch>>,
    next_state: Cell<u64>,
    disposed: Cell<bool>,
}

impl RuntimeInner {
    pub(crate) fn handle(&self) -> RuntimeHandle {
        RuntimeHandle(self.this.clone())
    }

    pub(crate) fn now_millis(&self) -> u64 {
        self.clock.now_millis()
    }

    pub(crate) fn with_element<R>(&self, id: ElementId, f: impl FnOnce(&Element) -> R) -> Option<R> {
        self.elements.borrow().get(id).map(f)
    }

    pub(crate) fn with_element_mut<R>(
        &self,
        id: ElementId,
        f: impl FnOnce(&mut Element) -> R,
    ) -> Option<R> {
        self.elements.borrow_mut().get_mut(id).map(f)
    }

    pub(crate) fn lifecycle(&self, id: ElementId) -> Option<Lifecycle> {
        self.with_element(id, |element| element.lifecycle)
    }

    pub(crate) fn warn(&self, diagnostic: Diagnostic) {
        log::warn!("{diagnostic}");
        self.diagnostics.borrow_mut().push(diagnostic);
    }

    pub(crate) fn record_failure(&self, failure: RebuildError) {
        log::error!("{failure}");
        self.failures.borrow_mut().push(failure);
    }

    pub(crate) fn request_tick_for(&self, id: ElementId) {
        let request = self.scheduler.borrow_mut().mark(id);
        if request {
            self.host.request_tick();
        }
    }

    pub(crate) fn apply_patches(
        &self,
        output: Option<OutputHandle>,
        patches: &[Patch],
    ) -> Result<Option<OutputHandle>, RenderError> {
        let result = {
            let mut renderer = self.renderer.borrow_mut();
            crate::applier::PatchApplier::new(&mut **renderer, self.container).apply(output, patches)
        };
        if result.is_ok() && self.config.trace_patches {
            self.patch_log
                .borrow_mut()
                .extend(patches.iter().filter(|patch| patch.kind() != PatchKind::NoOp).cloned());
        }
        result
    }

    pub(crate) fn release_output(&self, output: OutputHandle) {
        self.renderer.borrow_mut().release(output);
        if self.config.trace_patches {
            self.patch_log
                .borrow_mut()
                .push(Patch::new(Vec::new(), crate::patch::PatchOp::Remove));
        }
    }

    pub(crate) fn add_listener(&self, id: ElementId, name: Rc<str>, listener: ListenerFn) {
        if !self.resources.borrow_mut().add_listener(id, name.clone(), listener) {
            log::warn!("listener {name:?} for unknown element {id} dropped");
        }
    }

    pub(crate) fn add_cleanup(&self, id: ElementId, cleanup: CleanupFn) {
        let rejected = self.resources.borrow_mut().add_cleanup(id, cleanup);
        if let Some(cleanup) = rejected {
            log::warn!("cleanup registered for unknown element {id}; running it now");
            cleanup();
        }
    }

    pub(crate) fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        self.tracker.borrow_mut().suspend();
        let _frame = TrackingFrame {
            tracker: &self.tracker,
        };
        f()
    }

    pub(crate) fn record_read(&self, dependency: &Dependency) {
        if let Ok(mut tracker) = self.tracker.try_borrow_mut() {
            tracker.record_read(dependency);
        }
    }

    /// Mark every element whose last build read `dependency`.
    pub(crate) fn notify_write(&self, dependency: &Dependency) -> usize {
        let dependents = self.tracker.borrow().dependents(dependency);
        let mut marked = 0;
        for id in dependents {
            let present = self
                .with_element_mut(id, |element| element.dependencies_changed = true)
                .is_some();
            if present && self.mark_dirty(id) {
                marked += 1;
            }
        }
        marked
    }

    pub(crate) fn next_state_id(&self) -> StateId {
        let id = self.next_state.get();
        self.next_state.set(id + 1);
        StateId(id)
    }

    pub(crate) fn forget_state(&self, state: StateId) {
        if let Ok(mut tracker) = self.tracker.try_borrow_mut() {
            tracker.forget_state(state);
        }
    }

    pub(crate) fn update_state(&self, id: ElementId, update: StateUpdate) -> bool {
        let taken = self.with_element_mut(id, |element| {
            (
                element.lifecycle,
                element.behavior.is_stateful(),
                element.take_state(),
            )
        });
        match taken {
            None => {
                self.warn(Diagnostic::UpdateUnmounted { element: id });
                false
            }
            Some((_, false, _)) => {
                self.warn(Diagnostic::StateTypeMismatch { element: id });
                false
            }
            Some((_, true, None)) => {
                // Lent out to a running build or hook.
                self.with_element_mut(id, |element| element.pending_updates.push(update));
                self.mark_dirty(id);
                true
            }
            Some((lifecycle, true, Some(mut state))) => {
                let applied = update(state.state_mut());
                self.with_element_mut(id, |element| element.restore_state(state));
                if !applied {
                    self.warn(Diagnostic::StateTypeMismatch { element: id });
                    return false;
                }
                if lifecycle != Lifecycle::Unmounted {
                    self.mark_dirty(id);
                }
                true
            }
        }
    }

    pub(crate) fn run_tick(&self) -> TickReport {
        self.patch_log.borrow_mut().clear();
        self.failures.borrow_mut().clear();
        let batch = {
            let elements = self.elements.borrow();
            self.scheduler
                .borrow_mut()
                .begin_tick(|id| elements.get(id).map(|element| element.depth))
        };

        let mut report = TickReport::default();
        for id in batch {
            let claimed = self.scheduler.borrow_mut().take_in_flight(id);
            if !claimed || self.lifecycle(id) != Some(Lifecycle::Dirty) {
                report.skipped.push(id);
                continue;
            }
            match self.rebuild_element(id) {
                Ok(RebuildOutcome::Rebuilt { .. }) => report.rebuilt.push(id),
                Ok(RebuildOutcome::Rejected) => report.skipped.push(id),
                Err(err) => {
                    log::error!("rebuild failed: {err}");
                    report.failures.push(err);
                }
            }
        }

        let follow_up = self.scheduler.borrow_mut().end_tick();
        if follow_up {
            self.host.request_tick();
        }
        report.follow_up_scheduled = follow_up;
        report.failures.append(&mut self.failures.borrow_mut());
        report.patches = mem::take(&mut *self.patch_log.borrow_mut());
        log::debug!(
            "tick: rebuilt={} skipped={} failures={} patches={} follow_up={}",
            report.rebuilt.len(),
            report.skipped.len(),
            report.failures.len(),
            report.patches.len(),
            report.follow_up_scheduled
        );
        report
    }

    pub(crate) fn dispatch(&self, id: ElementId, name: &str, payload: &Primitive) -> usize {
        let listeners = self.resources.borrow().listeners_named(id, name);
        for listener in &listeners {
            listener(payload);
        }
        listeners.len()
    }

    pub(crate) fn describe_element(&self, id: ElementId) -> Option<DebugInfo> {
        let (mut info, children) = self.with_element(id, |element| {
            let mut info = DebugInfo::new(format!("[{id}] {}", element.widget.type_name()))
                .property("state", format!("{:?}", element.lifecycle))
                .property("depth", element.depth);
            if let Some(key) = element.widget.key() {
                info = info.property("key", key);
            }
            if let Some(output) = element.output {
                info = info.property("output", output);
            }
            (info, element.children.clone())
        })?;
        for child in children {
            if let Some(child) = self.describe_element(child) {
                info = info.child(child);
            }
        }
        Some(info)
    }

    fn dispose(&self) {
        if self.disposed.replace(true) {
            return;
        }
        let roots = mem::take(&mut *self.roots.borrow_mut());
        for root in roots {
            let output = self.with_element(root, |element| element.output).flatten();
            if let Some(output) = output {
                self.release_output(output);
            }
            self.unmount_subtree(root);
        }
        let leftovers = self.elements.borrow().ids();
        for id in leftovers {
            self.unmount_subtree(id);
        }
        let released = self.resources.borrow_mut().drain();
        for (_, released) in released {
            for cleanup in released.cleanups {
                cleanup();
            }
        }
        self.tracker.borrow_mut().clear();
        self.scheduler.borrow_mut().clear();
        log::debug!("runtime disposed");
    }
}

/// Pops a tracking frame on drop, so a panicking build cannot leave the
/// tracker recording into a dead frame.
pub(crate) struct TrackingFrame<'a> {
    pub(crate) tracker: &'a RefCell<DependencyTracker>,
}

impl TrackingFrame<'_> {
    pub(crate) fn start(tracker: &RefCell<DependencyTracker>, element: ElementId) -> TrackingFrame<'_> {
        tracker.borrow_mut().start_tracking(element);
        TrackingFrame { tracker }
    }
}

impl Drop for TrackingFrame<'_> {
    fn drop(&mut self) {
        if let Ok(mut tracker) = self.tracker.try_borrow_mut() {
            tracker.stop_tracking();
        }
    }
}

/// Weak reference to a runtime, safe to store in state and listeners.
/// Every method is a no-op once the runtime is gone.
#[derive(Clone)]
pub struct RuntimeHandle(Weak<RuntimeInner>);

impl RuntimeHandle {
    fn upgrade(&self) -> Option<Rc<RuntimeInner>> {
        self.0.upgrade()
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }

    pub fn mark_dirty(&self, id: ElementId) -> bool {
        self.upgrade().map_or(false, |inner| inner.mark_dirty(id))
    }

    pub fn rebuild(&self, id: ElementId) -> Result<RebuildOutcome, RebuildError> {
        match self.upgrade() {
            Some(inner) => inner.rebuild_element(id),
            None => Ok(RebuildOutcome::Rejected),
        }
    }

    pub fn now_millis(&self) -> u64 {
        self.upgrade().map_or(0, |inner| inner.now_millis())
    }

    pub fn state_object(&self) -> Option<StateObject> {
        self.upgrade()
            .map(|inner| StateObject::new(inner.next_state_id(), self.clone()))
    }

    pub(crate) fn update_state(&self, id: ElementId, update: StateUpdate) -> bool {
        self.upgrade()
            .map_or(false, |inner| inner.update_state(id, update))
    }

    pub(crate) fn record_read(&self, dependency: &Dependency) {
        if let Some(inner) = self.upgrade() {
            inner.record_read(dependency);
        }
    }

    pub(crate) fn notify_write(&self, dependency: &Dependency) -> usize {
        self.upgrade()
            .map_or(0, |inner| inner.notify_write(dependency))
    }

    pub(crate) fn forget_state(&self, state: StateId) {
        if let Some(inner) = self.upgrade() {
            inner.forget_state(state);
        }
    }

    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        match self.upgrade() {
            Some(inner) => inner.untracked(f),
            None => f(),
        }
    }
}

/// Collects collaborators and configuration for a [`Runtime`].
#[derive(Default)]
pub struct RuntimeBuilder {
    renderer: Option<Box<dyn Renderer>>,
    host: Option<Arc<dyn HostScheduler>>,
    clock: Option<Rc<dyn Clock>>,
    config: RuntimeConfig,
}

impl RuntimeBuilder {
    pub fn renderer(mut self, renderer: impl Renderer) -> Self {
        self.renderer = Some(Box::new(renderer));
        self
    }

    pub fn boxed_renderer(mut self, renderer: Box<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn host(mut self, host: Arc<dyn HostScheduler>) -> Self {
        self.host = Some(host);
        self
    }

    /// Without a clock, time stands still at zero.
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Some(Rc::new(clock));
        self
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn build(self) -> Result<Runtime, ConfigError> {
        let renderer = self.renderer.ok_or(ConfigError::MissingRenderer)?;
        let host = self.host.unwrap_or_else(|| Arc::new(NoopHost));
        let clock = self
            .clock
            .unwrap_or_else(|| Rc::new(ManualClock::new()) as Rc<dyn Clock>);
        Ok(Runtime::assemble(renderer, host, clock, self.config))
    }
}

/// Owner of one element tree. Dropping it unmounts everything and runs
/// every outstanding cleanup callback.
pub struct Runtime {
    inner: Rc<RuntimeInner>,
}

impl Runtime {
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::default()
    }

    /// Runtime with default configuration, no host and a frozen clock.
    pub fn new(renderer: impl Renderer) -> Self {
        Self::assemble(
            Box::new(renderer),
            Arc::new(NoopHost),
            Rc::new(ManualClock::new()),
            RuntimeConfig::default(),
        )
    }

    fn assemble(
        mut renderer: Box<dyn Renderer>,
        host: Arc<dyn HostScheduler>,
        clock: Rc<dyn Clock>,
        config: RuntimeConfig,
    ) -> Self {
        let container = renderer.container();
        let inner = Rc::new_cyclic(|this| RuntimeInner {
            config,
            this: this.clone(),
            host,
            clock,
            elements: RefCell::new(ElementArena::default()),
            scheduler: RefCell::new(Scheduler::new()),
            tracker: RefCell::new(DependencyTracker::new()),
            resources: RefCell::new(ResourceTracker::new()),
            renderer: RefCell::new(renderer),
            container,
            roots: RefCell::new(Vec::new()),
            diagnostics: RefCell::new(Vec::new()),
            failures: RefCell::new(Vec::new()),
            patch_log: RefCell::new(Vec::new()),
            next_state: Cell::new(1),
            disposed: Cell::new(false),
        });
        Self { inner }
    }

    pub fn handle(&self) -> RuntimeHandle {
        self.inner.handle()
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.inner.config
    }

    pub fn now_millis(&self) -> u64 {
        self.inner.now_millis()
    }

    /// Create an element for `widget` without mounting it.
    pub fn create(&self, widget: WidgetRef) -> ElementId {
        self.inner.create_element(widget, None)
    }

    /// Mount a parentless element and commit its output into the
    /// renderer's container.
    pub fn mount(&self, id: ElementId) -> Result<(), RebuildError> {
        self.inner.mount_top_level(id)
    }

    /// Create, mount and commit a top-level element. A failed first build
    /// discards the element again.
    pub fn mount_root(&self, widget: WidgetRef) -> Result<ElementId, RebuildError> {
        let id = self.create(widget);
        match self.inner.mount_top_level(id) {
            Err(err @ RebuildError::Build { .. }) => {
                self.inner.unmount_subtree(id);
                Err(err)
            }
            Err(err) => Err(err),
            Ok(()) => Ok(id),
        }
    }

    pub fn unmount(&self, id: ElementId) {
        self.inner.unmount(id);
    }

    pub fn mark_dirty(&self, id: ElementId) -> bool {
        self.inner.mark_dirty(id)
    }

    /// Rebuild one element right away, outside of any tick.
    pub fn rebuild(&self, id: ElementId) -> Result<RebuildOutcome, RebuildError> {
        self.inner.rebuild_element(id)
    }

    /// Rebuild every element in the dirty set, shallowest first.
    pub fn tick(&self) -> TickReport {
        self.inner.run_tick()
    }

    pub fn needs_tick(&self) -> bool {
        self.inner.scheduler.borrow().has_pending()
    }

    /// Tick until the dirty set is empty or `max_ticks_per_pump` ticks ran.
    pub fn run_until_idle(&self) -> Vec<TickReport> {
        let mut reports = Vec::new();
        while self.needs_tick() && reports.len() < self.inner.config.max_ticks_per_pump {
            reports.push(self.tick());
        }
        if self.needs_tick() {
            log::warn!(
                "still dirty after {} ticks; giving up for this pump",
                reports.len()
            );
        }
        reports
    }

    pub fn state_object(&self) -> StateObject {
        StateObject::new(self.inner.next_state_id(), self.handle())
    }

    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        self.inner.untracked(f)
    }

    /// Invoke every listener `id` registered under `name`. Returns how many
    /// ran.
    pub fn dispatch(&self, id: ElementId, name: &str, payload: impl Into<Primitive>) -> usize {
        self.inner.dispatch(id, name, &payload.into())
    }

    pub fn take_diagnostics(&self) -> Vec<Diagnostic> {
        mem::take(&mut *self.inner.diagnostics.borrow_mut())
    }

    /// Report elements that stayed registered while unmounted for longer
    /// than `leak_age`. Never frees anything.
    pub fn sweep_leaks(&self) -> Vec<LeakReport> {
        let reports = self
            .inner
            .resources
            .borrow()
            .sweep(self.now_millis(), self.inner.config.leak_age);
        for report in &reports {
            self.inner.warn(Diagnostic::ProbableLeak {
                element: report.element,
                widget: report.widget,
                age: report.age,
            });
        }
        reports
    }

    pub fn element_dependencies(&self, id: ElementId) -> Vec<Dependency> {
        self.inner.tracker.borrow().element_dependencies(id)
    }

    pub fn listener_count(&self, id: ElementId) -> usize {
        self.inner.resources.borrow().listener_count(id)
    }

    pub fn is_registered(&self, id: ElementId) -> bool {
        self.inner.resources.borrow().is_registered(id)
    }

    /// `None` once the element has been unmounted and released.
    pub fn lifecycle(&self, id: ElementId) -> Option<Lifecycle> {
        self.inner.lifecycle(id)
    }

    pub fn element(&self, id: ElementId) -> Option<ElementInfo> {
        self.inner
            .with_element(id, |element| ElementInfo::capture(id, element))
    }

    pub fn element_count(&self) -> usize {
        self.inner.elements.borrow().len()
    }

    pub fn roots(&self) -> Vec<ElementId> {
        self.inner.roots.borrow().clone()
    }

    pub fn root(&self) -> Option<ElementId> {
        self.inner.roots.borrow().first().copied()
    }

    pub fn with_renderer<R>(&self, f: impl FnOnce(&dyn Renderer) -> R) -> R {
        f(&**self.inner.renderer.borrow())
    }

    /// Typed access to the renderer, e.g. to inspect a `MemoryRenderer`.
    pub fn with_renderer_as<T: Renderer, R>(&self, f: impl FnOnce(&T) -> R) -> Option<R> {
        let renderer = self.inner.renderer.borrow();
        renderer.as_any().downcast_ref::<T>().map(f)
    }

    pub fn with_renderer_as_mut<T: Renderer, R>(&self, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let mut renderer = self.inner.renderer.borrow_mut();
        renderer.as_any_mut().downcast_mut::<T>().map(f)
    }

    pub fn describe(&self, id: ElementId) -> Option<DebugInfo> {
        self.inner.describe_element(id)
    }

    pub fn dump_tree(&self) -> String {
        let roots = self.roots();
        if roots.is_empty() {
            return "(no root)\n".to_string();
        }
        roots
            .into_iter()
            .filter_map(|root| self.inner.describe_element(root))
            .map(|info| info.render())
            .collect()
    }

    /// Unmount every element and release all output. Also runs on drop.
    pub fn dispose(&self) {
        self.inner.dispose();
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        self.inner.dispose();
    }
}

#[cfg(test)]
#[path = "tests/runtime_tests.rs"]
mod tests;
