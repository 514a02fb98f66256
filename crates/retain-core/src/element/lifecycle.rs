//! Element state machine: create, mount, mark dirty, rebuild, unmount.

use std::mem;

use super::{Element, ElementId, Lifecycle};
use crate::context::BuildContext;
use crate::diagnostics::Diagnostic;
use crate::diff::diff;
use crate::error::{BuildError, RebuildError};
use crate::patch::{Patch, PatchKind, PatchOp};
use crate::renderer::locate;
use crate::runtime::{RebuildOutcome, RuntimeInner, TrackingFrame};
use crate::vnode::{NodePath, VNode};
use crate::widget::{ErasedState, WidgetRef};

/// Holds an element in `Building` and guarantees it leaves that state,
/// including on early return or unwinding.
pub(crate) struct BuildingGuard<'a> {
    runtime: &'a RuntimeInner,
    element: ElementId,
    fallback: Lifecycle,
    settled: bool,
}

impl<'a> BuildingGuard<'a> {
    pub(crate) fn enter(runtime: &'a RuntimeInner, element: ElementId, fallback: Lifecycle) -> Self {
        runtime.with_element_mut(element, |el| {
            el.lifecycle = Lifecycle::Building;
            el.dirty_while_building = false;
        });
        Self {
            runtime,
            element,
            fallback,
            settled: false,
        }
    }

    /// Successful build: `Mounted`, or `Dirty` when invalidated meanwhile.
    pub(crate) fn settle(mut self) -> Lifecycle {
        self.settled = true;
        self.release(Lifecycle::Mounted)
    }

    /// Keep the element dirty so the next tick retries it.
    pub(crate) fn keep_dirty(mut self) {
        self.settled = true;
        self.runtime.with_element_mut(self.element, |el| {
            el.lifecycle = Lifecycle::Dirty;
            el.dirty_while_building = false;
        });
        self.runtime.request_tick_for(self.element);
    }

    fn release(&self, clean: Lifecycle) -> Lifecycle {
        let Ok(mut elements) = self.runtime.elements.try_borrow_mut() else {
            return clean;
        };
        let Some(el) = elements.get_mut(self.element) else {
            return clean;
        };
        let still_dirty = el.dirty_while_building && clean != Lifecycle::Unmounted;
        el.lifecycle = if still_dirty { Lifecycle::Dirty } else { clean };
        el.dirty_while_building = false;
        let lifecycle = el.lifecycle;
        drop(elements);
        if let Ok(mut scheduler) = self.runtime.scheduler.try_borrow_mut() {
            scheduler.settle(self.element, still_dirty);
        }
        lifecycle
    }
}

impl Drop for BuildingGuard<'_> {
    fn drop(&mut self) {
        if !self.settled {
            self.release(self.fallback);
        }
    }
}

impl RuntimeInner {
    pub(crate) fn create_element(&self, widget: WidgetRef, parent: Option<ElementId>) -> ElementId {
        let name = widget.type_name();
        let id = self.elements.borrow_mut().insert(Element::new(widget, parent));
        self.resources
            .borrow_mut()
            .register(id, name, self.now_millis());
        log::trace!("created {id} ({name})");
        id
    }

    /// Mount and build an element for the first time. `Ok(None)` means the
    /// request was rejected as a lifecycle violation.
    pub(crate) fn mount_element(
        &self,
        id: ElementId,
        parent: Option<ElementId>,
        slot: NodePath,
    ) -> Result<Option<VNode>, BuildError> {
        if self.lifecycle(id) != Some(Lifecycle::Unmounted) {
            self.warn(Diagnostic::DoubleMount { element: id });
            return Ok(None);
        }
        let depth = parent
            .and_then(|parent| self.with_element(parent, |el| el.depth + 1))
            .unwrap_or(0);
        self.with_element_mut(id, |el| {
            el.parent = parent;
            el.depth = depth;
            el.slot = slot;
        });

        let guard = BuildingGuard::enter(self, id, Lifecycle::Unmounted);
        self.init_state(id, depth);
        let vnode = self.perform_rebuild(id)?;
        self.with_element_mut(id, |el| el.last_vnode = Some(vnode.clone()));
        guard.settle();
        self.resources.borrow_mut().set_mounted(id, true);
        self.with_state(id, |state| {
            let mut cx = BuildContext::new(self, id, depth);
            state.mounted(&mut cx);
        });
        log::trace!("mounted {id} at depth {depth}");
        Ok(Some(vnode))
    }

    /// Mount a parentless element and commit its output.
    pub(crate) fn mount_top_level(&self, id: ElementId) -> Result<(), RebuildError> {
        if self.with_element(id, |el| el.parent.is_some()) == Some(true) {
            self.warn(Diagnostic::DoubleMount { element: id });
            return Ok(());
        }
        let vnode = match self.mount_element(id, None, Vec::new()) {
            Ok(Some(vnode)) => vnode,
            Ok(None) => return Ok(()),
            Err(source) => return Err(RebuildError::Build { element: id, source }),
        };
        self.roots.borrow_mut().push(id);
        let patches = diff(None, Some(&vnode));
        match self.apply_patches(None, &patches) {
            Ok(output) => {
                self.with_element_mut(id, |el| el.output = output);
                self.resources.borrow_mut().set_output(id, output);
                self.refresh_outputs(id);
                Ok(())
            }
            Err(source) => {
                // Nothing was committed; the next tick inserts from scratch.
                self.with_element_mut(id, |el| {
                    el.last_vnode = None;
                    el.lifecycle = Lifecycle::Dirty;
                });
                self.request_tick_for(id);
                let err = RebuildError::Patch { element: id, source };
                log::error!("{err}");
                Err(err)
            }
        }
    }

    pub(crate) fn mark_dirty(&self, id: ElementId) -> bool {
        enum Mark {
            Rejected,
            Already,
            Marked,
        }
        let mark = self.with_element_mut(id, |el| match el.lifecycle {
            Lifecycle::Unmounted => Mark::Rejected,
            Lifecycle::Dirty => Mark::Already,
            Lifecycle::Building => {
                el.dirty_while_building = true;
                Mark::Marked
            }
            Lifecycle::Mounted => {
                el.lifecycle = Lifecycle::Dirty;
                Mark::Marked
            }
        });
        match mark {
            None | Some(Mark::Rejected) => {
                self.warn(Diagnostic::MarkDirtyUnmounted { element: id });
                false
            }
            Some(Mark::Already) => false,
            Some(Mark::Marked) => {
                self.request_tick_for(id);
                true
            }
        }
    }

    /// Rebuild an element on its own: diff against its previous VNode,
    /// patch its own output and splice the result into its ancestors.
    pub(crate) fn rebuild_element(&self, id: ElementId) -> Result<RebuildOutcome, RebuildError> {
        match self.lifecycle(id) {
            None | Some(Lifecycle::Unmounted) => {
                self.warn(Diagnostic::RebuildUnmounted { element: id });
                return Ok(RebuildOutcome::Rejected);
            }
            Some(Lifecycle::Building) => {
                self.warn(Diagnostic::ReentrantRebuild { element: id });
                return Ok(RebuildOutcome::Rejected);
            }
            Some(Lifecycle::Mounted | Lifecycle::Dirty) => {}
        }

        let stale = self.subtree_output_stale(id);
        let guard = BuildingGuard::enter(self, id, Lifecycle::Mounted);
        let old = self.with_element(id, |el| el.last_vnode.clone()).flatten();
        let new = match self.perform_rebuild(id) {
            Ok(vnode) => vnode,
            Err(source) => return Err(RebuildError::Build { element: id, source }),
        };

        let output = self.with_element(id, |el| el.output).flatten();
        let patches = match output {
            Some(_) if stale => vec![Patch::new(NodePath::new(), PatchOp::Replace(new.clone()))],
            None if stale => diff(None, Some(&new)),
            _ => diff(old.as_ref(), Some(&new)),
        };
        match self.apply_patches(output, &patches) {
            Ok(output) => {
                self.with_element_mut(id, |el| {
                    el.last_vnode = Some(new.clone());
                    el.output = output;
                });
                if stale {
                    self.clear_output_stale(id);
                }
                self.resources.borrow_mut().set_output(id, output);
                self.refresh_outputs(id);
                self.splice_into_ancestors(id, new);
                guard.settle();
                let applied = patches
                    .iter()
                    .filter(|patch| patch.kind() != PatchKind::NoOp)
                    .count();
                log::trace!("rebuilt {id}: {applied} patches");
                Ok(RebuildOutcome::Rebuilt { patches: applied })
            }
            Err(source) => {
                // Earlier patches of the list may have landed already.
                self.with_element_mut(id, |el| el.output_stale = true);
                guard.keep_dirty();
                Err(RebuildError::Patch { element: id, source })
            }
        }
    }

    /// Rebuild a child while its parent resolves. The parent owns the diff,
    /// so nothing is patched here.
    pub(crate) fn rebuild_nested(&self, id: ElementId) -> Result<VNode, BuildError> {
        let guard = BuildingGuard::enter(self, id, Lifecycle::Mounted);
        let vnode = self.perform_rebuild(id)?;
        self.with_element_mut(id, |el| el.last_vnode = Some(vnode.clone()));
        guard.settle();
        Ok(vnode)
    }

    /// Run the element's build and resolve the result to a VNode. In
    /// error-indicator mode a failure renders the indicator instead.
    pub(crate) fn perform_rebuild(&self, id: ElementId) -> Result<VNode, BuildError> {
        let Some((widget, depth, stateful, dependencies_changed)) =
            self.with_element_mut(id, |el| {
                el.builds += 1;
                (
                    el.widget.clone(),
                    el.depth,
                    el.behavior.is_stateful(),
                    mem::take(&mut el.dependencies_changed),
                )
            })
        else {
            return Err(BuildError::new("element no longer exists"));
        };

        let previous_reads = self.tracker.borrow_mut().take_dependencies(id);
        let previous_listeners = self.resources.borrow_mut().take_listeners(id);
        let built = {
            let _frame = TrackingFrame::start(&self.tracker, id);
            let mut cx = BuildContext::new(self, id, depth);
            if stateful {
                self.build_stateful(id, &widget, dependencies_changed, &mut cx)
            } else {
                widget.inner().build(&mut cx)
            }
        };

        let key = widget.key();
        match built.and_then(|result| self.resolve_result(id, result)) {
            Ok(vnode) => Ok(vnode.keyed_by_default(key.as_ref())),
            Err(err) => {
                let err = err.in_widget(widget.type_name());
                // Whatever the failed build got to read is kept alongside
                // the previous reads, so a write to either retries it.
                self.tracker
                    .borrow_mut()
                    .restore_dependencies(id, previous_reads);
                if !self.config.error_indicator {
                    self.resources
                        .borrow_mut()
                        .restore_listeners(id, previous_listeners);
                    return Err(err);
                }
                self.record_failure(RebuildError::Build {
                    element: id,
                    source: err.clone(),
                });
                self.unmount_children(id);
                Ok(VNode::error_indicator(err.message()).keyed_by_default(key.as_ref()))
            }
        }
    }

    fn build_stateful(
        &self,
        id: ElementId,
        widget: &WidgetRef,
        dependencies_changed: bool,
        cx: &mut BuildContext<'_>,
    ) -> Result<crate::widget::BuildResult, BuildError> {
        let Some(mut state) = self.with_element_mut(id, Element::take_state).flatten() else {
            return Err(BuildError::new("state is already in use"));
        };
        if dependencies_changed {
            state.dependencies_changed(widget.inner());
        }
        let result = state.build(widget.inner(), cx);
        let pending = self
            .with_element_mut(id, |el| mem::take(&mut el.pending_updates))
            .unwrap_or_default();
        for update in pending {
            if !update(state.state_mut()) {
                self.warn(Diagnostic::StateTypeMismatch { element: id });
            }
        }
        self.with_element_mut(id, |el| el.restore_state(state));
        result
    }

    fn init_state(&self, id: ElementId, depth: usize) {
        let Some(widget) = self.with_element_mut(id, |el| {
            (!mem::replace(&mut el.initialized, true)).then(|| el.widget.clone())
        })
        .flatten() else {
            return;
        };
        self.with_state(id, |state| {
            let mut cx = BuildContext::new(self, id, depth);
            state.init(widget.inner(), &mut cx);
        });
    }

    /// Lend the element's state to `f`. Updates queued meanwhile are
    /// applied before the state is put back.
    pub(crate) fn with_state(&self, id: ElementId, f: impl FnOnce(&mut dyn ErasedState)) {
        let Some(mut state) = self.with_element_mut(id, Element::take_state).flatten() else {
            return;
        };
        f(state.as_mut());
        let pending = self
            .with_element_mut(id, |el| mem::take(&mut el.pending_updates))
            .unwrap_or_default();
        for update in pending {
            update(state.state_mut());
        }
        self.with_element_mut(id, |el| el.restore_state(state));
    }

    /// Public unmount. A top-level element releases its output; a nested
    /// one is detached and its parent rebuilt on the next tick.
    pub(crate) fn unmount(&self, id: ElementId) {
        let parent = match self.with_element(id, |el| (el.lifecycle, el.parent)) {
            Some((Lifecycle::Mounted | Lifecycle::Dirty, parent)) => parent,
            _ => {
                self.warn(Diagnostic::UnmountUnmounted { element: id });
                return;
            }
        };
        match parent {
            None => {
                self.roots.borrow_mut().retain(|root| *root != id);
                let output = self.with_element(id, |el| el.output).flatten();
                if let Some(output) = output {
                    self.release_output(output);
                }
                self.unmount_subtree(id);
            }
            Some(parent) => {
                self.with_element_mut(parent, |el| {
                    el.children.retain(|child| *child != id);
                    el.child_by_key.retain(|_, child| *child != id);
                });
                self.unmount_subtree(id);
                self.mark_dirty(parent);
            }
        }
    }

    /// Tear down `id` and its descendants, children before parents.
    pub(crate) fn unmount_subtree(&self, id: ElementId) {
        let Some(children) = self.with_element(id, |el| el.children.clone()) else {
            return;
        };
        self.with_state(id, |state| state.dispose());
        for child in children {
            self.unmount_subtree(child);
        }
        self.cleanup(id);
        self.scheduler.borrow_mut().forget(id);
        let removed = self.elements.borrow_mut().remove(id);
        if let Some(element) = removed {
            log::trace!("unmounted {id} ({})", element.widget.type_name());
        }
    }

    pub(crate) fn unmount_children(&self, id: ElementId) {
        let children = self
            .with_element_mut(id, |el| {
                el.child_by_key.clear();
                mem::take(&mut el.children)
            })
            .unwrap_or_default();
        for child in children {
            self.unmount_subtree(child);
        }
    }

    /// Release everything the resource tracker holds for `id` and drop its
    /// dependency edges. Only the first call does anything.
    pub(crate) fn cleanup(&self, id: ElementId) -> bool {
        let edges = self.tracker.borrow_mut().clear_dependencies(id);
        let released = self.resources.borrow_mut().take(id);
        let Some(released) = released else {
            return false;
        };
        let callbacks = released.cleanups.len();
        for cleanup in released.cleanups {
            cleanup();
        }
        log::trace!(
            "released {id}: {} listeners, {callbacks} cleanups, {edges} edges",
            released.listeners
        );
        true
    }

    /// Whether `id` or a descendant holds output that a failed patch list
    /// left half applied.
    fn subtree_output_stale(&self, id: ElementId) -> bool {
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            let Some((stale, children)) =
                self.with_element(current, |el| (el.output_stale, el.children.clone()))
            else {
                continue;
            };
            if stale {
                return true;
            }
            pending.extend(children);
        }
        false
    }

    fn clear_output_stale(&self, id: ElementId) {
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            let children = self.with_element_mut(current, |el| {
                el.output_stale = false;
                el.children.clone()
            });
            pending.extend(children.into_iter().flatten());
        }
    }

    /// Point every descendant at its committed output after the element's
    /// own output changed.
    pub(crate) fn refresh_outputs(&self, id: ElementId) {
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            let Some((output, children)) = self.with_element(current, |el| (el.output, el.children.clone()))
            else {
                continue;
            };
            for child in children {
                let Some(slot) = self.with_element(child, |el| el.slot.clone()) else {
                    continue;
                };
                let located = output.and_then(|output| {
                    let renderer = self.renderer.borrow();
                    locate(&**renderer, output, &slot)
                });
                self.with_element_mut(child, |el| el.output = located);
                self.resources.borrow_mut().set_output(child, located);
                pending.push(child);
            }
        }
    }

    /// Write an independently rebuilt VNode back into every ancestor's last
    /// VNode so their next diff starts from what is actually committed.
    fn splice_into_ancestors(&self, id: ElementId, vnode: VNode) {
        let mut current = id;
        let mut replacement = vnode;
        loop {
            let Some((Some(parent), slot, output)) =
                self.with_element(current, |el| (el.parent, el.slot.clone(), el.output))
            else {
                break;
            };
            let updated = self
                .with_element(parent, |el| {
                    let replacement = if slot.is_empty() {
                        replacement.clone().keyed_by_default(el.widget.key().as_ref())
                    } else {
                        replacement.clone()
                    };
                    el.last_vnode
                        .as_ref()
                        .and_then(|previous| previous.replaced_at(&slot, replacement))
                })
                .flatten();
            let Some(updated) = updated else {
                log::warn!("{current} no longer resolves inside the VNode of {parent}");
                break;
            };
            self.with_element_mut(parent, |el| {
                el.last_vnode = Some(updated.clone());
                if slot.is_empty() {
                    el.output = output;
                }
            });
            if slot.is_empty() {
                self.resources.borrow_mut().set_output(parent, output);
            }
            current = parent;
            replacement = updated;
        }
    }
}
