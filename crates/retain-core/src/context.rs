//! What a build can reach besides its own widget.

use std::any::Any;
use std::marker::PhantomData;
use std::rc::Rc;

use crate::config::RuntimeConfig;
use crate::element::ElementId;
use crate::runtime::{RuntimeHandle, RuntimeInner};
use crate::vnode::Primitive;

/// Deferred mutation of a stateful element's state.
pub(crate) type StateUpdate = Box<dyn FnOnce(&mut dyn Any) -> bool>;

/// Passed to every build and lifecycle hook. Borrowing the runtime keeps
/// the context from escaping the call it was created for; use
/// [`BuildContext::handle`] or [`BuildContext::state_handle`] for anything
/// that must outlive it.
pub struct BuildContext<'a> {
    runtime: &'a RuntimeInner,
    element: ElementId,
    depth: usize,
}

impl<'a> BuildContext<'a> {
    pub(crate) fn new(runtime: &'a RuntimeInner, element: ElementId, depth: usize) -> Self {
        Self {
            runtime,
            element,
            depth,
        }
    }

    pub fn element(&self) -> ElementId {
        self.element
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.runtime.config
    }

    pub fn handle(&self) -> RuntimeHandle {
        self.runtime.handle()
    }

    pub fn now_millis(&self) -> u64 {
        self.runtime.now_millis()
    }

    /// Handle for queueing updates to this element's state from event
    /// listeners or other elements.
    pub fn state_handle<S: 'static>(&self) -> StateHandle<S> {
        StateHandle {
            runtime: self.runtime.handle(),
            element: self.element,
            _state: PhantomData,
        }
    }

    /// Register a named listener, reachable through `Runtime::dispatch`.
    /// Listeners live until the next build of this element or its unmount.
    pub fn add_listener(&mut self, name: &str, listener: impl Fn(&Primitive) + 'static) {
        self.runtime.add_listener(self.element, Rc::from(name), Rc::new(listener));
    }

    /// Run `cleanup` exactly once when this element unmounts.
    pub fn on_cleanup(&mut self, cleanup: impl FnOnce() + 'static) {
        self.runtime.add_cleanup(self.element, Box::new(cleanup));
    }

    /// Run `f` without recording state reads against this element.
    pub fn untracked<R>(&self, f: impl FnOnce() -> R) -> R {
        self.runtime.untracked(f)
    }
}

/// Typed, cloneable access to one element's state.
pub struct StateHandle<S> {
    runtime: RuntimeHandle,
    element: ElementId,
    _state: PhantomData<fn(&mut S)>,
}

impl<S> Clone for StateHandle<S> {
    fn clone(&self) -> Self {
        Self {
            runtime: self.runtime.clone(),
            element: self.element,
            _state: PhantomData,
        }
    }
}

impl<S: 'static> StateHandle<S> {
    pub fn element(&self) -> ElementId {
        self.element
    }

    /// Apply `mutator` to the state and schedule a rebuild. While the
    /// element is building, the mutation is queued and applied once the
    /// build returns. Returns `false` when the element is gone.
    pub fn request_update(&self, mutator: impl FnOnce(&mut S) + 'static) -> bool {
        self.runtime.update_state(
            self.element,
            Box::new(move |state: &mut dyn Any| match state.downcast_mut::<S>() {
                Some(state) => {
                    mutator(state);
                    true
                }
                None => false,
            }),
        )
    }
}
