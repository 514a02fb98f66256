//! Observable state whose reads are tracked per building element.
//!
//! A [`StateObject`] owns a set of named properties. Reading a property
//! while an element builds records a dependency edge; writing it marks
//! exactly the elements whose last build read it.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::dependency::{Dependency, StateId};
use crate::runtime::RuntimeHandle;

struct StateOwner {
    id: StateId,
    runtime: RuntimeHandle,
}

impl Drop for StateOwner {
    fn drop(&mut self) {
        self.runtime.forget_state(self.id);
    }
}

/// Owner of observable properties. Clones share identity; the owner's
/// dependency edges are dropped with the last clone.
#[derive(Clone)]
pub struct StateObject {
    owner: Rc<StateOwner>,
}

impl StateObject {
    pub(crate) fn new(id: StateId, runtime: RuntimeHandle) -> Self {
        Self {
            owner: Rc::new(StateOwner { id, runtime }),
        }
    }

    pub fn id(&self) -> StateId {
        self.owner.id
    }

    pub fn property<T: 'static>(&self, name: &str, initial: T) -> Observable<T> {
        Observable {
            inner: Rc::new(ObservableInner {
                owner: self.owner.clone(),
                dependency: Dependency::new(self.owner.id, name),
                value: RefCell::new(initial),
            }),
        }
    }
}

impl fmt::Debug for StateObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateObject").field("id", &self.owner.id).finish()
    }
}

struct ObservableInner<T> {
    owner: Rc<StateOwner>,
    dependency: Dependency,
    value: RefCell<T>,
}

/// One property of a [`StateObject`].
pub struct Observable<T> {
    inner: Rc<ObservableInner<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: 'static> Observable<T> {
    pub fn dependency(&self) -> &Dependency {
        &self.inner.dependency
    }

    fn track(&self) {
        self.inner.owner.runtime.record_read(&self.inner.dependency);
    }

    fn notify(&self) -> usize {
        self.inner.owner.runtime.notify_write(&self.inner.dependency)
    }

    /// Read through a closure, recording the read.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        self.track();
        f(&self.inner.value.borrow())
    }

    pub fn get(&self) -> T
    where
        T: Clone,
    {
        self.with(T::clone)
    }

    /// Read without recording a dependency.
    pub fn peek(&self) -> T
    where
        T: Clone,
    {
        self.inner.value.borrow().clone()
    }

    /// Replace the value and mark dependents dirty. Returns how many
    /// elements were marked.
    pub fn set(&self, value: T) -> usize {
        *self.inner.value.borrow_mut() = value;
        self.notify()
    }

    pub fn update<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let result = f(&mut self.inner.value.borrow_mut());
        self.notify();
        result
    }

    /// Write only when the value differs. Returns whether it did.
    pub fn set_if_changed(&self, value: T) -> bool
    where
        T: PartialEq,
    {
        if *self.inner.value.borrow() == value {
            return false;
        }
        self.set(value);
        true
    }
}

impl<T: fmt::Debug> fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observable")
            .field("dependency", &self.inner.dependency)
            .field("value", &self.inner.value.borrow())
            .finish()
    }
}
