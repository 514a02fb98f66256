//! Fine-grained record of which state properties each element read.
//!
//! Tracking is stack scoped: a frame is pushed when an element starts
//! building and popped when it returns, so a build that synchronously
//! builds another element records into the inner frame only. Reads made
//! outside any frame, or inside a suspended frame, are not recorded.

use std::fmt;
use std::rc::Rc;

use crate::collections::map::{HashMap, HashSet};
use crate::element::ElementId;

/// Identity of a state owner.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(pub u64);

impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "state{}", self.0)
    }
}

/// One readable property of one state owner.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Dependency {
    pub state: StateId,
    pub property: Rc<str>,
}

impl Dependency {
    pub fn new(state: StateId, property: impl Into<Rc<str>>) -> Self {
        Self {
            state,
            property: property.into(),
        }
    }
}

impl fmt::Display for Dependency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.state, self.property)
    }
}

#[derive(Default)]
pub struct DependencyTracker {
    frames: Vec<Option<ElementId>>,
    dependents: HashMap<Dependency, HashSet<ElementId>>,
    by_element: HashMap<ElementId, HashSet<Dependency>>,
}

impl DependencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start_tracking(&mut self, element: ElementId) {
        self.frames.push(Some(element));
    }

    /// Push a frame that records nothing until popped.
    pub fn suspend(&mut self) {
        self.frames.push(None);
    }

    pub fn stop_tracking(&mut self) -> Option<ElementId> {
        self.frames.pop().flatten()
    }

    /// Element whose build is currently recording reads.
    pub fn current(&self) -> Option<ElementId> {
        self.frames.last().copied().flatten()
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Record a read against the innermost frame. Returns whether an edge
    /// was added.
    pub fn record_read(&mut self, dependency: &Dependency) -> bool {
        let Some(element) = self.current() else {
            return false;
        };
        let added = self
            .dependents
            .entry(dependency.clone())
            .or_default()
            .insert(element);
        if added {
            self.by_element
                .entry(element)
                .or_default()
                .insert(dependency.clone());
        }
        added
    }

    /// Elements whose last build read `dependency`, in id order.
    pub fn dependents(&self, dependency: &Dependency) -> Vec<ElementId> {
        let mut out: Vec<ElementId> = self
            .dependents
            .get(dependency)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        out.sort_unstable();
        out
    }

    /// Remove every edge that points at `element`. Returns how many were
    /// removed.
    pub fn clear_dependencies(&mut self, element: ElementId) -> usize {
        self.take_dependencies(element).len()
    }

    /// Remove `element`'s edges and hand them back, so a build that fails
    /// can reinstate what the previous build read.
    pub fn take_dependencies(&mut self, element: ElementId) -> Vec<Dependency> {
        let Some(dependencies) = self.by_element.remove(&element) else {
            return Vec::new();
        };
        for dependency in &dependencies {
            if let Some(set) = self.dependents.get_mut(dependency) {
                set.remove(&element);
                if set.is_empty() {
                    self.dependents.remove(dependency);
                }
            }
        }
        dependencies.into_iter().collect()
    }

    /// Add edges from `element` to each of `dependencies`, keeping any it
    /// already has.
    pub fn restore_dependencies(&mut self, element: ElementId, dependencies: Vec<Dependency>) {
        for dependency in dependencies {
            self.dependents
                .entry(dependency.clone())
                .or_default()
                .insert(element);
            self.by_element.entry(element).or_default().insert(dependency);
        }
    }

    /// Drop all edges of a state owner that no longer exists.
    pub fn forget_state(&mut self, state: StateId) {
        let stale: Vec<Dependency> = self
            .dependents
            .keys()
            .filter(|dependency| dependency.state == state)
            .cloned()
            .collect();
        for dependency in stale {
            if let Some(elements) = self.dependents.remove(&dependency) {
                for element in elements {
                    if let Some(set) = self.by_element.get_mut(&element) {
                        set.remove(&dependency);
                        if set.is_empty() {
                            self.by_element.remove(&element);
                        }
                    }
                }
            }
        }
    }

    pub fn element_dependencies(&self, element: ElementId) -> Vec<Dependency> {
        self.by_element
            .get(&element)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn edge_count(&self) -> usize {
        self.by_element.values().map(|set| set.len()).sum()
    }

    pub fn clear(&mut self) {
        self.frames.clear();
        self.dependents.clear();
        self.by_element.clear();
    }
}
