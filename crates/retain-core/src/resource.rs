//! Per-element registry of listeners, cleanup callbacks and output handles.
//!
//! Every created element is registered here. Unmount takes the entry out
//! exactly once, so cleanup callbacks can never run twice. Entries that stay
//! registered while unmounted are reported by [`ResourceTracker::sweep`],
//! which only reports and never frees.

use std::fmt;
use std::rc::Rc;
use std::time::Duration;

use crate::collections::map::HashMap;
use crate::element::ElementId;
use crate::vnode::{OutputHandle, Primitive};

pub type ListenerFn = Rc<dyn Fn(&Primitive)>;

pub(crate) type CleanupFn = Box<dyn FnOnce()>;

#[derive(Clone)]
pub(crate) struct Listener {
    name: Rc<str>,
    callback: ListenerFn,
}

struct ResourceEntry {
    widget: &'static str,
    registered_at: u64,
    mounted: bool,
    listeners: Vec<Listener>,
    cleanups: Vec<CleanupFn>,
    output: Option<OutputHandle>,
}

/// What an element still held when it was cleaned up.
pub(crate) struct Released {
    pub(crate) listeners: usize,
    pub(crate) cleanups: Vec<CleanupFn>,
    pub(crate) output: Option<OutputHandle>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LeakReport {
    pub element: ElementId,
    pub widget: &'static str,
    pub age: Duration,
}

impl fmt::Display for LeakReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}) registered {}ms ago and never cleaned up",
            self.element,
            self.widget,
            self.age.as_millis()
        )
    }
}

#[derive(Default)]
pub struct ResourceTracker {
    entries: HashMap<ElementId, ResourceEntry>,
    released: u64,
}

impl ResourceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn register(&mut self, element: ElementId, widget: &'static str, now: u64) {
        self.entries.insert(
            element,
            ResourceEntry {
                widget,
                registered_at: now,
                mounted: false,
                listeners: Vec::new(),
                cleanups: Vec::new(),
                output: None,
            },
        );
    }

    pub(crate) fn set_mounted(&mut self, element: ElementId, mounted: bool) {
        if let Some(entry) = self.entries.get_mut(&element) {
            entry.mounted = mounted;
        }
    }

    pub(crate) fn set_output(&mut self, element: ElementId, output: Option<OutputHandle>) {
        if let Some(entry) = self.entries.get_mut(&element) {
            entry.output = output;
        }
    }

    pub(crate) fn add_listener(
        &mut self,
        element: ElementId,
        name: Rc<str>,
        callback: ListenerFn,
    ) -> bool {
        match self.entries.get_mut(&element) {
            Some(entry) => {
                entry.listeners.push(Listener { name, callback });
                true
            }
            None => false,
        }
    }

    /// Hands the callback back when the element is not registered so the
    /// caller can run it immediately.
    pub(crate) fn add_cleanup(&mut self, element: ElementId, cleanup: CleanupFn) -> Option<CleanupFn> {
        match self.entries.get_mut(&element) {
            Some(entry) => {
                entry.cleanups.push(cleanup);
                None
            }
            None => Some(cleanup),
        }
    }

    pub(crate) fn listeners_named(&self, element: ElementId, name: &str) -> Vec<ListenerFn> {
        self.entries
            .get(&element)
            .map(|entry| {
                entry
                    .listeners
                    .iter()
                    .filter(|listener| &*listener.name == name)
                    .map(|listener| listener.callback.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Take every listener an element registered. Done before a rebuild so
    /// listeners are registered afresh by each build.
    pub(crate) fn take_listeners(&mut self, element: ElementId) -> Vec<Listener> {
        self.entries
            .get_mut(&element)
            .map(|entry| std::mem::take(&mut entry.listeners))
            .unwrap_or_default()
    }

    /// Put back listeners taken before a build that then failed. Anything
    /// the failed build registered is discarded.
    pub(crate) fn restore_listeners(&mut self, element: ElementId, listeners: Vec<Listener>) {
        if let Some(entry) = self.entries.get_mut(&element) {
            entry.listeners = listeners;
        }
    }

    pub fn listener_count(&self, element: ElementId) -> usize {
        self.entries
            .get(&element)
            .map(|entry| entry.listeners.len())
            .unwrap_or(0)
    }

    pub fn is_registered(&self, element: ElementId) -> bool {
        self.entries.contains_key(&element)
    }

    pub fn output(&self, element: ElementId) -> Option<OutputHandle> {
        self.entries.get(&element).and_then(|entry| entry.output)
    }

    /// Remove an element's entry. Only the first call for a given element
    /// returns anything.
    pub(crate) fn take(&mut self, element: ElementId) -> Option<Released> {
        let entry = self.entries.remove(&element)?;
        self.released += 1;
        Some(Released {
            listeners: entry.listeners.len(),
            cleanups: entry.cleanups,
            output: entry.output,
        })
    }

    /// Report entries that are unmounted and were registered at least `age`
    /// ago.
    pub fn sweep(&self, now: u64, age: Duration) -> Vec<LeakReport> {
        let threshold = age.as_millis() as u64;
        let mut reports: Vec<LeakReport> = self
            .entries
            .iter()
            .filter(|(_, entry)| !entry.mounted)
            .filter_map(|(element, entry)| {
                let elapsed = now.saturating_sub(entry.registered_at);
                (elapsed >= threshold).then(|| LeakReport {
                    element: *element,
                    widget: entry.widget,
                    age: Duration::from_millis(elapsed),
                })
            })
            .collect();
        reports.sort_by_key(|report| report.element);
        reports
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries cleaned up so far.
    pub fn released(&self) -> u64 {
        self.released
    }

    pub(crate) fn drain(&mut self) -> Vec<(ElementId, Released)> {
        let mut ids: Vec<ElementId> = self.entries.keys().copied().collect();
        ids.sort_unstable();
        ids.into_iter()
            .filter_map(|id| self.take(id).map(|released| (id, released)))
            .collect()
    }
}
