//! Dirty-set bookkeeping for batched rebuilds.
//!
//! The scheduler only tracks *which* elements need work and whether a host
//! tick has been requested. The runtime drives the actual rebuilds so that
//! no scheduler borrow is held while user build code runs.

use crate::collections::map::HashSet;
use crate::element::ElementId;

#[derive(Default)]
pub struct Scheduler {
    dirty: HashSet<ElementId>,
    in_flight: HashSet<ElementId>,
    tick_scheduled: bool,
    in_tick: bool,
    ticks: u64,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an element to the dirty set. Returns `true` when a host tick
    /// should be requested now.
    pub fn mark(&mut self, element: ElementId) -> bool {
        self.dirty.insert(element);
        self.claim_tick_request()
    }

    fn claim_tick_request(&mut self) -> bool {
        if self.in_tick || self.tick_scheduled {
            return false;
        }
        self.tick_scheduled = true;
        true
    }

    /// Snapshot the dirty set as this tick's batch. `depth_of` orders the
    /// batch shallowest first; ties break on element id.
    pub fn begin_tick(&mut self, depth_of: impl Fn(ElementId) -> Option<usize>) -> Vec<ElementId> {
        self.tick_scheduled = false;
        self.in_tick = true;
        let mut batch: Vec<(usize, ElementId)> = self
            .dirty
            .drain()
            .map(|element| (depth_of(element).unwrap_or(usize::MAX), element))
            .collect();
        batch.sort_unstable();
        self.in_flight = batch.iter().map(|(_, element)| *element).collect();
        batch.into_iter().map(|(_, element)| element).collect()
    }

    /// Claim a batch entry for processing. Fails once an ancestor's rebuild
    /// already covered the element.
    pub fn take_in_flight(&mut self, element: ElementId) -> bool {
        self.in_flight.remove(&element)
    }

    /// Record that an element was rebuilt. It stays in the dirty set only
    /// when it was invalidated again while building.
    pub fn settle(&mut self, element: ElementId, still_dirty: bool) {
        self.in_flight.remove(&element);
        if still_dirty {
            self.dirty.insert(element);
        } else {
            self.dirty.remove(&element);
        }
    }

    pub fn forget(&mut self, element: ElementId) {
        self.in_flight.remove(&element);
        self.dirty.remove(&element);
    }

    /// Close the batch. Returns `true` when a follow-up tick must be
    /// requested from the host.
    pub fn end_tick(&mut self) -> bool {
        self.in_flight.clear();
        self.in_tick = false;
        self.ticks += 1;
        !self.dirty.is_empty() && self.claim_tick_request()
    }

    pub fn is_dirty(&self, element: ElementId) -> bool {
        self.dirty.contains(&element) || self.in_flight.contains(&element)
    }

    pub fn pending(&self) -> usize {
        self.dirty.len()
    }

    pub fn has_pending(&self) -> bool {
        !self.dirty.is_empty()
    }

    pub fn is_tick_scheduled(&self) -> bool {
        self.tick_scheduled
    }

    pub fn in_tick(&self) -> bool {
        self.in_tick
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn clear(&mut self) {
        self.dirty.clear();
        self.in_flight.clear();
        self.tick_scheduled = false;
        self.in_tick = false;
    }
}
