//! Persistent elements: one per mounted widget, owned by an arena.

mod lifecycle;
mod resolve;

use std::fmt;

use crate::collections::map::HashMap;
use crate::context::StateUpdate;
use crate::key::Key;
use crate::vnode::{NodePath, OutputHandle, VNode};
use crate::widget::{ErasedState, WidgetKind, WidgetRef};

pub(crate) use lifecycle::BuildingGuard;

/// Generational element identifier. A stale id never aliases a newer
/// element that happens to reuse the same slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ElementId {
    index: u32,
    generation: u32,
}

impl ElementId {
    pub fn from_raw(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(self) -> u32 {
        self.index
    }

    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}.{}", self.index, self.generation)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    Unmounted,
    Mounted,
    Dirty,
    Building,
}

impl Lifecycle {
    pub fn is_mounted(self) -> bool {
        !matches!(self, Lifecycle::Unmounted)
    }
}

pub(crate) enum Behavior {
    Stateless,
    Composed,
    /// `None` while the state is lent out to a build or hook.
    Stateful(Option<Box<dyn ErasedState>>),
}

impl Behavior {
    fn for_widget(widget: &WidgetRef) -> Self {
        match widget.kind() {
            WidgetKind::Stateless => Behavior::Stateless,
            WidgetKind::Composed => Behavior::Composed,
            WidgetKind::Stateful => Behavior::Stateful(widget.inner().create_state()),
        }
    }

    pub(crate) fn is_stateful(&self) -> bool {
        matches!(self, Behavior::Stateful(_))
    }
}

pub(crate) struct Element {
    pub(crate) widget: WidgetRef,
    pub(crate) behavior: Behavior,
    pub(crate) parent: Option<ElementId>,
    pub(crate) children: Vec<ElementId>,
    pub(crate) child_by_key: HashMap<Key, ElementId>,
    /// Position of this element's VNode inside the parent's VNode.
    pub(crate) slot: NodePath,
    pub(crate) last_vnode: Option<VNode>,
    pub(crate) output: Option<OutputHandle>,
    /// Set when a patch list failed partway; the output no longer matches
    /// `last_vnode` and must be replaced wholesale.
    pub(crate) output_stale: bool,
    pub(crate) lifecycle: Lifecycle,
    pub(crate) depth: usize,
    pub(crate) dirty_while_building: bool,
    pub(crate) dependencies_changed: bool,
    pub(crate) pending_updates: Vec<StateUpdate>,
    pub(crate) initialized: bool,
    pub(crate) builds: u64,
}

impl Element {
    pub(crate) fn new(widget: WidgetRef, parent: Option<ElementId>) -> Self {
        let behavior = Behavior::for_widget(&widget);
        Self {
            widget,
            behavior,
            parent,
            children: Vec::new(),
            child_by_key: HashMap::default(),
            slot: Vec::new(),
            last_vnode: None,
            output: None,
            output_stale: false,
            lifecycle: Lifecycle::Unmounted,
            depth: 0,
            dirty_while_building: false,
            dependencies_changed: false,
            pending_updates: Vec::new(),
            initialized: false,
            builds: 0,
        }
    }

    pub(crate) fn take_state(&mut self) -> Option<Box<dyn ErasedState>> {
        match &mut self.behavior {
            Behavior::Stateful(state) => state.take(),
            _ => None,
        }
    }

    pub(crate) fn restore_state(&mut self, restored: Box<dyn ErasedState>) {
        if let Behavior::Stateful(state) = &mut self.behavior {
            *state = Some(restored);
        }
    }
}

struct Slot {
    generation: u32,
    element: Option<Element>,
}

#[derive(Default)]
pub(crate) struct ElementArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
}

impl ElementArena {
    pub(crate) fn insert(&mut self, element: Element) -> ElementId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.element = Some(element);
            return ElementId::from_raw(index, slot.generation);
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            element: Some(element),
        });
        ElementId::from_raw(index, 0)
    }

    pub(crate) fn get(&self, id: ElementId) -> Option<&Element> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.element.as_ref())
    }

    pub(crate) fn get_mut(&mut self, id: ElementId) -> Option<&mut Element> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.element.as_mut())
    }

    pub(crate) fn contains(&self, id: ElementId) -> bool {
        self.get(id).is_some()
    }

    pub(crate) fn remove(&mut self, id: ElementId) -> Option<Element> {
        let slot = self
            .slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)?;
        let element = slot.element.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;
        Some(element)
    }

    pub(crate) fn len(&self) -> usize {
        self.live
    }

    pub(crate) fn ids(&self) -> Vec<ElementId> {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.element.is_some())
            .map(|(index, slot)| ElementId::from_raw(index as u32, slot.generation))
            .collect()
    }
}

/// Read-only snapshot of one element.
#[derive(Clone, Debug, PartialEq)]
pub struct ElementInfo {
    pub id: ElementId,
    pub widget: &'static str,
    pub kind: WidgetKind,
    pub key: Option<Key>,
    pub lifecycle: Lifecycle,
    pub depth: usize,
    pub parent: Option<ElementId>,
    pub children: Vec<ElementId>,
    pub slot: NodePath,
    pub output: Option<OutputHandle>,
    pub vnode: Option<VNode>,
    pub builds: u64,
}

impl ElementInfo {
    pub(crate) fn capture(id: ElementId, element: &Element) -> Self {
        Self {
            id,
            widget: element.widget.type_name(),
            kind: element.widget.kind(),
            key: element.widget.key(),
            lifecycle: element.lifecycle,
            depth: element.depth,
            parent: element.parent,
            children: element.children.clone(),
            slot: element.slot.clone(),
            output: element.output,
            vnode: element.last_vnode.clone(),
            builds: element.builds,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::widget::BuildResult;

    fn element() -> Element {
        Element::new(WidgetRef::composed("Leaf", |_| Ok(BuildResult::Empty)), None)
    }

    #[test]
    fn removed_ids_go_stale() {
        let mut arena = ElementArena::default();
        let first = arena.insert(element());
        assert!(arena.remove(first).is_some());
        let second = arena.insert(element());
        assert_eq!(first.index(), second.index());
        assert_ne!(first, second);
        assert!(arena.get(first).is_none());
        assert!(arena.get(second).is_some());
        assert!(arena.remove(first).is_none());
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn new_elements_start_unmounted() {
        let mut arena = ElementArena::default();
        let id = arena.insert(element());
        let info = ElementInfo::capture(id, arena.get(id).unwrap());
        assert_eq!(info.lifecycle, Lifecycle::Unmounted);
        assert_eq!(info.widget, "Leaf");
        assert!(info.output.is_none());
        assert_eq!(arena.ids(), vec![id]);
    }
}
