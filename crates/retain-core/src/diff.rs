//! Structural diff between two VNode trees.
//!
//! The diff is a single top-down pass that never touches output. Patches are
//! collected per phase and returned in application order:
//! removals, replacements, attribute/text updates, insertions, reorders.
//!
//! Each phase addresses nodes in the coordinates that are valid when that
//! phase runs:
//! - removals use indices of the old tree and are ordered deepest first,
//!   highest index first, so earlier removals never shift later targets;
//! - replacements and updates use post-removal indices;
//! - insertions use the final index inside their own list, with ancestors
//!   addressed after their own insertions but before any reorder;
//! - reorders carry the full permutation of one child list and run deepest
//!   first, in the same coordinates as insertions.
//!
//! Children are matched by key when any child in either list carries one.
//! Unkeyed lists are matched by position only: identity of unkeyed children
//! is not preserved across mid-list insertions or removals.

use crate::collections::map::{HashMap, HashSet};
use crate::key::Key;
use crate::patch::{AttributeDelta, Patch, PatchOp};
use crate::vnode::{NodePath, VNode, VNodeKind};

/// Compute the patches that turn `old` into `new`.
pub fn diff(old: Option<&VNode>, new: Option<&VNode>) -> Vec<Patch> {
    let mut out = PatchBuckets::default();
    match (old, new) {
        (None, None) => {}
        (None, Some(new)) => out
            .insertions
            .push(Patch::new(Vec::new(), PatchOp::Insert(new.clone()))),
        (Some(_), None) => out.removals.push(Patch::new(Vec::new(), PatchOp::Remove)),
        (Some(old), Some(new)) => diff_node(old, new, &Coordinates::root(), &mut out),
    }
    out.into_ordered()
}

/// Shorthand for diffing two present trees.
pub fn diff_nodes(old: &VNode, new: &VNode) -> Vec<Patch> {
    diff(Some(old), Some(new))
}

#[derive(Default)]
struct PatchBuckets {
    removals: Vec<Patch>,
    replacements: Vec<Patch>,
    updates: Vec<Patch>,
    insertions: Vec<Patch>,
    reorders: Vec<Patch>,
}

impl PatchBuckets {
    fn into_ordered(mut self) -> Vec<Patch> {
        // Deepest first; within one parent, highest index first.
        self.removals
            .sort_by(|a, b| b.path.len().cmp(&a.path.len()).then_with(|| b.path.cmp(&a.path)));
        self.reorders
            .sort_by(|a, b| b.path.len().cmp(&a.path.len()));
        let mut ordered = self.removals;
        ordered.append(&mut self.replacements);
        ordered.append(&mut self.updates);
        ordered.append(&mut self.insertions);
        ordered.append(&mut self.reorders);
        ordered
    }
}

/// Path of one node in each phase's coordinate space.
struct Coordinates {
    old: NodePath,
    mid: NodePath,
    ins: NodePath,
}

impl Coordinates {
    fn root() -> Self {
        Self {
            old: Vec::new(),
            mid: Vec::new(),
            ins: Vec::new(),
        }
    }

    fn child(&self, old: usize, mid: usize, ins: usize) -> Self {
        Self {
            old: extend(&self.old, old),
            mid: extend(&self.mid, mid),
            ins: extend(&self.ins, ins),
        }
    }
}

fn extend(path: &[usize], index: usize) -> NodePath {
    let mut out = Vec::with_capacity(path.len() + 1);
    out.extend_from_slice(path);
    out.push(index);
    out
}

fn diff_node(old: &VNode, new: &VNode, at: &Coordinates, out: &mut PatchBuckets) {
    if old.ptr_eq(new) {
        return;
    }
    if !old.same_shape(new) {
        out.replacements
            .push(Patch::new(at.mid.clone(), PatchOp::Replace(new.clone())));
        return;
    }
    match (old.kind(), new.kind()) {
        (VNodeKind::Text { content: before }, VNodeKind::Text { content: after }) => {
            if before != after {
                out.updates
                    .push(Patch::new(at.mid.clone(), PatchOp::UpdateText(after.clone())));
            }
        }
        (VNodeKind::Element { .. }, VNodeKind::Element { .. }) => {
            let delta = attribute_delta(old, new);
            if !delta.is_empty() {
                out.updates
                    .push(Patch::new(at.mid.clone(), PatchOp::UpdateAttributes(delta)));
            }
            diff_children(old.children(), new.children(), at, out);
        }
        _ => diff_children(old.children(), new.children(), at, out),
    }
}

fn attribute_delta(old: &VNode, new: &VNode) -> AttributeDelta {
    let before = old.attributes();
    let after = new.attributes();
    let mut delta = AttributeDelta::default();
    for (name, value) in after {
        if before.get(name) != Some(value) {
            delta.set.push((name.clone(), value.clone()));
        }
    }
    for name in before.keys() {
        if !after.contains_key(name) {
            delta.removed.push(name.clone());
        }
    }
    delta
}

fn diff_children(old: &[VNode], new: &[VNode], at: &Coordinates, out: &mut PatchBuckets) {
    if old.is_empty() && new.is_empty() {
        return;
    }
    let keyed = old.iter().chain(new).any(|child| child.key().is_some());
    if keyed {
        diff_keyed_children(old, new, at, out);
    } else {
        diff_positional_children(old, new, at, out);
    }
}

fn diff_positional_children(
    old: &[VNode],
    new: &[VNode],
    at: &Coordinates,
    out: &mut PatchBuckets,
) {
    let common = old.len().min(new.len());
    for index in (common..old.len()).rev() {
        out.removals
            .push(Patch::new(extend(&at.old, index), PatchOp::Remove));
    }
    for (index, node) in new.iter().enumerate().skip(common) {
        out.insertions
            .push(Patch::new(extend(&at.ins, index), PatchOp::Insert(node.clone())));
    }
    for index in 0..common {
        diff_node(&old[index], &new[index], &at.child(index, index, index), out);
    }
}

/// Identity of a child inside one keyed list. Unkeyed children, and
/// children repeating a key already seen, fall back to their order among
/// such children.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum Ident {
    Key(Key),
    Slot(usize),
}

fn identities(children: &[VNode]) -> Vec<Ident> {
    let mut seen: HashSet<Key> = HashSet::new();
    let mut slot = 0;
    children
        .iter()
        .map(|child| match child.key() {
            Some(key) if seen.insert(key.clone()) => Ident::Key(key.clone()),
            duplicate => {
                if let Some(key) = duplicate {
                    log::warn!("duplicate child key {key}; matching it by position");
                }
                let ident = Ident::Slot(slot);
                slot += 1;
                ident
            }
        })
        .collect()
}

fn diff_keyed_children(old: &[VNode], new: &[VNode], at: &Coordinates, out: &mut PatchBuckets) {
    let old_ids = identities(old);
    let new_ids = identities(new);
    let old_index: HashMap<&Ident, usize> =
        old_ids.iter().enumerate().map(|(index, id)| (id, index)).collect();

    let mut used = vec![false; old.len()];
    let matched: Vec<Option<usize>> = new_ids
        .iter()
        .map(|id| match old_index.get(id) {
            Some(&index) if !used[index] => {
                used[index] = true;
                Some(index)
            }
            _ => None,
        })
        .collect();

    for index in (0..old.len()).rev() {
        if !used[index] {
            out.removals
                .push(Patch::new(extend(&at.old, index), PatchOp::Remove));
        }
    }

    // Rank of each survivor once removals have run.
    let mut rank = vec![usize::MAX; old.len()];
    let mut next_rank = 0;
    for (index, survived) in used.iter().enumerate() {
        if *survived {
            rank[index] = next_rank;
            next_rank += 1;
        }
    }

    // After insertions new nodes sit at their final index and survivors
    // fill the remaining slots in their old relative order.
    let survivor_slots: Vec<usize> = matched
        .iter()
        .enumerate()
        .filter_map(|(slot, old)| old.map(|_| slot))
        .collect();

    for (slot, node) in new.iter().enumerate() {
        if matched[slot].is_none() {
            out.insertions
                .push(Patch::new(extend(&at.ins, slot), PatchOp::Insert(node.clone())));
        }
    }

    let order: Vec<usize> = matched
        .iter()
        .enumerate()
        .map(|(slot, old)| match old {
            Some(index) => survivor_slots[rank[*index]],
            None => slot,
        })
        .collect();
    if order.iter().enumerate().any(|(slot, from)| slot != *from) {
        out.reorders
            .push(Patch::new(at.ins.clone(), PatchOp::Reorder(order)));
    }

    for (slot, old_match) in matched.iter().enumerate() {
        if let Some(index) = *old_match {
            let r = rank[index];
            diff_node(
                &old[index],
                &new[slot],
                &at.child(index, r, survivor_slots[r]),
                out,
            );
        }
    }
}

#[cfg(test)]
#[path = "tests/diff_tests.rs"]
mod tests;
