//! Patch instructions produced by the differ.

use std::fmt;
use std::rc::Rc;

use crate::vnode::{NodePath, Primitive, VNode};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PatchKind {
    Insert,
    Remove,
    Replace,
    UpdateAttributes,
    UpdateText,
    Reorder,
    NoOp,
}

impl PatchKind {
    /// Application phase; lower phases run first.
    pub fn phase(self) -> u8 {
        match self {
            PatchKind::Remove => 0,
            PatchKind::Replace => 1,
            PatchKind::UpdateAttributes | PatchKind::UpdateText => 2,
            PatchKind::Insert => 3,
            PatchKind::Reorder => 4,
            PatchKind::NoOp => 5,
        }
    }
}

/// Attribute changes for one node; carries only what changed.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AttributeDelta {
    pub set: Vec<(Rc<str>, Primitive)>,
    pub removed: Vec<Rc<str>>,
}

impl AttributeDelta {
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.removed.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum PatchOp {
    /// Insert the node so that it ends up at the last index of the path.
    Insert(VNode),
    Remove,
    Replace(VNode),
    UpdateAttributes(AttributeDelta),
    UpdateText(Rc<str>),
    /// Permute the children of the node at the path:
    /// `new_children[i] = old_children[order[i]]`.
    Reorder(Vec<usize>),
    NoOp,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Patch {
    pub path: NodePath,
    pub op: PatchOp,
}

impl Patch {
    pub fn new(path: NodePath, op: PatchOp) -> Self {
        Self { path, op }
    }

    pub fn kind(&self) -> PatchKind {
        match self.op {
            PatchOp::Insert(_) => PatchKind::Insert,
            PatchOp::Remove => PatchKind::Remove,
            PatchOp::Replace(_) => PatchKind::Replace,
            PatchOp::UpdateAttributes(_) => PatchKind::UpdateAttributes,
            PatchOp::UpdateText(_) => PatchKind::UpdateText,
            PatchOp::Reorder(_) => PatchKind::Reorder,
            PatchOp::NoOp => PatchKind::NoOp,
        }
    }

    /// Index inside the parent this patch targets; `None` for the root.
    pub fn target_index(&self) -> Option<usize> {
        self.path.last().copied()
    }

    pub fn content(&self) -> Option<&VNode> {
        match &self.op {
            PatchOp::Insert(node) | PatchOp::Replace(node) => Some(node),
            _ => None,
        }
    }

    /// Re-root the patch under `prefix`.
    pub fn prefixed(mut self, prefix: &[usize]) -> Self {
        if !prefix.is_empty() {
            let mut path = prefix.to_vec();
            path.extend_from_slice(&self.path);
            self.path = path;
        }
        self
    }
}

impl fmt::Display for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} at {:?}", self.kind(), self.path)
    }
}

/// Count patches of `kind`.
pub fn count_kind(patches: &[Patch], kind: PatchKind) -> usize {
    patches.iter().filter(|patch| patch.kind() == kind).count()
}

/// True when applying `patches` would change nothing.
pub fn is_noop(patches: &[Patch]) -> bool {
    patches.iter().all(|patch| patch.kind() == PatchKind::NoOp)
}
