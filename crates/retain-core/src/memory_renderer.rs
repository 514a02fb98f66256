//! In-memory renderer used by tests, benchmarks and headless hosts.

use std::any::Any;
use std::fmt::Write as _;
use std::rc::Rc;

use crate::error::RenderError;
use crate::patch::{AttributeDelta, Patch, PatchOp};
use crate::renderer::Renderer;
use crate::vnode::{Attributes, OutputHandle, VNode, VNodeKind};

#[derive(Clone, Debug, PartialEq)]
enum OutputKind {
    Container,
    Element(Rc<str>),
    Text(Rc<str>),
    Fragment,
}

#[derive(Clone, Debug)]
struct OutputNode {
    kind: OutputKind,
    attributes: Attributes,
    children: Vec<OutputHandle>,
    parent: Option<OutputHandle>,
}

/// Output tree held in memory; handles index into a slot vector that is
/// never compacted, so handle allocation is deterministic.
#[derive(Debug)]
pub struct MemoryRenderer {
    nodes: Vec<Option<OutputNode>>,
    container: OutputHandle,
    /// Patches still to let through, and the reason the next one fails.
    fail_at: Option<(usize, String)>,
    applied: usize,
}

impl MemoryRenderer {
    pub fn new() -> Self {
        let mut renderer = Self {
            nodes: Vec::new(),
            container: OutputHandle(0),
            fail_at: None,
            applied: 0,
        };
        renderer.container = renderer.allocate(OutputNode {
            kind: OutputKind::Container,
            attributes: Attributes::new(),
            children: Vec::new(),
            parent: None,
        });
        renderer
    }

    /// Make the next `apply_patch` call fail with `reason`.
    pub fn fail_next_patch(&mut self, reason: impl Into<String>) {
        self.fail_patch_after(0, reason);
    }

    /// Let `succeeding` more `apply_patch` calls through, then fail one with
    /// `reason`. Used to break a patch list partway.
    pub fn fail_patch_after(&mut self, succeeding: usize, reason: impl Into<String>) {
        self.fail_at = Some((succeeding, reason.into()));
    }

    /// Number of patches applied so far.
    pub fn applied_patches(&self) -> usize {
        self.applied
    }

    /// Number of live output nodes, excluding the container.
    pub fn live_nodes(&self) -> usize {
        self.nodes.iter().flatten().count() - 1
    }

    pub fn contains(&self, handle: OutputHandle) -> bool {
        self.node(handle).is_ok()
    }

    pub fn root_container(&self) -> OutputHandle {
        self.container
    }

    /// Markup for everything committed into the container.
    pub fn markup(&self) -> String {
        self.markup_of(self.container)
    }

    /// Markup for the subtree at `handle`; empty if the handle is dead.
    pub fn markup_of(&self, handle: OutputHandle) -> String {
        let mut out = String::new();
        self.write_markup(handle, &mut out);
        out
    }

    pub fn text_of(&self, handle: OutputHandle) -> Option<&str> {
        match &self.node(handle).ok()?.kind {
            OutputKind::Text(text) => Some(text),
            _ => None,
        }
    }

    fn write_markup(&self, handle: OutputHandle, out: &mut String) {
        let Ok(node) = self.node(handle) else {
            return;
        };
        match &node.kind {
            OutputKind::Text(text) => out.push_str(&escape(text)),
            OutputKind::Element(tag) => {
                let _ = write!(out, "<{tag}");
                for (name, value) in &node.attributes {
                    let _ = write!(out, " {name}=\"{}\"", escape(&value.to_string()));
                }
                out.push('>');
                for child in &node.children {
                    self.write_markup(*child, out);
                }
                let _ = write!(out, "</{tag}>");
            }
            OutputKind::Container | OutputKind::Fragment => {
                for child in &node.children {
                    self.write_markup(*child, out);
                }
            }
        }
    }

    fn allocate(&mut self, node: OutputNode) -> OutputHandle {
        let handle = OutputHandle(self.nodes.len() as u64);
        self.nodes.push(Some(node));
        handle
    }

    fn node(&self, handle: OutputHandle) -> Result<&OutputNode, RenderError> {
        self.nodes
            .get(handle.0 as usize)
            .and_then(Option::as_ref)
            .ok_or(RenderError::UnknownHandle { handle })
    }

    fn node_mut(&mut self, handle: OutputHandle) -> Result<&mut OutputNode, RenderError> {
        self.nodes
            .get_mut(handle.0 as usize)
            .and_then(Option::as_mut)
            .ok_or(RenderError::UnknownHandle { handle })
    }

    fn build(&mut self, vnode: &VNode, parent: OutputHandle) -> OutputHandle {
        let kind = match vnode.kind() {
            VNodeKind::Element { tag } => OutputKind::Element(tag.clone()),
            VNodeKind::Text { content } => OutputKind::Text(content.clone()),
            VNodeKind::Fragment => OutputKind::Fragment,
        };
        let handle = self.allocate(OutputNode {
            kind,
            attributes: vnode.attributes().clone(),
            children: Vec::with_capacity(vnode.children().len()),
            parent: Some(parent),
        });
        let children: Vec<OutputHandle> = vnode
            .children()
            .iter()
            .map(|child| self.build(child, handle))
            .collect();
        if let Some(Some(node)) = self.nodes.get_mut(handle.0 as usize) {
            node.children = children;
        }
        handle
    }

    fn resolve(&self, handle: OutputHandle, path: &[usize]) -> Result<OutputHandle, RenderError> {
        let mut current = handle;
        for index in path {
            current = *self
                .node(current)?
                .children
                .get(*index)
                .ok_or_else(|| RenderError::InvalidPath {
                    handle,
                    path: path.to_vec(),
                })?;
        }
        Ok(current)
    }

    fn free(&mut self, handle: OutputHandle) {
        let Some(node) = self.nodes.get_mut(handle.0 as usize).and_then(Option::take) else {
            return;
        };
        for child in node.children {
            self.free(child);
        }
    }

    fn insert(
        &mut self,
        handle: OutputHandle,
        path: &[usize],
        vnode: &VNode,
    ) -> Result<(), RenderError> {
        let Some((index, parent_path)) = path.split_last() else {
            return Err(RenderError::InvalidPath {
                handle,
                path: Vec::new(),
            });
        };
        let parent = self.resolve(handle, parent_path)?;
        if *index > self.node(parent)?.children.len() {
            return Err(RenderError::InvalidPath {
                handle,
                path: path.to_vec(),
            });
        }
        let child = self.build(vnode, parent);
        self.node_mut(parent)?.children.insert(*index, child);
        Ok(())
    }

    fn replace(
        &mut self,
        handle: OutputHandle,
        path: &[usize],
        vnode: &VNode,
    ) -> Result<OutputHandle, RenderError> {
        let target = self.resolve(handle, path)?;
        let parent = self.node(target)?.parent.ok_or(RenderError::Rejected {
            reason: format!("output {target} has no parent to replace it in"),
        })?;
        let replacement = self.build(vnode, parent);
        let siblings = &mut self.node_mut(parent)?.children;
        if let Some(slot) = siblings.iter_mut().find(|slot| **slot == target) {
            *slot = replacement;
        }
        self.free(target);
        Ok(if path.is_empty() { replacement } else { handle })
    }

    fn update_attributes(
        &mut self,
        target: OutputHandle,
        delta: &AttributeDelta,
    ) -> Result<(), RenderError> {
        let node = self.node_mut(target)?;
        if !matches!(node.kind, OutputKind::Element(_)) {
            return Err(RenderError::KindMismatch {
                handle: target,
                expected: "element",
            });
        }
        for name in &delta.removed {
            node.attributes.shift_remove(name);
        }
        for (name, value) in &delta.set {
            node.attributes.insert(name.clone(), value.clone());
        }
        Ok(())
    }

    fn update_text(&mut self, target: OutputHandle, text: &Rc<str>) -> Result<(), RenderError> {
        let node = self.node_mut(target)?;
        match &mut node.kind {
            OutputKind::Text(current) => {
                *current = text.clone();
                Ok(())
            }
            _ => Err(RenderError::KindMismatch {
                handle: target,
                expected: "text",
            }),
        }
    }

    fn reorder(&mut self, target: OutputHandle, order: &[usize]) -> Result<(), RenderError> {
        let node = self.node_mut(target)?;
        let len = node.children.len();
        let mut seen = vec![false; len];
        let valid = order.len() == len
            && order
                .iter()
                .all(|&from| from < len && !std::mem::replace(&mut seen[from], true));
        if !valid {
            return Err(RenderError::Rejected {
                reason: format!("order {order:?} is not a permutation of {len} children"),
            });
        }
        let previous = node.children.clone();
        node.children = order.iter().map(|&from| previous[from]).collect();
        Ok(())
    }
}

impl Default for MemoryRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer for MemoryRenderer {
    fn container(&mut self) -> OutputHandle {
        self.container
    }

    fn commit(&mut self, vnode: &VNode, container: OutputHandle) -> Result<OutputHandle, RenderError> {
        self.node(container)?;
        let handle = self.build(vnode, container);
        self.node_mut(container)?.children.push(handle);
        Ok(handle)
    }

    fn apply_patch(&mut self, handle: OutputHandle, patch: &Patch) -> Result<OutputHandle, RenderError> {
        match self.fail_at.take() {
            Some((0, reason)) => return Err(RenderError::Rejected { reason }),
            Some((remaining, reason)) => self.fail_at = Some((remaining - 1, reason)),
            None => {}
        }
        let result = match &patch.op {
            PatchOp::Insert(node) => self.insert(handle, &patch.path, node).map(|_| handle),
            PatchOp::Remove => {
                let target = self.resolve(handle, &patch.path)?;
                self.release(target);
                Ok(handle)
            }
            PatchOp::Replace(node) => self.replace(handle, &patch.path, node),
            PatchOp::UpdateAttributes(delta) => {
                let target = self.resolve(handle, &patch.path)?;
                self.update_attributes(target, delta).map(|_| handle)
            }
            PatchOp::UpdateText(text) => {
                let target = self.resolve(handle, &patch.path)?;
                self.update_text(target, text).map(|_| handle)
            }
            PatchOp::Reorder(order) => {
                let target = self.resolve(handle, &patch.path)?;
                self.reorder(target, order).map(|_| handle)
            }
            PatchOp::NoOp => Ok(handle),
        };
        if result.is_ok() {
            self.applied += 1;
        }
        result
    }

    fn release(&mut self, handle: OutputHandle) {
        let parent = self.node(handle).ok().and_then(|node| node.parent);
        if let Some(parent) = parent {
            if let Ok(node) = self.node_mut(parent) {
                node.children.retain(|child| *child != handle);
            }
        }
        self.free(handle);
    }

    fn child(&self, handle: OutputHandle, index: usize) -> Option<OutputHandle> {
        self.node(handle).ok()?.children.get(index).copied()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vnode::Primitive;

    #[test]
    fn commit_serializes_markup() {
        let mut renderer = MemoryRenderer::new();
        let container = renderer.container();
        let tree = VNode::element("p")
            .attr("class", "note")
            .child(VNode::text("a < b"))
            .child(VNode::fragment().child(VNode::text("!")));
        renderer.commit(&tree, container).expect("commit");
        assert_eq!(renderer.markup(), "<p class=\"note\">a &lt; b!</p>");
        assert_eq!(renderer.live_nodes(), 4);
    }

    #[test]
    fn release_detaches_and_frees_subtree() {
        let mut renderer = MemoryRenderer::new();
        let container = renderer.container();
        let handle = renderer
            .commit(&VNode::element("div").child(VNode::text("x")), container)
            .expect("commit");
        renderer.release(handle);
        assert_eq!(renderer.markup(), "");
        assert_eq!(renderer.live_nodes(), 0);
        assert!(!renderer.contains(handle));
    }

    #[test]
    fn root_replace_swaps_handle_in_place() {
        let mut renderer = MemoryRenderer::new();
        let container = renderer.container();
        let first = renderer.commit(&VNode::text("a"), container).expect("commit");
        let second = renderer.commit(&VNode::text("b"), container).expect("commit");
        let replaced = renderer
            .apply_patch(
                first,
                &Patch::new(Vec::new(), PatchOp::Replace(VNode::element("hr"))),
            )
            .expect("replace");
        assert_ne!(replaced, first);
        assert_eq!(renderer.markup(), "<hr></hr>b");
        assert_eq!(renderer.text_of(second), Some("b"));
    }

    #[test]
    fn type_mismatch_is_reported() {
        let mut renderer = MemoryRenderer::new();
        let container = renderer.container();
        let handle = renderer.commit(&VNode::element("div"), container).expect("commit");
        let err = renderer
            .apply_patch(handle, &Patch::new(Vec::new(), PatchOp::UpdateText(Rc::from("x"))))
            .unwrap_err();
        assert!(matches!(err, RenderError::KindMismatch { .. }));
        let delta = AttributeDelta {
            set: vec![(Rc::from("id"), Primitive::from(1))],
            removed: Vec::new(),
        };
        renderer
            .apply_patch(handle, &Patch::new(Vec::new(), PatchOp::UpdateAttributes(delta)))
            .expect("attributes apply to elements");
        assert_eq!(renderer.markup(), "<div id=\"1\"></div>");
    }

    #[test]
    fn invalid_reorder_is_rejected() {
        let mut renderer = MemoryRenderer::new();
        let container = renderer.container();
        let handle = renderer
            .commit(
                &VNode::element("ul").child(VNode::text("a")).child(VNode::text("b")),
                container,
            )
            .expect("commit");
        let err = renderer
            .apply_patch(handle, &Patch::new(Vec::new(), PatchOp::Reorder(vec![0, 0])))
            .unwrap_err();
        assert!(matches!(err, RenderError::Rejected { .. }));
        renderer
            .apply_patch(handle, &Patch::new(Vec::new(), PatchOp::Reorder(vec![1, 0])))
            .expect("valid permutation");
        assert_eq!(renderer.markup(), "<ul>ba</ul>");
    }

    #[test]
    fn injected_failure_affects_one_patch() {
        let mut renderer = MemoryRenderer::new();
        let container = renderer.container();
        let handle = renderer.commit(&VNode::text("a"), container).expect("commit");
        renderer.fail_next_patch("offline");
        let patch = Patch::new(Vec::new(), PatchOp::UpdateText(Rc::from("b")));
        assert!(renderer.apply_patch(handle, &patch).is_err());
        renderer.apply_patch(handle, &patch).expect("second attempt applies");
        assert_eq!(renderer.markup(), "b");
        assert_eq!(renderer.applied_patches(), 1);
    }

    #[test]
    fn injected_failure_can_land_mid_list() {
        let mut renderer = MemoryRenderer::new();
        let container = renderer.container();
        let handle = renderer
            .commit(&VNode::element("ul").child(VNode::text("a")), container)
            .expect("commit");
        renderer.fail_patch_after(1, "offline");
        let insert = |index: usize, text: &str| {
            Patch::new(vec![index], PatchOp::Insert(VNode::text(text)))
        };
        renderer.apply_patch(handle, &insert(1, "b")).expect("first patch applies");
        assert!(renderer.apply_patch(handle, &insert(2, "c")).is_err());
        renderer.apply_patch(handle, &insert(2, "c")).expect("failure is spent");
        assert_eq!(renderer.markup(), "<ul>abc</ul>");
        assert_eq!(renderer.applied_patches(), 2);
    }
}
