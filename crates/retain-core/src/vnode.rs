//! Immutable render descriptors produced by builds.
//!
//! A [`VNode`] is shared behind an `Rc`; cloning is cheap and a node is never
//! mutated once a build has returned it. The builder methods below use
//! copy-on-write, so they only ever touch nodes that nobody else holds yet.

use std::fmt;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::key::Key;

/// Handle to committed output owned by a renderer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OutputHandle(pub u64);

impl fmt::Display for OutputHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

/// Child-index path from the root of a diffed tree.
pub type NodePath = Vec<usize>;

/// Scalar value used for text content and attribute values.
#[derive(Clone, Debug, PartialEq)]
pub enum Primitive {
    Str(Rc<str>),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Primitive::Str(value) => f.write_str(value),
            Primitive::Int(value) => write!(f, "{value}"),
            Primitive::Float(value) => write!(f, "{value}"),
            Primitive::Bool(value) => write!(f, "{value}"),
        }
    }
}

impl From<&str> for Primitive {
    fn from(value: &str) -> Self {
        Primitive::Str(Rc::from(value))
    }
}

impl From<String> for Primitive {
    fn from(value: String) -> Self {
        Primitive::Str(Rc::from(value))
    }
}

impl From<Rc<str>> for Primitive {
    fn from(value: Rc<str>) -> Self {
        Primitive::Str(value)
    }
}

impl From<i64> for Primitive {
    fn from(value: i64) -> Self {
        Primitive::Int(value)
    }
}

impl From<i32> for Primitive {
    fn from(value: i32) -> Self {
        Primitive::Int(value as i64)
    }
}

impl From<usize> for Primitive {
    fn from(value: usize) -> Self {
        Primitive::Int(value as i64)
    }
}

impl From<f64> for Primitive {
    fn from(value: f64) -> Self {
        Primitive::Float(value)
    }
}

impl From<bool> for Primitive {
    fn from(value: bool) -> Self {
        Primitive::Bool(value)
    }
}

pub type Attributes = IndexMap<Rc<str>, Primitive>;

#[derive(Clone, Debug, PartialEq)]
pub enum VNodeKind {
    Element { tag: Rc<str> },
    Text { content: Rc<str> },
    Fragment,
}

impl VNodeKind {
    pub fn name(&self) -> &'static str {
        match self {
            VNodeKind::Element { .. } => "element",
            VNodeKind::Text { .. } => "text",
            VNodeKind::Fragment => "fragment",
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
struct VNodeData {
    kind: VNodeKind,
    key: Option<Key>,
    attributes: Attributes,
    children: Vec<VNode>,
}

#[derive(Clone)]
pub struct VNode {
    data: Rc<VNodeData>,
}

/// Tag used for the development error indicator.
pub const ERROR_INDICATOR_TAG: &str = "retain-error";

impl VNode {
    fn from_kind(kind: VNodeKind) -> Self {
        Self {
            data: Rc::new(VNodeData {
                kind,
                key: None,
                attributes: Attributes::new(),
                children: Vec::new(),
            }),
        }
    }

    pub fn element(tag: impl Into<Rc<str>>) -> Self {
        Self::from_kind(VNodeKind::Element { tag: tag.into() })
    }

    pub fn text(content: impl Into<Rc<str>>) -> Self {
        Self::from_kind(VNodeKind::Text {
            content: content.into(),
        })
    }

    pub fn fragment() -> Self {
        Self::from_kind(VNodeKind::Fragment)
    }

    /// Visible placeholder rendered where a build failed.
    pub fn error_indicator(message: &str) -> Self {
        Self::element(ERROR_INDICATOR_TAG).attr("message", message)
    }

    pub fn kind(&self) -> &VNodeKind {
        &self.data.kind
    }

    pub fn tag(&self) -> Option<&str> {
        match &self.data.kind {
            VNodeKind::Element { tag } => Some(tag),
            _ => None,
        }
    }

    pub fn text_content(&self) -> Option<&str> {
        match &self.data.kind {
            VNodeKind::Text { content } => Some(content),
            _ => None,
        }
    }

    pub fn key(&self) -> Option<&Key> {
        self.data.key.as_ref()
    }

    pub fn attributes(&self) -> &Attributes {
        &self.data.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&Primitive> {
        self.data.attributes.get(name)
    }

    pub fn children(&self) -> &[VNode] {
        &self.data.children
    }

    pub fn is_error_indicator(&self) -> bool {
        self.tag() == Some(ERROR_INDICATOR_TAG)
    }

    /// Same kind and, for elements, same tag.
    pub fn same_shape(&self, other: &VNode) -> bool {
        match (&self.data.kind, &other.data.kind) {
            (VNodeKind::Element { tag: a }, VNodeKind::Element { tag: b }) => a == b,
            (VNodeKind::Text { .. }, VNodeKind::Text { .. }) => true,
            (VNodeKind::Fragment, VNodeKind::Fragment) => true,
            _ => false,
        }
    }

    pub fn ptr_eq(&self, other: &VNode) -> bool {
        Rc::ptr_eq(&self.data, &other.data)
    }

    pub fn with_key(mut self, key: impl Into<Key>) -> Self {
        Rc::make_mut(&mut self.data).key = Some(key.into());
        self
    }

    /// Set the key only if the node does not carry one already.
    pub(crate) fn keyed_by_default(self, key: Option<&Key>) -> Self {
        match key {
            Some(key) if self.data.key.is_none() => self.with_key(key.clone()),
            _ => self,
        }
    }

    pub fn attr(mut self, name: impl Into<Rc<str>>, value: impl Into<Primitive>) -> Self {
        Rc::make_mut(&mut self.data)
            .attributes
            .insert(name.into(), value.into());
        self
    }

    pub fn child(mut self, child: VNode) -> Self {
        Rc::make_mut(&mut self.data).children.push(child);
        self
    }

    pub fn children_from(mut self, children: impl IntoIterator<Item = VNode>) -> Self {
        Rc::make_mut(&mut self.data).children.extend(children);
        self
    }

    /// Node at `path`, if it resolves.
    pub fn at(&self, path: &[usize]) -> Option<&VNode> {
        let mut node = self;
        for index in path {
            node = node.data.children.get(*index)?;
        }
        Some(node)
    }

    /// New tree equal to `self` with the node at `path` swapped for
    /// `replacement`. Siblings are shared with the original.
    pub fn replaced_at(&self, path: &[usize], replacement: VNode) -> Option<VNode> {
        let Some((first, rest)) = path.split_first() else {
            return Some(replacement);
        };
        let child = self.data.children.get(*first)?;
        let updated = child.replaced_at(rest, replacement)?;
        let mut data = (*self.data).clone();
        data.children[*first] = updated;
        Some(VNode {
            data: Rc::new(data),
        })
    }

    /// Number of nodes in this subtree, including `self`.
    pub fn node_count(&self) -> usize {
        1 + self
            .data
            .children
            .iter()
            .map(VNode::node_count)
            .sum::<usize>()
    }
}

impl PartialEq for VNode {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other) || self.data == other.data
    }
}

impl fmt::Debug for VNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug = match &self.data.kind {
            VNodeKind::Element { tag } => {
                let mut d = f.debug_struct("Element");
                d.field("tag", tag);
                d
            }
            VNodeKind::Text { content } => {
                let mut d = f.debug_struct("Text");
                d.field("content", content);
                d
            }
            VNodeKind::Fragment => f.debug_struct("Fragment"),
        };
        if let Some(key) = &self.data.key {
            debug.field("key", key);
        }
        if !self.data.attributes.is_empty() {
            debug.field("attributes", &self.data.attributes);
        }
        if !self.data.children.is_empty() {
            debug.field("children", &self.data.children);
        }
        debug.finish()
    }
}
