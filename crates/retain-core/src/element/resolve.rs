//! Resolution of a build result into a pure VNode.
//!
//! Child widgets met during resolution are bound to child elements: keyed
//! widgets match an existing child with the same key and type, unkeyed ones
//! match the next unkeyed child in order when the type agrees. Matched
//! children are rebuilt only if their configuration changed or they are
//! dirty; everything left unmatched is unmounted once resolution succeeds.

use std::mem;

use super::{ElementId, Lifecycle};
use crate::collections::map::{HashMap, HashSet};
use crate::diagnostics::Diagnostic;
use crate::error::{BuildError, RebuildError};
use crate::key::Key;
use crate::runtime::RuntimeInner;
use crate::vnode::{NodePath, Primitive, VNode};
use crate::widget::{BuildResult, HostKind, HostNode, WidgetRef};

impl RuntimeInner {
    pub(crate) fn resolve_result(&self, parent: ElementId, result: BuildResult) -> Result<VNode, BuildError> {
        let mut reconciler = ChildReconciler::new(self, parent);
        let mut path = NodePath::new();
        match reconciler.resolve(result, &mut path) {
            Ok(vnode) => {
                reconciler.commit();
                Ok(vnode.unwrap_or_else(VNode::fragment))
            }
            Err(err) => {
                reconciler.abort();
                Err(err)
            }
        }
    }
}

struct ChildReconciler<'r> {
    runtime: &'r RuntimeInner,
    parent: ElementId,
    old_children: Vec<ElementId>,
    old_by_key: HashMap<Key, ElementId>,
    old_unkeyed: Vec<ElementId>,
    unkeyed_cursor: usize,
    claimed: HashSet<ElementId>,
    children: Vec<ElementId>,
    by_key: HashMap<Key, ElementId>,
    created: Vec<ElementId>,
    /// Reused children rebuilt during this pass, with their previous VNode.
    refreshed: Vec<(ElementId, Option<VNode>)>,
    /// Reused children handed a new configuration, with the one they had.
    reconfigured: Vec<(ElementId, WidgetRef)>,
    replaced: Vec<ElementId>,
}

impl<'r> ChildReconciler<'r> {
    fn new(runtime: &'r RuntimeInner, parent: ElementId) -> Self {
        let (old_children, old_by_key) = runtime
            .with_element(parent, |el| (el.children.clone(), el.child_by_key.clone()))
            .unwrap_or_default();
        let keyed: HashSet<ElementId> = old_by_key.values().copied().collect();
        let old_unkeyed = old_children
            .iter()
            .copied()
            .filter(|child| !keyed.contains(child))
            .collect();
        Self {
            runtime,
            parent,
            old_children,
            old_by_key,
            old_unkeyed,
            unkeyed_cursor: 0,
            claimed: HashSet::default(),
            children: Vec::new(),
            by_key: HashMap::default(),
            created: Vec::new(),
            refreshed: Vec::new(),
            reconfigured: Vec::new(),
            replaced: Vec::new(),
        }
    }

    fn resolve(&mut self, result: BuildResult, path: &mut NodePath) -> Result<Option<VNode>, BuildError> {
        match result {
            BuildResult::Empty => Ok(None),
            BuildResult::VNode(vnode) => Ok(Some(vnode)),
            BuildResult::Primitive(Primitive::Str(text)) => Ok(Some(VNode::text(text))),
            BuildResult::Primitive(value) => Ok(Some(VNode::text(value.to_string()))),
            BuildResult::Widget(widget) => self.resolve_widget(widget, path.clone()).map(Some),
            BuildResult::Host(host) => self.resolve_host(host, path).map(Some),
        }
    }

    fn resolve_host(&mut self, host: HostNode, path: &mut NodePath) -> Result<VNode, BuildError> {
        let HostNode {
            kind,
            key,
            attributes,
            children,
        } = host;
        let mut node = match kind {
            HostKind::Element(tag) => VNode::element(tag),
            HostKind::Fragment => VNode::fragment(),
        };
        if let Some(key) = key {
            node = node.with_key(key);
        }
        for (name, value) in attributes {
            node = node.attr(name, value);
        }
        let mut index = 0;
        for child in children {
            path.push(index);
            let resolved = self.resolve(child, path);
            path.pop();
            if let Some(child) = resolved? {
                node = node.child(child);
                index += 1;
            }
        }
        Ok(node)
    }

    fn resolve_widget(&mut self, widget: WidgetRef, slot: NodePath) -> Result<VNode, BuildError> {
        let key = widget.key();
        if let Some(key) = &key {
            if self.by_key.contains_key(key) {
                self.runtime.warn(Diagnostic::DuplicateKey {
                    parent: self.parent,
                    key: key.clone(),
                });
                return self.mount_new(widget, None, slot);
            }
        }

        let candidate = match &key {
            Some(key) => self
                .old_by_key
                .get(key)
                .copied()
                .filter(|child| !self.claimed.contains(child)),
            None => {
                let candidate = self.old_unkeyed.get(self.unkeyed_cursor).copied();
                self.unkeyed_cursor += 1;
                candidate
            }
        };

        if let Some(candidate) = candidate {
            self.claimed.insert(candidate);
            let reusable = self
                .runtime
                .with_element(candidate, |el| el.widget.same_type(&widget))
                .unwrap_or(false);
            if reusable {
                let vnode = self.reuse(candidate, widget, slot)?;
                self.adopt(candidate, key);
                return Ok(vnode);
            }
            // Same position or key, different type: the old child goes first.
            self.runtime.unmount_subtree(candidate);
            self.replaced.push(candidate);
        }
        self.mount_new(widget, key, slot)
    }

    fn adopt(&mut self, child: ElementId, key: Option<Key>) {
        self.children.push(child);
        if let Some(key) = key {
            self.by_key.insert(key, child);
        }
    }

    fn mount_new(&mut self, widget: WidgetRef, key: Option<Key>, slot: NodePath) -> Result<VNode, BuildError> {
        let child = self.runtime.create_element(widget, Some(self.parent));
        self.created.push(child);
        match self.runtime.mount_element(child, Some(self.parent), slot)? {
            Some(vnode) => {
                self.adopt(child, key);
                Ok(vnode)
            }
            None => Err(BuildError::new(format!("child {child} could not be mounted"))),
        }
    }

    fn reuse(&mut self, child: ElementId, widget: WidgetRef, slot: NodePath) -> Result<VNode, BuildError> {
        let Some((old_widget, lifecycle, previous)) = self.runtime.with_element_mut(child, |el| {
            el.slot = slot;
            (el.widget.clone(), el.lifecycle, el.last_vnode.clone())
        }) else {
            return Err(BuildError::new(format!("child {child} disappeared")));
        };

        let changed = !old_widget.same_config(&widget);
        if changed {
            self.runtime
                .with_element_mut(child, |el| el.widget = widget.clone());
            self.runtime.with_state(child, |state| {
                state.widget_updated(old_widget.inner(), widget.inner());
            });
            self.reconfigured.push((child, old_widget));
        }

        let needs_build = changed || lifecycle == Lifecycle::Dirty || previous.is_none();
        match (needs_build, lifecycle, previous) {
            (_, Lifecycle::Building, Some(previous)) => Ok(previous),
            (false, _, Some(previous)) => Ok(previous),
            (_, _, previous) => match self.runtime.rebuild_nested(child) {
                Ok(vnode) => {
                    self.refreshed.push((child, previous));
                    Ok(vnode)
                }
                // A child that already has output keeps it; the failure
                // stays contained to that child.
                Err(source) => match previous {
                    Some(previous) => {
                        self.runtime
                            .record_failure(RebuildError::Build { element: child, source });
                        Ok(previous)
                    }
                    None => Err(source),
                },
            },
        }
    }

    fn commit(self) {
        for child in &self.old_children {
            if !self.claimed.contains(child) {
                self.runtime.unmount_subtree(*child);
            }
        }
        let children = self.children;
        let by_key = self.by_key;
        self.runtime.with_element_mut(self.parent, |el| {
            el.children = children;
            el.child_by_key = by_key;
        });
    }

    /// Undo what a failed resolution changed so the parent still matches
    /// its committed output.
    fn abort(mut self) {
        for child in mem::take(&mut self.created) {
            self.runtime.unmount_subtree(child);
        }
        // The rolled back configuration reaches the state as one more
        // update, so the state never keeps a config its output lacks.
        for (child, old_widget) in mem::take(&mut self.reconfigured).into_iter().rev() {
            let current = self.runtime.with_element_mut(child, |el| {
                mem::replace(&mut el.widget, old_widget.clone())
            });
            if let Some(current) = current {
                self.runtime.with_state(child, |state| {
                    state.widget_updated(current.inner(), old_widget.inner());
                });
            }
        }
        for (child, previous) in mem::take(&mut self.refreshed) {
            let restored = self
                .runtime
                .with_element_mut(child, |el| el.last_vnode = previous)
                .is_some();
            if restored {
                self.runtime.mark_dirty(child);
            }
        }
        let replaced = self.replaced;
        self.runtime.with_element_mut(self.parent, |el| {
            el.children.retain(|child| !replaced.contains(child));
            el.child_by_key.retain(|_, child| !replaced.contains(child));
        });
    }
}
