//! Human-readable introspection of widgets, VNodes and element trees.

use std::fmt::Write as _;

use crate::vnode::{VNode, VNodeKind};
use crate::widget::WidgetRef;

/// One node of a debug dump.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct DebugInfo {
    pub label: String,
    pub properties: Vec<(String, String)>,
    pub children: Vec<DebugInfo>,
}

impl DebugInfo {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            ..Self::default()
        }
    }

    pub fn property(mut self, name: &str, value: impl ToString) -> Self {
        self.properties.push((name.to_string(), value.to_string()));
        self
    }

    pub fn child(mut self, child: DebugInfo) -> Self {
        self.children.push(child);
        self
    }

    /// Indented, one line per node.
    pub fn render(&self) -> String {
        let mut output = String::new();
        self.render_into(&mut output, 0);
        output
    }

    fn render_into(&self, output: &mut String, depth: usize) {
        let indent = "  ".repeat(depth);
        let _ = write!(output, "{indent}{}", self.label);
        for (name, value) in &self.properties {
            let _ = write!(output, " {name}={value}");
        }
        output.push('\n');
        for child in &self.children {
            child.render_into(output, depth + 1);
        }
    }
}

pub trait Describe {
    fn describe(&self) -> DebugInfo;
}

impl Describe for VNode {
    fn describe(&self) -> DebugInfo {
        let mut info = match self.kind() {
            VNodeKind::Element { tag } => DebugInfo::new(format!("<{tag}>")),
            VNodeKind::Text { content } => DebugInfo::new(format!("{content:?}")),
            VNodeKind::Fragment => DebugInfo::new("<>"),
        };
        if let Some(key) = self.key() {
            info = info.property("key", key);
        }
        for (name, value) in self.attributes() {
            info = info.property(name, value);
        }
        self.children()
            .iter()
            .fold(info, |info, child| info.child(child.describe()))
    }
}

impl Describe for WidgetRef {
    fn describe(&self) -> DebugInfo {
        let info = DebugInfo::new(self.type_name()).property("kind", format!("{:?}", self.kind()));
        match self.key() {
            Some(key) => info.property("key", key),
            None => info,
        }
    }
}
