use std::fmt;
use std::rc::Rc;

use crate::element::ElementId;
use crate::vnode::OutputHandle;

/// Missing or invalid collaborator detected while constructing the runtime
/// or a widget. Always fatal for the thing being constructed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    MissingRenderer,
    MissingBuild { widget: &'static str },
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::MissingRenderer => write!(f, "runtime requires a renderer"),
            ConfigError::MissingBuild { widget } => {
                write!(f, "widget {widget} has no build capability")
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Failure raised while resolving a widget to a VNode.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildError {
    message: Rc<str>,
    widget: Option<&'static str>,
}

impl BuildError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: Rc::from(message.into()),
            widget: None,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn widget(&self) -> Option<&'static str> {
        self.widget
    }

    pub(crate) fn in_widget(mut self, widget: &'static str) -> Self {
        if self.widget.is_none() {
            self.widget = Some(widget);
        }
        self
    }
}

impl fmt::Display for BuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.widget {
            Some(widget) => write!(f, "build of {widget} failed: {}", self.message),
            None => write!(f, "build failed: {}", self.message),
        }
    }
}

impl std::error::Error for BuildError {}

/// Renderer refused to commit or patch output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    UnknownHandle { handle: OutputHandle },
    InvalidPath { handle: OutputHandle, path: Vec<usize> },
    KindMismatch { handle: OutputHandle, expected: &'static str },
    Rejected { reason: String },
}

impl fmt::Display for RenderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RenderError::UnknownHandle { handle } => write!(f, "output {handle} missing"),
            RenderError::InvalidPath { handle, path } => {
                write!(f, "path {path:?} does not resolve under output {handle}")
            }
            RenderError::KindMismatch { handle, expected } => {
                write!(f, "output {handle} type mismatch; expected {expected}")
            }
            RenderError::Rejected { reason } => write!(f, "renderer rejected patch: {reason}"),
        }
    }
}

impl std::error::Error for RenderError {}

/// What a failed `rebuild()` reports to its caller.
#[derive(Debug, Clone, PartialEq)]
pub enum RebuildError {
    Build { element: ElementId, source: BuildError },
    Patch { element: ElementId, source: RenderError },
}

impl RebuildError {
    pub fn element(&self) -> ElementId {
        match self {
            RebuildError::Build { element, .. } | RebuildError::Patch { element, .. } => *element,
        }
    }

    pub fn is_patch_failure(&self) -> bool {
        matches!(self, RebuildError::Patch { .. })
    }
}

impl fmt::Display for RebuildError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RebuildError::Build { element, source } => write!(f, "element {element}: {source}"),
            RebuildError::Patch { element, source } => write!(f, "element {element}: {source}"),
        }
    }
}

impl std::error::Error for RebuildError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RebuildError::Build { source, .. } => Some(source),
            RebuildError::Patch { source, .. } => Some(source),
        }
    }
}
