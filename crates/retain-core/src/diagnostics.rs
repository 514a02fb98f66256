//! Warning channel for lifecycle violations.
//!
//! Violations never abort: the offending call becomes a no-op, a warning is
//! logged and a [`Diagnostic`] is queued for whoever drains the channel.

use std::fmt;
use std::time::Duration;

use crate::element::ElementId;
use crate::key::Key;

#[derive(Clone, Debug, PartialEq)]
pub enum Diagnostic {
    DoubleMount { element: ElementId },
    RebuildUnmounted { element: ElementId },
    ReentrantRebuild { element: ElementId },
    MarkDirtyUnmounted { element: ElementId },
    UnmountUnmounted { element: ElementId },
    UpdateUnmounted { element: ElementId },
    StateTypeMismatch { element: ElementId },
    DuplicateKey { parent: ElementId, key: Key },
    ProbableLeak { element: ElementId, widget: &'static str, age: Duration },
}

impl Diagnostic {
    pub fn element(&self) -> ElementId {
        match self {
            Diagnostic::DoubleMount { element }
            | Diagnostic::RebuildUnmounted { element }
            | Diagnostic::ReentrantRebuild { element }
            | Diagnostic::MarkDirtyUnmounted { element }
            | Diagnostic::UnmountUnmounted { element }
            | Diagnostic::UpdateUnmounted { element }
            | Diagnostic::StateTypeMismatch { element }
            | Diagnostic::ProbableLeak { element, .. } => *element,
            Diagnostic::DuplicateKey { parent, .. } => *parent,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::DoubleMount { element } => {
                write!(f, "element {element} is already mounted or was disposed")
            }
            Diagnostic::RebuildUnmounted { element } => {
                write!(f, "rebuild requested for unmounted element {element}")
            }
            Diagnostic::ReentrantRebuild { element } => {
                write!(f, "element {element} is already building; re-entrant rebuild rejected")
            }
            Diagnostic::MarkDirtyUnmounted { element } => {
                write!(f, "mark_dirty on unmounted element {element}")
            }
            Diagnostic::UnmountUnmounted { element } => {
                write!(f, "unmount of element {element} that is not mounted")
            }
            Diagnostic::UpdateUnmounted { element } => {
                write!(f, "state update for unmounted element {element} dropped")
            }
            Diagnostic::StateTypeMismatch { element } => {
                write!(f, "state update for element {element} targets a different state type")
            }
            Diagnostic::DuplicateKey { parent, key } => {
                write!(f, "duplicate child key {key} under element {parent}")
            }
            Diagnostic::ProbableLeak {
                element,
                widget,
                age,
            } => write!(
                f,
                "element {element} ({widget}) unmounted but still registered after {}ms",
                age.as_millis()
            ),
        }
    }
}
