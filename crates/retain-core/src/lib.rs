#![doc = r"Retained-mode UI reconciliation core: widgets, elements, VNode diffing and dirty-set scheduling."]

pub mod applier;
pub mod collections;
pub mod config;
pub mod context;
pub mod debug;
pub mod dependency;
pub mod diagnostics;
pub mod diff;
pub mod element;
pub mod error;
pub mod key;
pub mod memory_renderer;
pub mod observable;
pub mod patch;
pub mod platform;
pub mod renderer;
pub mod resource;
pub mod runtime;
pub mod scheduler;
pub mod vnode;
pub mod widget;

pub use applier::PatchApplier;
pub use config::RuntimeConfig;
pub use context::{BuildContext, StateHandle};
pub use debug::{DebugInfo, Describe};
pub use dependency::{Dependency, DependencyTracker, StateId};
pub use diagnostics::Diagnostic;
pub use diff::{diff, diff_nodes};
pub use element::{ElementId, ElementInfo, Lifecycle};
pub use error::{BuildError, ConfigError, RebuildError, RenderError};
pub use key::{location_key, Key};
pub use memory_renderer::MemoryRenderer;
pub use observable::{Observable, StateObject};
pub use patch::{AttributeDelta, Patch, PatchKind, PatchOp};
pub use platform::{Clock, HostScheduler, ManualClock, NoopHost, TestHost};
pub use renderer::Renderer;
pub use resource::{LeakReport, ResourceTracker};
pub use runtime::{RebuildOutcome, Runtime, RuntimeBuilder, RuntimeHandle, TickReport};
pub use scheduler::Scheduler;
pub use vnode::{Attributes, NodePath, OutputHandle, Primitive, VNode, VNodeKind};
pub use widget::{
    host, host_fragment, BuildResult, ComposedBuilder, HostNode, StatefulWidget, StatelessWidget,
    WidgetKind, WidgetRef, WidgetState,
};

/// Location-derived key for the call site.
#[macro_export]
macro_rules! call_key {
    () => {
        $crate::key::location_key(file!(), line!(), column!())
    };
}
