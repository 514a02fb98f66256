//! Testing utilities and harness for the retain runtime

pub mod testing;

pub use testing::*;

pub mod prelude {
    pub use crate::testing::*;
    pub use retain_core::{
        host, host_fragment, BuildContext, BuildError, BuildResult, Diagnostic, ElementId, Lifecycle,
        MemoryRenderer, Observable, PatchKind, PatchOp, RuntimeConfig, StatefulWidget,
        StatelessWidget, WidgetRef, WidgetState,
    };
}
