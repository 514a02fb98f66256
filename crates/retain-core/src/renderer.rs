//! Contract between the patch applier and an output backend.

use std::any::Any;

use crate::error::RenderError;
use crate::patch::Patch;
use crate::vnode::{OutputHandle, VNode};

/// Output backend driven by the patch applier.
///
/// Handles are opaque to the runtime. A patch path is resolved relative to
/// the handle it is applied to; an empty path targets that node itself.
pub trait Renderer: Any {
    /// Container that a root element commits into.
    fn container(&mut self) -> OutputHandle;

    /// Materialize `vnode` as the last child of `container`.
    fn commit(&mut self, vnode: &VNode, container: OutputHandle) -> Result<OutputHandle, RenderError>;

    /// Apply one patch beneath `handle`, returning the handle that now
    /// stands for the same position (only a root `Replace` changes it).
    fn apply_patch(&mut self, handle: OutputHandle, patch: &Patch) -> Result<OutputHandle, RenderError>;

    /// Drop committed output and detach it from its parent.
    fn release(&mut self, handle: OutputHandle);

    /// Child output at `index`, used to locate nested element output.
    fn child(&self, handle: OutputHandle, index: usize) -> Option<OutputHandle>;

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Follow `path` from `handle` through [`Renderer::child`].
pub fn locate(renderer: &dyn Renderer, handle: OutputHandle, path: &[usize]) -> Option<OutputHandle> {
    path.iter()
        .try_fold(handle, |current, index| renderer.child(current, *index))
}
