//! Applies diff results to committed output.
//!
//! The applier is the only code that writes through a [`Renderer`]. Given
//! the same output state and the same patch list it always performs the
//! same renderer calls, so the result is deterministic.
//!
//! Value patches (`UpdateText`, `UpdateAttributes`) set absolute values and
//! may be applied again with no further effect. Structural patches are
//! positional and only hold against the output they were diffed for; when
//! a list fails partway the runtime replaces the element's output whole
//! rather than replaying the list.

use crate::error::RenderError;
use crate::patch::{Patch, PatchKind, PatchOp};
use crate::renderer::Renderer;
use crate::vnode::{OutputHandle, VNode};

pub struct PatchApplier<'a> {
    renderer: &'a mut dyn Renderer,
    container: OutputHandle,
}

impl<'a> PatchApplier<'a> {
    pub fn new(renderer: &'a mut dyn Renderer, container: OutputHandle) -> Self {
        Self {
            renderer,
            container,
        }
    }

    /// Commit a tree that has no output yet.
    pub fn commit(&mut self, vnode: &VNode) -> Result<OutputHandle, RenderError> {
        self.renderer.commit(vnode, self.container)
    }

    /// Apply `patches` to the output rooted at `handle`.
    ///
    /// Returns the handle of the root afterwards: a root `Insert` creates it,
    /// a root `Remove` clears it and a root `Replace` swaps it.
    pub fn apply(
        &mut self,
        mut handle: Option<OutputHandle>,
        patches: &[Patch],
    ) -> Result<Option<OutputHandle>, RenderError> {
        debug_assert!(
            patches
                .windows(2)
                .all(|pair| pair[0].kind().phase() <= pair[1].kind().phase()),
            "patches must arrive in phase order"
        );
        for patch in patches {
            if patch.kind() == PatchKind::NoOp {
                continue;
            }
            log::trace!("applying {patch}");
            handle = match (&patch.op, patch.path.is_empty(), handle) {
                (PatchOp::Insert(node), true, previous) => {
                    if let Some(previous) = previous {
                        self.renderer.release(previous);
                    }
                    Some(self.renderer.commit(node, self.container)?)
                }
                (PatchOp::Remove, true, previous) => {
                    if let Some(previous) = previous {
                        self.renderer.release(previous);
                    }
                    None
                }
                (_, _, Some(current)) => Some(self.renderer.apply_patch(current, patch)?),
                (_, _, None) => {
                    return Err(RenderError::Rejected {
                        reason: format!("{patch} targets output that was never committed"),
                    })
                }
            };
        }
        Ok(handle)
    }
}

#[cfg(test)]
#[path = "tests/applier_tests.rs"]
mod tests;
