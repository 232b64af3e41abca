use crate::device::RenderingContext;
use crate::error::RasterResult;

use super::plan::{plan_resize, AllocationLimits, BufferRequirements, ResizePlan};
use super::set::DeviceBufferSet;
use super::workaround::ResizeWorkaround;

/// Sizes a [`DeviceBufferSet`] for a request and runs the post-resize hook.
///
/// Must not run while a render on the same buffer set is being recorded; the
/// engine lock enforces this.
pub struct BufferResizePlanner {
    workaround: Box<dyn ResizeWorkaround>,
}

impl BufferResizePlanner {
    pub fn new(workaround: Box<dyn ResizeWorkaround>) -> Self {
        Self { workaround }
    }

    pub fn workaround_name(&self) -> &'static str {
        self.workaround.name()
    }

    pub fn plan(&self, buffers: &DeviceBufferSet, required: &BufferRequirements) -> ResizePlan {
        plan_resize(&buffers.capacities(), required)
    }

    /// Grows whatever `required` outgrows. Returns whether anything was
    /// reallocated.
    ///
    /// On error nothing has been allocated and capacities are unchanged.
    pub fn prepare(
        &self,
        ctx: &mut RenderingContext,
        buffers: &mut DeviceBufferSet,
        required: &BufferRequirements,
    ) -> RasterResult<bool> {
        let plan = self.plan(buffers, required);
        if plan.is_empty() {
            return Ok(false);
        }

        AllocationLimits::from_wgpu(&ctx.limits()).check(&plan)?;
        log::debug!("resizing device buffers: {plan:?}");
        buffers.apply(ctx.device(), &plan)?;

        self.run_workaround(ctx);
        Ok(true)
    }

    fn run_workaround(&self, ctx: &mut RenderingContext) {
        let Err(err) = self.workaround.after_resize(ctx) else {
            return;
        };
        log::warn!("{err}; continuing");

        if !ctx.is_current() {
            if let Err(e) = ctx.set_current() {
                log::warn!("could not make context current after failed workaround: {e}");
            }
        }
    }
}
