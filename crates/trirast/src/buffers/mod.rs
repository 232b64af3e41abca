//! Device buffer ownership and growth.
//!
//! - `plan`: what a request needs versus what is allocated (no device needed)
//! - `set`: the grow-only allocations themselves
//! - `planner`: applies plans and runs the post-resize hook
//! - `workaround`: pluggable post-resize hooks

mod plan;
mod planner;
mod set;
mod workaround;

pub use plan::{
    plan_resize, AllocationLimits, BufferCapacities, BufferRequirements, ResizePlan, TargetExtent,
};
pub use planner::BufferResizePlanner;
pub use set::DeviceBufferSet;
pub use workaround::{NoWorkaround, ReacquireContext, ResizeWorkaround, WorkaroundPolicy};

pub(crate) use set::{RasterTargets, DEPTH_FORMAT, TARGET_FORMAT};
