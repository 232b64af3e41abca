//! Pure sizing logic: what a request needs, what is allocated, what must grow.

use crate::error::{RasterError, RasterResult};

/// Size of every element the engine stores (float32 / int32 / uint32).
pub(crate) const ELEMENT_BYTES: u64 = 4;

/// Extent of the layered raster render targets.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct TargetExtent {
    pub width: u32,
    pub height: u32,
    pub layers: u32,
}

impl TargetExtent {
    pub const fn new(width: u32, height: u32, layers: u32) -> Self {
        Self {
            width,
            height,
            layers,
        }
    }

    pub fn covers(self, other: TargetExtent) -> bool {
        self.width >= other.width && self.height >= other.height && self.layers >= other.layers
    }

    /// Per-dimension maximum.
    pub fn union(self, other: TargetExtent) -> TargetExtent {
        TargetExtent {
            width: self.width.max(other.width),
            height: self.height.max(other.height),
            layers: self.layers.max(other.layers),
        }
    }
}

/// Element counts one render request needs.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct BufferRequirements {
    /// float32 position components.
    pub positions: u64,
    /// int32 triangle indices.
    pub indices: u64,
    /// Draw-range table entries (one base vertex per layer).
    pub layers: u64,
    /// float32 elements in each output buffer.
    pub outputs: u64,
    pub extent: TargetExtent,
}

/// Element counts currently allocated.
///
/// Every field is monotonically non-decreasing over the life of a buffer set.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct BufferCapacities {
    pub positions: u64,
    pub indices: u64,
    pub layers: u64,
    pub outputs: u64,
    pub extent: TargetExtent,
}

/// New sizes for the resources that must grow; `None` keeps the current one.
#[derive(Debug, Copy, Clone, Default, Eq, PartialEq)]
pub struct ResizePlan {
    pub positions: Option<u64>,
    pub indices: Option<u64>,
    pub layers: Option<u64>,
    pub outputs: Option<u64>,
    pub extent: Option<TargetExtent>,
}

impl ResizePlan {
    pub fn is_empty(&self) -> bool {
        self.positions.is_none()
            && self.indices.is_none()
            && self.layers.is_none()
            && self.outputs.is_none()
            && self.extent.is_none()
    }

    /// Capacities after the plan has been applied to `current`.
    pub fn applied_to(&self, current: BufferCapacities) -> BufferCapacities {
        BufferCapacities {
            positions: self.positions.unwrap_or(current.positions),
            indices: self.indices.unwrap_or(current.indices),
            layers: self.layers.unwrap_or(current.layers),
            outputs: self.outputs.unwrap_or(current.outputs),
            extent: self.extent.unwrap_or(current.extent),
        }
    }
}

fn grow(current: u64, required: u64) -> Option<u64> {
    (required > current).then_some(required)
}

/// Decides which resources must grow. Buffers grow to exactly the required
/// size; render targets grow per dimension. Nothing ever shrinks.
pub fn plan_resize(current: &BufferCapacities, required: &BufferRequirements) -> ResizePlan {
    ResizePlan {
        positions: grow(current.positions, required.positions),
        indices: grow(current.indices, required.indices),
        layers: grow(current.layers, required.layers),
        outputs: grow(current.outputs, required.outputs),
        extent: (!current.extent.covers(required.extent))
            .then(|| current.extent.union(required.extent)),
    }
}

/// Device limits relevant to buffer growth.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct AllocationLimits {
    pub max_buffer_bytes: u64,
    pub max_binding_bytes: u64,
    pub max_texture_dimension: u32,
    pub max_array_layers: u32,
}

impl AllocationLimits {
    pub fn from_wgpu(limits: &wgpu::Limits) -> Self {
        Self {
            max_buffer_bytes: limits.max_buffer_size,
            max_binding_bytes: u64::from(limits.max_storage_buffer_binding_size),
            max_texture_dimension: limits.max_texture_dimension_2d,
            max_array_layers: limits.max_texture_array_layers,
        }
    }

    /// Rejects a plan any of whose allocations the device cannot hold.
    ///
    /// Runs before anything is allocated, so a rejected plan leaves the
    /// buffer set exactly as it was.
    pub fn check(&self, plan: &ResizePlan) -> RasterResult<()> {
        let buffers = [
            ("position buffer", plan.positions),
            ("index buffer", plan.indices),
            ("draw-range table", plan.layers),
            ("output buffer", plan.outputs),
        ];
        for (name, elements) in buffers {
            let Some(elements) = elements else { continue };
            let bytes = elements.saturating_mul(ELEMENT_BYTES);
            let limit = self.max_buffer_bytes.min(self.max_binding_bytes);
            if bytes > limit {
                return Err(RasterError::ResourceAllocation(format!(
                    "{name} needs {bytes} bytes, device allows {limit}"
                )));
            }
        }

        if let Some(extent) = plan.extent {
            let dim = self.max_texture_dimension;
            if extent.width > dim || extent.height > dim {
                return Err(RasterError::ResourceAllocation(format!(
                    "render target {}x{} exceeds device maximum {dim}",
                    extent.width, extent.height
                )));
            }
            if extent.layers > self.max_array_layers {
                return Err(RasterError::ResourceAllocation(format!(
                    "{} layers exceed device maximum {}",
                    extent.layers, self.max_array_layers
                )));
            }
        }

        Ok(())
    }
}
