use crate::error::{RasterError, RasterResult};

use super::plan::{BufferCapacities, ResizePlan, TargetExtent, ELEMENT_BYTES};

/// Format of the raster and derivative render targets.
pub(crate) const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;

/// Format of the per-pass depth attachment.
pub(crate) const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// One grow-only device buffer.
#[derive(Debug)]
struct GrowBuffer {
    label: &'static str,
    usage: wgpu::BufferUsages,
    capacity: u64, // elements
    buffer: Option<wgpu::Buffer>,
}

impl GrowBuffer {
    fn new(label: &'static str, usage: wgpu::BufferUsages) -> Self {
        Self {
            label,
            usage,
            capacity: 0,
            buffer: None,
        }
    }

    fn allocate(&self, device: &wgpu::Device, elements: u64) -> wgpu::Buffer {
        log::debug!("allocating {} ({elements} elements)", self.label);
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(self.label),
            size: elements.saturating_mul(ELEMENT_BYTES),
            usage: self.usage,
            mapped_at_creation: false,
        })
    }

    fn replace(&mut self, buffer: wgpu::Buffer, elements: u64) {
        if let Some(old) = self.buffer.replace(buffer) {
            old.destroy();
        }
        self.capacity = elements;
    }

    fn release(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            buffer.destroy();
        }
    }
}

/// Layered render targets for the rasterization passes.
///
/// `raster` is ping-ponged across depth-peeling passes: pass `p` renders into
/// `raster[p % 2]` and reads the previous pass from the other one.
#[derive(Debug)]
pub(crate) struct RasterTargets {
    pub raster: [wgpu::Texture; 2],
    pub derivatives: Option<wgpu::Texture>,
    pub depth: wgpu::Texture,
}

impl RasterTargets {
    fn allocate(device: &wgpu::Device, extent: TargetExtent, with_derivatives: bool) -> Self {
        log::debug!(
            "allocating raster targets {}x{}x{}",
            extent.width,
            extent.height,
            extent.layers
        );
        let layered = |label| {
            device.create_texture(&wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width: extent.width,
                    height: extent.height,
                    depth_or_array_layers: extent.layers,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: TARGET_FORMAT,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                    | wgpu::TextureUsages::TEXTURE_BINDING,
                view_formats: &[],
            })
        };

        let depth = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("trirast depth target"),
            size: wgpu::Extent3d {
                width: extent.width,
                height: extent.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });

        Self {
            raster: [
                layered("trirast raster target 0"),
                layered("trirast raster target 1"),
            ],
            derivatives: with_derivatives.then(|| layered("trirast derivative target")),
            depth,
        }
    }

    fn release(self) {
        if let Some(db) = self.derivatives {
            db.destroy();
        }
        self.depth.destroy();
        let [a, b] = self.raster;
        b.destroy();
        a.destroy();
    }
}

/// Allocations made for a plan but not yet swapped in.
struct PendingGrowth {
    positions: Option<(wgpu::Buffer, u64)>,
    indices: Option<(wgpu::Buffer, u64)>,
    layers: Option<(wgpu::Buffer, u64)>,
    raster_out: Option<(wgpu::Buffer, u64)>,
    derivatives_out: Option<(wgpu::Buffer, u64)>,
    targets: Option<(RasterTargets, TargetExtent)>,
}

impl PendingGrowth {
    fn release(self) {
        if let Some((targets, _)) = self.targets {
            targets.release();
        }
        let buffers = [
            self.derivatives_out,
            self.raster_out,
            self.layers,
            self.indices,
            self.positions,
        ];
        for (buffer, _) in buffers.into_iter().flatten() {
            buffer.destroy();
        }
    }
}

/// Device-resident storage owned by one engine.
///
/// Buffers grow only, and only through [`DeviceBufferSet::apply`]. Handles
/// never leave the crate.
#[derive(Debug)]
pub struct DeviceBufferSet {
    positions: GrowBuffer,
    indices: GrowBuffer,
    layers: GrowBuffer,
    raster_out: GrowBuffer,
    derivatives_out: Option<GrowBuffer>,
    targets: Option<RasterTargets>,
    extent: TargetExtent,
    reallocations: u64,
}

impl DeviceBufferSet {
    pub fn new(double_buffered_derivatives: bool) -> Self {
        let input = wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST;
        let output = wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC;
        Self {
            positions: GrowBuffer::new("trirast position buffer", input),
            indices: GrowBuffer::new("trirast index buffer", input),
            layers: GrowBuffer::new("trirast draw-range table", input),
            raster_out: GrowBuffer::new("trirast raster output", output),
            derivatives_out: double_buffered_derivatives
                .then(|| GrowBuffer::new("trirast derivative output", output)),
            targets: None,
            extent: TargetExtent::default(),
            reallocations: 0,
        }
    }

    pub fn double_buffered_derivatives(&self) -> bool {
        self.derivatives_out.is_some()
    }

    pub fn capacities(&self) -> BufferCapacities {
        BufferCapacities {
            positions: self.positions.capacity,
            indices: self.indices.capacity,
            layers: self.layers.capacity,
            outputs: self.raster_out.capacity,
            extent: self.extent,
        }
    }

    /// Number of plans applied so far.
    pub fn reallocations(&self) -> u64 {
        self.reallocations
    }

    /// Grows the resources named in `plan`.
    ///
    /// The plan must already have passed the device limit check. Every new
    /// allocation is created inside a device error scope before any handle is
    /// swapped in; if the device reports an error the new allocations are
    /// dropped and capacities stay as they were.
    pub(crate) fn apply(&mut self, device: &wgpu::Device, plan: &ResizePlan) -> RasterResult<()> {
        if plan.is_empty() {
            return Ok(());
        }

        let validation = device.push_error_scope(wgpu::ErrorFilter::Validation);
        let oom = device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let pending = self.allocate(device, plan);
        // Innermost scope pops first.
        let out_of_memory = pollster::block_on(oom.pop());
        let invalid = pollster::block_on(validation.pop());

        if let Some(err) = out_of_memory.or(invalid) {
            pending.release();
            return Err(RasterError::ResourceAllocation(format!(
                "growing device buffers failed: {err}"
            )));
        }

        self.commit(pending);
        Ok(())
    }

    fn allocate(&self, device: &wgpu::Device, plan: &ResizePlan) -> PendingGrowth {
        PendingGrowth {
            positions: plan.positions.map(|n| (self.positions.allocate(device, n), n)),
            indices: plan.indices.map(|n| (self.indices.allocate(device, n), n)),
            layers: plan.layers.map(|n| (self.layers.allocate(device, n), n)),
            raster_out: plan.outputs.map(|n| (self.raster_out.allocate(device, n), n)),
            derivatives_out: match (&self.derivatives_out, plan.outputs) {
                (Some(db), Some(n)) => Some((db.allocate(device, n), n)),
                _ => None,
            },
            targets: plan.extent.map(|extent| {
                (
                    RasterTargets::allocate(device, extent, self.double_buffered_derivatives()),
                    extent,
                )
            }),
        }
    }

    fn commit(&mut self, pending: PendingGrowth) {
        if let Some((buffer, n)) = pending.positions {
            self.positions.replace(buffer, n);
        }
        if let Some((buffer, n)) = pending.indices {
            self.indices.replace(buffer, n);
        }
        if let Some((buffer, n)) = pending.layers {
            self.layers.replace(buffer, n);
        }
        if let Some((buffer, n)) = pending.raster_out {
            self.raster_out.replace(buffer, n);
        }
        if let (Some(slot), Some((buffer, n))) = (self.derivatives_out.as_mut(), pending.derivatives_out) {
            slot.replace(buffer, n);
        }
        if let Some((new_targets, extent)) = pending.targets {
            if let Some(old) = self.targets.replace(new_targets) {
                old.release();
            }
            self.extent = extent;
        }

        self.reallocations += 1;
    }

    pub(crate) fn positions(&self) -> Option<&wgpu::Buffer> {
        self.positions.buffer.as_ref()
    }

    pub(crate) fn indices(&self) -> Option<&wgpu::Buffer> {
        self.indices.buffer.as_ref()
    }

    pub(crate) fn layers(&self) -> Option<&wgpu::Buffer> {
        self.layers.buffer.as_ref()
    }

    pub(crate) fn raster_out(&self) -> Option<&wgpu::Buffer> {
        self.raster_out.buffer.as_ref()
    }

    pub(crate) fn derivatives_out(&self) -> Option<&wgpu::Buffer> {
        self.derivatives_out.as_ref()?.buffer.as_ref()
    }

    pub(crate) fn targets(&self) -> Option<&RasterTargets> {
        self.targets.as_ref()
    }

    /// Frees every allocation in reverse acquisition order. Capacities are
    /// kept so the monotonic record survives teardown.
    pub(crate) fn release(&mut self) {
        if let Some(targets) = self.targets.take() {
            targets.release();
        }
        if let Some(db) = self.derivatives_out.as_mut() {
            db.release();
        }
        self.raster_out.release();
        self.layers.release();
        self.indices.release();
        self.positions.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{ContextInit, RenderingContext};

    #[test]
    fn failed_growth_keeps_previous_capacities() {
        let ctx = match RenderingContext::new_blocking(&ContextInit::default()) {
            Ok(ctx) => ctx,
            Err(e) => {
                println!("skipping: {e}");
                return;
            }
        };
        let mut set = DeviceBufferSet::new(false);

        // Past the device limit, so creation fails inside the error scope.
        let plan = ResizePlan {
            positions: Some(ctx.limits().max_buffer_size / ELEMENT_BYTES + 1),
            ..Default::default()
        };
        let err = set.apply(ctx.device(), &plan).unwrap_err();

        assert!(matches!(err, RasterError::ResourceAllocation(_)), "{err}");
        assert_eq!(set.capacities(), BufferCapacities::default());
        assert_eq!(set.reallocations(), 0);
        assert!(set.positions().is_none());
    }

    #[test]
    fn empty_plan_allocates_nothing() {
        let ctx = match RenderingContext::new_blocking(&ContextInit::default()) {
            Ok(ctx) => ctx,
            Err(e) => {
                println!("skipping: {e}");
                return;
            }
        };
        let mut set = DeviceBufferSet::new(false);
        set.apply(ctx.device(), &ResizePlan::default()).unwrap();
        assert_eq!(set.reallocations(), 0);
    }
}
