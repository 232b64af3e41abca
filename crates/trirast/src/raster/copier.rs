use crate::array::{RasterOutput, RasterTensor};
use crate::buffers::DeviceBufferSet;
use crate::error::{RasterError, RasterResult};

use super::request::{ValidatedRequest, OUTPUT_CHANNELS};

/// Copies the rendered output buffers into freshly allocated tensors.
///
/// The copies are recorded into the same encoder as the render, so they run
/// after it on the queue with no extra synchronization.
#[derive(Debug, Default)]
pub struct ResultCopier;

impl ResultCopier {
    pub fn new() -> Self {
        Self
    }

    pub fn copy(
        &self,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        buffers: &DeviceBufferSet,
        req: &ValidatedRequest<'_>,
        device_index: usize,
    ) -> RasterResult<RasterOutput> {
        let raster_src = buffers
            .raster_out()
            .ok_or_else(|| RasterError::ResourceAllocation("raster output is not allocated".into()))?;
        let raster = copy_one(
            device,
            encoder,
            raster_src,
            req.output_shape(OUTPUT_CHANNELS),
            device_index,
            "trirast raster result",
        );

        let derivatives = match buffers.derivatives_out() {
            Some(db_src) if buffers.double_buffered_derivatives() => copy_one(
                device,
                encoder,
                db_src,
                req.output_shape(OUTPUT_CHANNELS),
                device_index,
                "trirast derivative result",
            ),
            _ => RasterTensor::new(None, req.output_shape(0), device_index),
        };

        Ok(RasterOutput {
            raster,
            derivatives,
        })
    }
}

fn copy_one(
    device: &wgpu::Device,
    encoder: &mut wgpu::CommandEncoder,
    source: &wgpu::Buffer,
    shape: [usize; 4],
    device_index: usize,
    label: &'static str,
) -> RasterTensor {
    let size = (shape.iter().product::<usize>() * std::mem::size_of::<f32>()) as u64;
    let buffer = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage: wgpu::BufferUsages::STORAGE
            | wgpu::BufferUsages::COPY_SRC
            | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });
    encoder.copy_buffer_to_buffer(source, 0, &buffer, 0, size);
    RasterTensor::new(Some(buffer), shape, device_index)
}
