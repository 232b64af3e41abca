use crate::error::{RasterError, RasterResult};

/// Copies `size` bytes of `buffer` into a staging buffer and maps it.
///
/// The copy is submitted on `queue` behind any work already recorded there,
/// so the result reflects every prior render on the same queue.
pub(crate) async fn read_buffer_f32(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    buffer: &wgpu::Buffer,
    size: u64,
) -> RasterResult<Vec<f32>> {
    if size == 0 {
        return Ok(Vec::new());
    }

    let staging = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("trirast readback staging"),
        size,
        usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    });

    let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
        label: Some("trirast readback encoder"),
    });
    encoder.copy_buffer_to_buffer(buffer, 0, &staging, 0, size);
    queue.submit(std::iter::once(encoder.finish()));

    let (tx, rx) = futures::channel::oneshot::channel();
    staging
        .slice(..)
        .map_async(wgpu::MapMode::Read, move |result| {
            tx.send(result).ok();
        });
    device
        .poll(wgpu::PollType::wait_indefinitely())
        .map_err(|e| RasterError::Readback(format!("device poll failed: {e}")))?;

    rx.await
        .map_err(|_| RasterError::Readback("map callback dropped".to_string()))?
        .map_err(|e| RasterError::Readback(format!("buffer mapping failed: {e:?}")))?;

    let values = {
        let data = staging.slice(..).get_mapped_range();
        bytemuck::pod_collect_to_vec::<u8, f32>(&data)
    };
    staging.unmap();

    Ok(values)
}
