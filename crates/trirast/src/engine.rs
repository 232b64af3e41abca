use parking_lot::Mutex;

use crate::array::{RasterOutput, RasterTensor};
use crate::buffers::{BufferCapacities, BufferResizePlanner, DeviceBufferSet, ResizeWorkaround, WorkaroundPolicy};
use crate::device::{read_buffer_f32, ContextInit, ContextState, RenderingContext};
use crate::error::{RasterError, RasterResult};
use crate::raster::{RasterRenderer, RenderRequest, ResultCopier, ValidatedRequest};

/// Engine construction parameters.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Also produce the `(du/dx, du/dy, dv/dx, dv/dy)` output.
    pub double_buffered_derivatives: bool,

    /// The engine makes its context current for each render and releases it
    /// afterwards. When false the caller drives `set_context`/`release_context`.
    pub automatic_lifecycle: bool,

    /// Index into the adapter enumeration for `backends`.
    pub device_index: usize,

    pub backends: wgpu::Backends,

    /// Post-resize hook selection.
    pub resize_workaround: WorkaroundPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            double_buffered_derivatives: false,
            automatic_lifecycle: true,
            device_index: 0,
            backends: wgpu::Backends::PRIMARY,
            resize_workaround: WorkaroundPolicy::Auto,
        }
    }
}

struct EngineState {
    context: RenderingContext,
    buffers: DeviceBufferSet,
    planner: BufferResizePlanner,
    renderer: Option<RasterRenderer>,
    copier: ResultCopier,
    torn_down: bool,
}

impl EngineState {
    fn render_current(&mut self, req: &ValidatedRequest<'_>) -> RasterResult<RasterOutput> {
        let EngineState {
            context,
            buffers,
            planner,
            renderer,
            copier,
            ..
        } = self;

        let renderer = renderer
            .as_ref()
            .ok_or_else(|| RasterError::state("engine has been torn down"))?;
        planner.prepare(context, buffers, &req.requirements())?;

        let device = context.device();
        let queue = context.queue();
        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("trirast render encoder"),
        });
        renderer.draw(device, queue, &mut encoder, buffers, req)?;
        let output = copier.copy(device, &mut encoder, buffers, req, context.device_index())?;
        queue.submit(std::iter::once(encoder.finish()));

        Ok(output)
    }

    /// Reverse acquisition order; every step is best-effort.
    fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        self.torn_down = true;

        if let Err(e) = self.context.set_current() {
            log::warn!("teardown: {e}");
        }
        self.buffers.release();
        if let Some(renderer) = self.renderer.take() {
            renderer.release();
        }
        self.context.destroy();
    }
}

/// A rasterization engine bound to one device.
///
/// Renders are serialized by an internal lock held from context acquisition
/// through the result copy. The buffer set grows to fit the largest request
/// seen and is reused afterwards.
pub struct Engine {
    device_index: usize,
    automatic_lifecycle: bool,
    double_buffered_derivatives: bool,
    state: Mutex<EngineState>,
}

impl Engine {
    /// Creates an engine on device `device_index` with default settings
    /// otherwise.
    pub fn new(
        double_buffered_derivatives: bool,
        automatic_lifecycle: bool,
        device_index: usize,
    ) -> RasterResult<Self> {
        Self::create(EngineConfig {
            double_buffered_derivatives,
            automatic_lifecycle,
            device_index,
            ..Default::default()
        })
    }

    pub fn create(config: EngineConfig) -> RasterResult<Self> {
        let workaround = config.resize_workaround.resolve();
        Self::with_resize_workaround(config, workaround)
    }

    /// Like [`Engine::create`] with a caller-supplied post-resize hook;
    /// `config.resize_workaround` is ignored.
    pub fn with_resize_workaround(
        config: EngineConfig,
        workaround: Box<dyn ResizeWorkaround>,
    ) -> RasterResult<Self> {
        let context = RenderingContext::new_blocking(&ContextInit {
            device_index: config.device_index,
            double_buffered_derivatives: config.double_buffered_derivatives,
            backends: config.backends,
        })?;

        let renderer = RasterRenderer::new(context.device(), config.double_buffered_derivatives);
        let planner = BufferResizePlanner::new(workaround);
        log::debug!(
            "engine on device {}: derivatives={}, automatic={}, workaround={}",
            config.device_index,
            config.double_buffered_derivatives,
            config.automatic_lifecycle,
            planner.workaround_name()
        );

        Ok(Self {
            device_index: config.device_index,
            automatic_lifecycle: config.automatic_lifecycle,
            double_buffered_derivatives: config.double_buffered_derivatives,
            state: Mutex::new(EngineState {
                context,
                buffers: DeviceBufferSet::new(config.double_buffered_derivatives),
                planner,
                renderer: Some(renderer),
                copier: ResultCopier::new(),
                torn_down: false,
            }),
        })
    }

    pub fn device_index(&self) -> usize {
        self.device_index
    }

    pub fn automatic_lifecycle(&self) -> bool {
        self.automatic_lifecycle
    }

    pub fn double_buffered_derivatives(&self) -> bool {
        self.double_buffered_derivatives
    }

    pub fn adapter_info(&self) -> wgpu::AdapterInfo {
        self.state.lock().context.adapter_info()
    }

    pub fn context_state(&self) -> ContextState {
        self.state.lock().context.state()
    }

    pub fn buffer_capacities(&self) -> BufferCapacities {
        self.state.lock().buffers.capacities()
    }

    /// How many times the buffer set has grown.
    pub fn reallocation_count(&self) -> u64 {
        self.state.lock().buffers.reallocations()
    }

    /// Makes the context current on the calling thread. Manual lifecycle only.
    pub fn set_context(&self) -> RasterResult<()> {
        self.require_manual("set_context")?;
        self.state.lock().context.set_current()
    }

    /// Releases the context from the calling thread. Manual lifecycle only.
    pub fn release_context(&self) -> RasterResult<()> {
        self.require_manual("release_context")?;
        self.state.lock().context.release()
    }

    fn require_manual(&self, op: &str) -> RasterResult<()> {
        if self.automatic_lifecycle {
            return Err(RasterError::state(format!(
                "{op} is only available with manual lifecycle"
            )));
        }
        Ok(())
    }

    /// Rasterizes `request` and returns freshly allocated outputs.
    ///
    /// Validation runs before the lock is taken; a rejected request touches
    /// no device state.
    pub fn render(&self, request: &RenderRequest<'_>) -> RasterResult<RasterOutput> {
        let validated = request.validate(self.device_index)?;

        let mut state = self.state.lock();
        if self.automatic_lifecycle {
            state.context.set_current()?;
        } else {
            state.context.require_current()?;
        }

        let result = state.render_current(&validated);

        if self.automatic_lifecycle {
            if let Err(e) = state.context.release() {
                log::warn!("render: could not release context: {e}");
            }
        }
        result
    }

    /// Copies `tensor` to host memory. Blocks until the copy has completed,
    /// which also waits for every render submitted before it.
    pub fn read_to_host(&self, tensor: &RasterTensor) -> RasterResult<Vec<f32>> {
        if tensor.device_index() != self.device_index {
            return Err(RasterError::DeviceMismatch {
                input: "tensor",
                found: tensor.device_index(),
                engine: self.device_index,
            });
        }
        let Some(buffer) = tensor.buffer() else {
            return Ok(Vec::new());
        };

        let state = self.state.lock();
        pollster::block_on(read_buffer_f32(
            state.context.device(),
            state.context.queue(),
            buffer,
            tensor.size_bytes(),
        ))
    }

    /// Releases device buffers and destroys the context.
    ///
    /// Dropping the engine does the same; this form only makes the point of
    /// teardown explicit.
    pub fn destroy(self) {
        self.state.lock().teardown();
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.state.get_mut().teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn engine_is_send_and_sync() {
        assert_send_sync::<Engine>();
    }

    #[test]
    fn default_config_is_automatic_on_first_device() {
        let config = EngineConfig::default();
        assert!(config.automatic_lifecycle);
        assert!(!config.double_buffered_derivatives);
        assert_eq!(config.device_index, 0);
        assert_eq!(config.resize_workaround, WorkaroundPolicy::Auto);
    }

    #[test]
    fn teardown_releases_renderer_before_device() {
        let engine = match Engine::create(EngineConfig::default()) {
            Ok(engine) => engine,
            Err(e) => {
                println!("skipping: {e}");
                return;
            }
        };

        let mut state = engine.state.lock();
        state.teardown();
        assert!(state.torn_down);
        assert!(state.renderer.is_none());
        assert_eq!(state.context.state(), ContextState::Destroyed);

        state.teardown();
        assert!(state.renderer.is_none());
    }
}
