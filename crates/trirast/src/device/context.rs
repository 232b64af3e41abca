use std::thread::{self, ThreadId};

use crate::error::{RasterError, RasterResult};

use super::ContextInit;

/// Lifecycle state of a rendering context.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum ContextState {
    Created,
    /// Current on the given thread.
    Current(ThreadId),
    Released,
    /// Terminal.
    Destroyed,
}

/// Current/released bookkeeping, kept apart from the device so the state
/// machine can be exercised without an adapter.
#[derive(Debug, Clone)]
pub(crate) struct Lifecycle {
    state: ContextState,
}

impl Lifecycle {
    pub(crate) fn new() -> Self {
        Self {
            state: ContextState::Created,
        }
    }

    pub(crate) fn state(&self) -> ContextState {
        self.state
    }

    pub(crate) fn set_current(&mut self, me: ThreadId) -> RasterResult<()> {
        match self.state {
            ContextState::Destroyed => Err(RasterError::state("context has been destroyed")),
            ContextState::Current(owner) if owner == me => Ok(()),
            ContextState::Current(owner) => Err(RasterError::state(format!(
                "context is already current on thread {owner:?}"
            ))),
            ContextState::Created | ContextState::Released => {
                self.state = ContextState::Current(me);
                Ok(())
            }
        }
    }

    pub(crate) fn release(&mut self, me: ThreadId) -> RasterResult<()> {
        match self.state {
            ContextState::Current(owner) if owner == me => {
                self.state = ContextState::Released;
                Ok(())
            }
            ContextState::Current(owner) => Err(RasterError::state(format!(
                "context is current on thread {owner:?}, not on the releasing thread"
            ))),
            ContextState::Destroyed => Err(RasterError::state("context has been destroyed")),
            ContextState::Created | ContextState::Released => Ok(()),
        }
    }

    pub(crate) fn require_current(&self, me: ThreadId) -> RasterResult<()> {
        match self.state {
            ContextState::Current(owner) if owner == me => Ok(()),
            ContextState::Current(owner) => Err(RasterError::state(format!(
                "context is current on thread {owner:?}, not on the calling thread"
            ))),
            ContextState::Destroyed => Err(RasterError::state("context has been destroyed")),
            ContextState::Created | ContextState::Released => {
                Err(RasterError::state("context is not current"))
            }
        }
    }

    pub(crate) fn mark_destroyed(&mut self) {
        self.state = ContextState::Destroyed;
    }
}

/// Owns the accelerator-bound objects (adapter, device, queue) and the
/// current/released lifecycle around them.
///
/// The queue is the engine's single compute stream: everything the engine
/// records is submitted to it, so uploads, draws and copies are ordered
/// without extra barriers.
pub struct RenderingContext {
    device_index: usize,
    double_buffered_derivatives: bool,
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    lifecycle: Lifecycle,
}

impl RenderingContext {
    /// Creates a context on the adapter at `init.device_index`.
    pub async fn new(init: &ContextInit) -> RasterResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: init.backends,
            ..Default::default()
        });

        let mut adapters = instance.enumerate_adapters(init.backends).await;
        for (i, adapter) in adapters.iter().enumerate() {
            let info = adapter.get_info();
            log::debug!("adapter {i}: {} ({:?}, {:?})", info.name, info.backend, info.device_type);
        }

        if init.device_index >= adapters.len() {
            return Err(RasterError::DeviceUnavailable {
                index: init.device_index,
                available: adapters.len(),
            });
        }
        let adapter = adapters.swap_remove(init.device_index);

        let info = adapter.get_info();
        log::info!(
            "rendering context on device {}: {} ({:?})",
            init.device_index,
            info.name,
            info.backend
        );

        // Large scenes need the adapter's real buffer limits, not the
        // portable defaults.
        let adapter_limits = adapter.limits();
        let required_limits = wgpu::Limits {
            max_buffer_size: adapter_limits.max_buffer_size,
            max_storage_buffer_binding_size: adapter_limits.max_storage_buffer_binding_size,
            max_texture_dimension_2d: adapter_limits.max_texture_dimension_2d,
            max_texture_array_layers: adapter_limits.max_texture_array_layers,
            ..wgpu::Limits::default()
        };

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("trirast device"),
                required_features: wgpu::Features::empty(),
                required_limits,
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|e| RasterError::ContextCreation(e.to_string()))?;

        Ok(Self {
            device_index: init.device_index,
            double_buffered_derivatives: init.double_buffered_derivatives,
            adapter,
            device,
            queue,
            lifecycle: Lifecycle::new(),
        })
    }

    /// Blocking wrapper around [`RenderingContext::new`].
    pub fn new_blocking(init: &ContextInit) -> RasterResult<Self> {
        pollster::block_on(Self::new(init))
    }

    pub fn device_index(&self) -> usize {
        self.device_index
    }

    pub fn double_buffered_derivatives(&self) -> bool {
        self.double_buffered_derivatives
    }

    pub fn adapter_info(&self) -> wgpu::AdapterInfo {
        self.adapter.get_info()
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn limits(&self) -> wgpu::Limits {
        self.device.limits()
    }

    pub fn state(&self) -> ContextState {
        self.lifecycle.state()
    }

    /// True when the context is current on the calling thread.
    pub fn is_current(&self) -> bool {
        self.lifecycle.state() == ContextState::Current(thread::current().id())
    }

    /// Makes the context current on the calling thread.
    pub fn set_current(&mut self) -> RasterResult<()> {
        self.lifecycle.set_current(thread::current().id())
    }

    /// Releases the context from the calling thread.
    pub fn release(&mut self) -> RasterResult<()> {
        self.lifecycle.release(thread::current().id())
    }

    pub fn require_current(&self) -> RasterResult<()> {
        self.lifecycle.require_current(thread::current().id())
    }

    /// Blocks until all submitted work on the queue has completed.
    pub fn wait_idle(&self) -> RasterResult<()> {
        self.device
            .poll(wgpu::PollType::wait_indefinitely())
            .map(|_| ())
            .map_err(|e| RasterError::ContextState(format!("device poll failed: {e}")))
    }

    /// Tears the device down. Best-effort and idempotent.
    ///
    /// Callers owning buffers on this device release them first; see
    /// `Engine::destroy` for the full ordering.
    pub fn destroy(&mut self) {
        if self.lifecycle.state() == ContextState::Destroyed {
            return;
        }
        if let Err(e) = self.set_current() {
            log::warn!("destroy: could not make context current: {e}");
        }
        if let Err(e) = self.wait_idle() {
            log::warn!("destroy: {e}");
        }
        if let Err(e) = self.release() {
            log::warn!("destroy: could not release context: {e}");
        }
        self.device.destroy();
        self.lifecycle.mark_destroyed();
        log::debug!("rendering context on device {} destroyed", self.device_index);
    }
}
