//! Accelerator device + rendering context management.
//!
//! This module is responsible for:
//! - selecting an adapter by index and creating the wgpu Device/Queue
//! - tracking which thread currently owns the context
//! - reading device buffers back to the host

mod context;
mod readback;

pub use context::{ContextState, RenderingContext};
pub(crate) use readback::read_buffer_f32;

/// Parameters for creating a [`RenderingContext`].
#[derive(Debug, Clone)]
pub struct ContextInit {
    /// Index into the adapter enumeration for `backends`.
    pub device_index: usize,

    /// Allocate and populate the derivative output alongside the raster output.
    pub double_buffered_derivatives: bool,

    /// Backends considered during adapter enumeration.
    pub backends: wgpu::Backends,
}

impl Default for ContextInit {
    fn default() -> Self {
        Self {
            device_index: 0,
            double_buffered_derivatives: false,
            backends: wgpu::Backends::PRIMARY,
        }
    }
}
