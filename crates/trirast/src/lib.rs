//! trirast: a GPU triangle rasterizer for differentiable rendering.
//!
//! Each render produces, per pixel, the perspective-correct barycentrics of
//! the visible triangle, its clip-space depth and `triangle_index + 1`
//! (0 where nothing is hit), optionally with screen-space barycentric
//! derivatives. Geometry comes either as independent instances
//! (`[N, V, 4]`) or as vertex ranges into one shared buffer (`[V, 4]` plus
//! `[R, 2]` ranges), one output layer per instance or range.

pub mod array;
pub mod buffers;
pub mod device;
pub mod logging;
pub mod raster;

mod engine;
mod error;
mod peel;

pub use array::{ArrayView, DType, Location, RasterOutput, RasterTensor};
pub use buffers::{BufferCapacities, ResizeWorkaround, WorkaroundPolicy};
pub use device::ContextState;
pub use engine::{Engine, EngineConfig};
pub use error::{RasterError, RasterResult};
pub use peel::DepthPeeler;
pub use raster::{RenderRequest, Topology};
