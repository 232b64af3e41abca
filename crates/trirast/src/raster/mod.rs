//! Request validation, rasterization passes and result copies.

mod copier;
mod pipeline;
mod renderer;
mod request;

pub use copier::ResultCopier;
pub use renderer::RasterRenderer;
pub use request::{
    RenderRequest, Topology, ValidatedRequest, MAX_PEELING_INDEX, MAX_TRIANGLES, OUTPUT_CHANNELS,
    VERTEX_COMPONENTS,
};
