use crate::array::RasterOutput;
use crate::engine::Engine;
use crate::error::RasterResult;
use crate::raster::RenderRequest;

/// Renders successive depth layers of one scene, nearest first.
///
/// Each call re-renders the scene with the next peeling index. The request's
/// own `peeling_index` is ignored.
pub struct DepthPeeler<'e, 'a> {
    engine: &'e Engine,
    request: RenderRequest<'a>,
    next_layer: u32,
}

impl<'e, 'a> DepthPeeler<'e, 'a> {
    pub fn new(engine: &'e Engine, request: RenderRequest<'a>) -> Self {
        Self {
            engine,
            request,
            next_layer: 0,
        }
    }

    /// Peeling index the next call renders.
    pub fn next_layer(&self) -> u32 {
        self.next_layer
    }

    pub fn rasterize_next_layer(&mut self) -> RasterResult<RasterOutput> {
        let request = self.request.clone().with_peeling_index(self.next_layer);
        let output = self.engine.render(&request)?;
        self.next_layer += 1;
        Ok(output)
    }
}
