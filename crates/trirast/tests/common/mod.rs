#![allow(dead_code)]

use trirast::logging::{init_logging, LoggingConfig};
use trirast::{ArrayView, Engine, EngineConfig, RasterError, RenderRequest};

pub const RES: (u32, u32) = (64, 64);

pub const IDENTITY: [f32; 16] = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// `[[0,0,0,1],[1,0,0,1],[0,1,0,1]]`
pub const TRI: [f32; 12] = [
    0.0, 0.0, 0.0, 1.0, //
    1.0, 0.0, 0.0, 1.0, //
    0.0, 1.0, 0.0, 1.0,
];

pub const TRI_IDX: [i32; 3] = [0, 1, 2];

/// Engine on device 0, or `None` (with a note) when the host has no usable
/// adapter.
pub fn engine(config: EngineConfig) -> Option<Engine> {
    init_logging(LoggingConfig {
        is_test: true,
        ..Default::default()
    });
    match Engine::create(config) {
        Ok(engine) => Some(engine),
        Err(e @ (RasterError::DeviceUnavailable { .. } | RasterError::ContextCreation(_))) => {
            println!("skipping: no GPU available ({e})");
            None
        }
        Err(e) => panic!("unexpected engine creation failure: {e}"),
    }
}

pub fn automatic(double_buffered_derivatives: bool) -> Option<Engine> {
    engine(EngineConfig {
        double_buffered_derivatives,
        ..Default::default()
    })
}

pub fn manual() -> Option<Engine> {
    engine(EngineConfig {
        automatic_lifecycle: false,
        ..Default::default()
    })
}

/// Instance-mode request over `[n, v, 4]` positions.
pub fn instance<'a>(
    engine: &Engine,
    pos: &'a [f32],
    n: usize,
    tri: &'a [i32],
    resolution: (u32, u32),
) -> RenderRequest<'a> {
    let dev = engine.device_index();
    RenderRequest::new(
        ArrayView::from_f32(&IDENTITY, &[4, 4]),
        ArrayView::from_f32(pos, &[n, pos.len() / (4 * n), 4]).on_device(dev),
        ArrayView::from_i32(tri, &[tri.len() / 3, 3]).on_device(dev),
        resolution,
    )
}

/// Range-mode request over shared `[v, 4]` positions.
pub fn ranged<'a>(
    engine: &Engine,
    pos: &'a [f32],
    tri: &'a [i32],
    ranges: &'a [i32],
    resolution: (u32, u32),
) -> RenderRequest<'a> {
    let dev = engine.device_index();
    RenderRequest::new(
        ArrayView::from_f32(&IDENTITY, &[4, 4]),
        ArrayView::from_f32(pos, &[pos.len() / 4, 4]).on_device(dev),
        ArrayView::from_i32(tri, &[tri.len() / 3, 3]).on_device(dev),
        resolution,
    )
    .with_ranges(ArrayView::from_i32(ranges, &[ranges.len() / 2, 2]))
}
