use crate::array::{ArrayView, DType, Location};
use crate::buffers::{BufferRequirements, TargetExtent};
use crate::error::{RasterError, RasterResult};

/// Components per vertex (homogeneous clip-space input).
pub const VERTEX_COMPONENTS: usize = 4;

/// Channels of each output buffer.
pub const OUTPUT_CHANNELS: usize = 4;

/// Deepest peeling index a request may ask for. Peeling index `k` costs
/// `k + 1` passes per layer.
pub const MAX_PEELING_INDEX: u32 = 255;

/// Largest triangle count; ids are written as `f32(index + 1)` and stay exact
/// up to 2^24.
pub const MAX_TRIANGLES: usize = 1 << 24;

/// How positions map onto output layers.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Topology {
    /// `[N, V, 4]` positions; layer `n` draws instance `n`.
    Instance,
    /// `[V, 4]` shared positions; layer `r` draws the vertex range `ranges[r]`.
    Range,
}

/// One render call's inputs.
#[derive(Debug, Clone)]
pub struct RenderRequest<'a> {
    /// `[4, 4]` float32, row-major; clip = projection · position.
    pub projection: ArrayView<'a>,
    /// `[N, V, 4]` (instance) or `[V, 4]` (range) float32.
    pub positions: ArrayView<'a>,
    /// `[T, 3]` int32 vertex indices.
    pub triangles: ArrayView<'a>,
    /// `[R, 2]` int32 `(start, count)` rows, host-resident. Range mode only.
    pub ranges: Option<ArrayView<'a>>,
    /// `(height, width)` in pixels.
    pub resolution: (u32, u32),
    /// Which depth layer to extract; 0 is the nearest surface.
    pub peeling_index: u32,
}

impl<'a> RenderRequest<'a> {
    pub fn new(
        projection: ArrayView<'a>,
        positions: ArrayView<'a>,
        triangles: ArrayView<'a>,
        resolution: (u32, u32),
    ) -> Self {
        Self {
            projection,
            positions,
            triangles,
            ranges: None,
            resolution,
            peeling_index: 0,
        }
    }

    pub fn with_ranges(mut self, ranges: ArrayView<'a>) -> Self {
        self.ranges = Some(ranges);
        self
    }

    pub fn with_peeling_index(mut self, peeling_index: u32) -> Self {
        self.peeling_index = peeling_index;
        self
    }

    /// Checks the request against an engine bound to `device_index`.
    ///
    /// Touches no device state; every rejection happens here.
    pub fn validate(&self, device_index: usize) -> RasterResult<ValidatedRequest<'a>> {
        expect_on_device(&self.positions, "pos", device_index)?;
        expect_on_device(&self.triangles, "tri", device_index)?;
        if let Location::Device(found) = self.projection.location() {
            if found != device_index {
                return Err(RasterError::DeviceMismatch {
                    input: "proj",
                    found,
                    engine: device_index,
                });
            }
        }

        let tri_shape = self.triangles.shape();
        if !matches!(*tri_shape, [t, 3] if t > 0) {
            return Err(RasterError::invalid(format!(
                "tri must have shape [>0, 3], got {tri_shape:?}"
            )));
        }
        let triangle_count = tri_shape[0];
        if triangle_count > MAX_TRIANGLES {
            return Err(RasterError::invalid(format!(
                "{triangle_count} triangles exceed the maximum of {MAX_TRIANGLES}"
            )));
        }

        if self.peeling_index > MAX_PEELING_INDEX {
            return Err(RasterError::invalid(format!(
                "peeling index {} exceeds the maximum of {MAX_PEELING_INDEX}",
                self.peeling_index
            )));
        }

        self.projection.expect_dense("proj", DType::F32)?;
        self.positions.expect_dense("pos", DType::F32)?;
        self.triangles.expect_dense("tri", DType::I32)?;

        if self.projection.shape() != [4, 4] {
            return Err(RasterError::invalid(format!(
                "proj must have shape [4, 4], got {:?}",
                self.projection.shape()
            )));
        }

        let pos_shape = self.positions.shape();
        let (topology, vertices_per_layer) = match *pos_shape {
            [n, v, c] => {
                if n == 0 || v == 0 || c != VERTEX_COMPONENTS {
                    return Err(RasterError::invalid(format!(
                        "instance mode - pos must have shape [>0, >0, 4], got {pos_shape:?}"
                    )));
                }
                (Topology::Instance, v)
            }
            [v, c] => {
                if v == 0 || c != VERTEX_COMPONENTS {
                    return Err(RasterError::invalid(format!(
                        "range mode - pos must have shape [>0, 4], got {pos_shape:?}"
                    )));
                }
                (Topology::Range, v)
            }
            _ => {
                return Err(RasterError::invalid(format!(
                    "pos must have rank 2 (range mode) or 3 (instance mode), got {pos_shape:?}"
                )));
            }
        };

        let (height, width) = self.resolution;
        if height == 0 || width == 0 {
            return Err(RasterError::invalid(format!(
                "resolution must be [>0, >0], got [{height}, {width}]"
            )));
        }

        let too_many = || RasterError::invalid("vertex or index count exceeds the 32-bit index range");
        let vertex_count = match topology {
            Topology::Instance => pos_shape[0].checked_mul(pos_shape[1]).ok_or_else(too_many)?,
            Topology::Range => pos_shape[0],
        };
        let index_count = triangle_count.checked_mul(3).ok_or_else(too_many)?;
        if u32::try_from(vertex_count).is_err() || u32::try_from(index_count).is_err() {
            return Err(too_many());
        }

        let (layer_bases, index_limit) = match topology {
            Topology::Instance => {
                if self.ranges.is_some() {
                    log::debug!("instance mode: ranges ignored");
                }
                let bases = (0..pos_shape[0])
                    .map(|n| (n * vertices_per_layer) as u32)
                    .collect();
                (bases, vertices_per_layer as i64)
            }
            Topology::Range => {
                let ranges = self.ranges.as_ref().ok_or_else(|| {
                    RasterError::invalid("range mode - ranges are required")
                })?;
                parse_ranges(ranges, vertex_count)?
            }
        };

        let triangles = self
            .triangles
            .as_i32()
            .ok_or_else(|| RasterError::invalid("tri must be int32"))?;
        if let Some((i, &idx)) = triangles
            .iter()
            .enumerate()
            .find(|&(_, &idx)| idx < 0 || i64::from(idx) >= index_limit)
        {
            return Err(RasterError::invalid(format!(
                "tri[{}][{}] = {idx} is outside the vertex range [0, {index_limit})",
                i / 3,
                i % 3
            )));
        }

        let positions = self
            .positions
            .as_f32()
            .ok_or_else(|| RasterError::invalid("pos must be float32"))?;
        let projection = self
            .projection
            .as_f32()
            .ok_or_else(|| RasterError::invalid("proj must be float32"))?;

        let depth = u32::try_from(layer_bases.len())
            .map_err(|_| RasterError::invalid("too many output layers"))?;

        Ok(ValidatedRequest {
            topology,
            projection: column_major(projection),
            positions,
            triangles,
            layer_bases,
            vertex_count,
            triangle_count,
            width,
            height,
            depth,
            peeling_index: self.peeling_index,
        })
    }
}

fn expect_on_device(view: &ArrayView<'_>, name: &'static str, engine: usize) -> RasterResult<()> {
    match view.location() {
        Location::Device(found) if found == engine => Ok(()),
        Location::Device(found) => Err(RasterError::DeviceMismatch {
            input: name,
            found,
            engine,
        }),
        Location::Host => Err(RasterError::invalid(format!(
            "{name} must be device-resident"
        ))),
    }
}

/// Returns per-layer base vertices and the exclusive bound every triangle
/// index must satisfy (the smallest range count).
fn parse_ranges(ranges: &ArrayView<'_>, vertex_count: usize) -> RasterResult<(Vec<u32>, i64)> {
    if ranges.location() != Location::Host {
        return Err(RasterError::invalid("ranges must reside in host memory"));
    }
    ranges.expect_dense("ranges", DType::I32)?;
    let shape = ranges.shape();
    if !matches!(*shape, [r, 2] if r > 0) {
        return Err(RasterError::invalid(format!(
            "range mode - ranges must have shape [>0, 2], got {shape:?}"
        )));
    }
    let rows = ranges
        .as_i32()
        .ok_or_else(|| RasterError::invalid("ranges must be int32"))?;

    let mut bases = Vec::with_capacity(shape[0]);
    let mut min_count = i64::MAX;
    for (r, row) in rows.chunks_exact(2).enumerate() {
        let (start, count) = (i64::from(row[0]), i64::from(row[1]));
        if start < 0 || count < 0 || start + count > vertex_count as i64 {
            return Err(RasterError::invalid(format!(
                "ranges[{r}] = [{start}, {count}] is outside the vertex buffer [0, {vertex_count})"
            )));
        }
        bases.push(start as u32);
        min_count = min_count.min(count);
    }
    Ok((bases, min_count))
}

fn column_major(m: &[f32]) -> [f32; 16] {
    let mut out = [0.0; 16];
    for r in 0..4 {
        for c in 0..4 {
            out[c * 4 + r] = m[r * 4 + c];
        }
    }
    out
}

/// A request that passed validation, reduced to what the GPU passes need.
#[derive(Debug, Clone)]
pub struct ValidatedRequest<'a> {
    pub topology: Topology,
    /// Column-major, ready for a WGSL `mat4x4<f32>`.
    pub projection: [f32; 16],
    pub positions: &'a [f32],
    pub triangles: &'a [i32],
    /// Base vertex of each output layer.
    pub layer_bases: Vec<u32>,
    pub vertex_count: usize,
    pub triangle_count: usize,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
    pub peeling_index: u32,
}

impl ValidatedRequest<'_> {
    pub fn requirements(&self) -> BufferRequirements {
        // Saturates so an oversized request fails the device limit check.
        let pixels = u64::from(self.width)
            .saturating_mul(u64::from(self.height))
            .saturating_mul(u64::from(self.depth));
        BufferRequirements {
            positions: (self.vertex_count * VERTEX_COMPONENTS) as u64,
            indices: (self.triangle_count * 3) as u64,
            layers: u64::from(self.depth),
            outputs: pixels.saturating_mul(OUTPUT_CHANNELS as u64),
            extent: TargetExtent::new(self.width, self.height, self.depth),
        }
    }

    /// `[depth, height, width, channels]`.
    pub fn output_shape(&self, channels: usize) -> [usize; 4] {
        [
            self.depth as usize,
            self.height as usize,
            self.width as usize,
            channels,
        ]
    }
}
