/// Device-resident `[depth, height, width, channels]` float32 output.
///
/// The tensor owns its buffer; dropping it frees the allocation. A tensor with
/// zero channels holds no allocation at all.
#[derive(Debug)]
pub struct RasterTensor {
    buffer: Option<wgpu::Buffer>,
    shape: [usize; 4],
    device_index: usize,
}

impl RasterTensor {
    pub(crate) fn new(buffer: Option<wgpu::Buffer>, shape: [usize; 4], device_index: usize) -> Self {
        debug_assert_eq!(buffer.is_none(), shape.iter().product::<usize>() == 0);
        Self {
            buffer,
            shape,
            device_index,
        }
    }

    pub fn shape(&self) -> [usize; 4] {
        self.shape
    }

    pub fn depth(&self) -> usize {
        self.shape[0]
    }

    pub fn height(&self) -> usize {
        self.shape[1]
    }

    pub fn width(&self) -> usize {
        self.shape[2]
    }

    pub fn channels(&self) -> usize {
        self.shape[3]
    }

    /// Number of float32 elements.
    pub fn len(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn size_bytes(&self) -> u64 {
        (self.len() * std::mem::size_of::<f32>()) as u64
    }

    pub fn device_index(&self) -> usize {
        self.device_index
    }

    pub fn buffer(&self) -> Option<&wgpu::Buffer> {
        self.buffer.as_ref()
    }

    /// Releases ownership of the underlying buffer.
    pub fn into_buffer(self) -> Option<wgpu::Buffer> {
        self.buffer
    }

    /// Flat index of element `(layer, row, col, channel)`.
    #[inline]
    pub fn offset(&self, layer: usize, row: usize, col: usize, channel: usize) -> usize {
        let [_, h, w, c] = self.shape;
        ((layer * h + row) * w + col) * c + channel
    }
}

/// The two buffers returned by a render.
#[derive(Debug)]
pub struct RasterOutput {
    /// `(u, v, z/w, triangle_id)` per pixel.
    pub raster: RasterTensor,
    /// `(du/dx, du/dy, dv/dx, dv/dy)` per pixel, or zero channels when disabled.
    pub derivatives: RasterTensor,
}
