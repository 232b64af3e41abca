use crate::error::{RasterError, RasterResult};

/// Where an array's storage lives.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Location {
    Host,
    /// Resident on the accelerator with the given adapter index.
    Device(usize),
}

/// Element type of an array.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum DType {
    F32,
    I32,
    I64,
}

impl DType {
    pub fn name(self) -> &'static str {
        match self {
            DType::F32 => "float32",
            DType::I32 => "int32",
            DType::I64 => "int64",
        }
    }
}

#[derive(Debug, Copy, Clone)]
enum Elements<'a> {
    F32(&'a [f32]),
    I32(&'a [i32]),
    I64(&'a [i64]),
}

/// Borrowed, typed, shaped view over caller data.
///
/// This is the engine's boundary with the caller's array library: the view
/// carries everything the renderer checks (dtype, shape, strides, location)
/// without owning the storage. Device-tagged data is staged to the device
/// through the engine's queue.
#[derive(Debug, Clone)]
pub struct ArrayView<'a> {
    elements: Elements<'a>,
    shape: Vec<usize>,
    strides: Option<Vec<usize>>,
    location: Location,
}

impl<'a> ArrayView<'a> {
    pub fn from_f32(data: &'a [f32], shape: &[usize]) -> Self {
        Self::with_elements(Elements::F32(data), shape)
    }

    pub fn from_i32(data: &'a [i32], shape: &[usize]) -> Self {
        Self::with_elements(Elements::I32(data), shape)
    }

    pub fn from_i64(data: &'a [i64], shape: &[usize]) -> Self {
        Self::with_elements(Elements::I64(data), shape)
    }

    fn with_elements(elements: Elements<'a>, shape: &[usize]) -> Self {
        Self {
            elements,
            shape: shape.to_vec(),
            strides: None,
            location: Location::Host,
        }
    }

    /// Tags the view as resident on device `index`.
    pub fn on_device(mut self, index: usize) -> Self {
        self.location = Location::Device(index);
        self
    }

    /// Tags the view as host-resident.
    pub fn on_host(mut self) -> Self {
        self.location = Location::Host;
        self
    }

    /// Overrides the element strides (row-major contiguous when unset).
    pub fn with_strides(mut self, strides: &[usize]) -> Self {
        self.strides = Some(strides.to_vec());
        self
    }

    pub fn dtype(&self) -> DType {
        match self.elements {
            Elements::F32(_) => DType::F32,
            Elements::I32(_) => DType::I32,
            Elements::I64(_) => DType::I64,
        }
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn location(&self) -> Location {
        self.location
    }

    pub fn len(&self) -> usize {
        match self.elements {
            Elements::F32(d) => d.len(),
            Elements::I32(d) => d.len(),
            Elements::I64(d) => d.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// True when the strides are the row-major strides of `shape`.
    pub fn is_contiguous(&self) -> bool {
        match &self.strides {
            None => true,
            Some(strides) => contiguous_strides(&self.shape).is_some_and(|c| c == *strides),
        }
    }

    pub fn as_f32(&self) -> Option<&'a [f32]> {
        match self.elements {
            Elements::F32(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<&'a [i32]> {
        match self.elements {
            Elements::I32(d) => Some(d),
            _ => None,
        }
    }

    /// Checks dtype, contiguity and that the storage covers the shape.
    pub(crate) fn expect_dense(&self, name: &str, dtype: DType) -> RasterResult<()> {
        if self.dtype() != dtype {
            return Err(RasterError::invalid(format!(
                "{name} must be {}, got {}",
                dtype.name(),
                self.dtype().name()
            )));
        }
        if !self.is_contiguous() {
            return Err(RasterError::invalid(format!("{name} must be contiguous")));
        }
        let expected = element_count(&self.shape).ok_or_else(|| {
            RasterError::invalid(format!("{name} shape {:?} overflows the element count", self.shape))
        })?;
        if expected != self.len() {
            return Err(RasterError::invalid(format!(
                "{name} has shape {:?} ({expected} elements) but holds {} elements",
                self.shape,
                self.len()
            )));
        }
        Ok(())
    }
}

/// Product of `shape`, or `None` on overflow.
pub(crate) fn element_count(shape: &[usize]) -> Option<usize> {
    shape.iter().try_fold(1usize, |acc, &d| acc.checked_mul(d))
}

fn contiguous_strides(shape: &[usize]) -> Option<Vec<usize>> {
    let mut strides = vec![1usize; shape.len()];
    for i in (0..shape.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1].checked_mul(shape[i + 1])?;
    }
    Some(strides)
}
