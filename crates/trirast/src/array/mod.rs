//! Boundary types shared with the caller's array layer.
//!
//! - `ArrayView`: borrowed, typed, shaped, device-tagged input
//! - `RasterTensor`: owned device-resident output

mod tensor;
mod view;

pub use tensor::{RasterOutput, RasterTensor};
pub use view::{ArrayView, DType, Location};
