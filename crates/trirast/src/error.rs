//! Error types for the rasterization engine.

use thiserror::Error;

/// Result type for engine operations.
pub type RasterResult<T> = Result<T, RasterError>;

/// Errors surfaced by the engine.
///
/// Validation and device-affinity errors are always raised before any device
/// resource is touched.
#[derive(Error, Debug)]
pub enum RasterError {
    #[error("device {index} unavailable ({available} adapter(s) found)")]
    DeviceUnavailable { index: usize, available: usize },

    #[error("failed to create rendering context: {0}")]
    ContextCreation(String),

    #[error("invalid input: {0}")]
    InputValidation(String),

    #[error("`{input}` resides on device {found}, engine is bound to device {engine}")]
    DeviceMismatch {
        input: &'static str,
        found: usize,
        engine: usize,
    },

    #[error("rendering context state: {0}")]
    ContextState(String),

    #[error("device resource allocation failed: {0}")]
    ResourceAllocation(String),

    #[error("resize workaround `{name}` failed: {reason}")]
    PlatformWorkaround { name: &'static str, reason: String },

    #[error("readback failed: {0}")]
    Readback(String),
}

impl RasterError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        RasterError::InputValidation(msg.into())
    }

    pub(crate) fn state(msg: impl Into<String>) -> Self {
        RasterError::ContextState(msg.into())
    }
}
