//! Post-resize corrective hooks.
//!
//! Some driver stacks present a blank or stale first frame right after the
//! buffers a draw reads from were reallocated. The hook runs after every
//! growth and before the draw that uses the new buffers.

use crate::device::RenderingContext;
use crate::error::{RasterError, RasterResult};

/// Strategy run after the buffer set has grown.
pub trait ResizeWorkaround: Send {
    fn name(&self) -> &'static str;

    /// Called with the context current on the rendering thread. On return the
    /// context should be current again.
    fn after_resize(&self, ctx: &mut RenderingContext) -> RasterResult<()>;
}

/// Does nothing.
#[derive(Debug, Default, Copy, Clone)]
pub struct NoWorkaround;

impl ResizeWorkaround for NoWorkaround {
    fn name(&self) -> &'static str {
        "none"
    }

    fn after_resize(&self, _ctx: &mut RenderingContext) -> RasterResult<()> {
        Ok(())
    }
}

/// Releases the context, drains the queue and makes the context current again.
#[derive(Debug, Default, Copy, Clone)]
pub struct ReacquireContext;

impl ReacquireContext {
    fn fail(&self, err: RasterError) -> RasterError {
        RasterError::PlatformWorkaround {
            name: self.name(),
            reason: err.to_string(),
        }
    }
}

impl ResizeWorkaround for ReacquireContext {
    fn name(&self) -> &'static str {
        "reacquire-context"
    }

    fn after_resize(&self, ctx: &mut RenderingContext) -> RasterResult<()> {
        ctx.release().map_err(|e| self.fail(e))?;
        let drained = ctx.wait_idle().map_err(|e| self.fail(e));
        ctx.set_current().map_err(|e| self.fail(e))?;
        drained
    }
}

/// Which stock strategy an engine installs.
#[derive(Debug, Default, Copy, Clone, Eq, PartialEq)]
pub enum WorkaroundPolicy {
    /// `ReacquireContext` when running on Windows, otherwise `NoWorkaround`.
    #[default]
    Auto,
    Always,
    Never,
}

impl WorkaroundPolicy {
    pub fn resolve(self) -> Box<dyn ResizeWorkaround> {
        let reacquire = match self {
            WorkaroundPolicy::Auto => std::env::consts::OS == "windows",
            WorkaroundPolicy::Always => true,
            WorkaroundPolicy::Never => false,
        };
        if reacquire {
            Box::new(ReacquireContext)
        } else {
            Box::new(NoWorkaround)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forced_policies_pick_their_strategy() {
        assert_eq!(WorkaroundPolicy::Always.resolve().name(), "reacquire-context");
        assert_eq!(WorkaroundPolicy::Never.resolve().name(), "none");
    }

    #[test]
    fn auto_policy_follows_host_os() {
        let expected = if cfg!(windows) { "reacquire-context" } else { "none" };
        assert_eq!(WorkaroundPolicy::Auto.resolve().name(), expected);
    }
}
