//! Logging setup.
//!
//! The engine itself only emits through the `log` facade; this module is for
//! binaries and test harnesses that want a ready-made `env_logger` backend.

mod init;

pub use init::{init_logging, LoggingConfig};
