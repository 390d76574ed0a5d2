//! Primitives shared by every courier crate: log bootstrap, log macros and
//! the process-wide lifecycle [`Signal`].

pub mod logging;

pub use tracing;

/// Lifecycle notification broadcast to long-running tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
    Finalised,
}
