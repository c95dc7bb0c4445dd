//! Shared plumbing for the broadside crates: logging setup, span-wrapping
//! log macros and the process-wide shutdown signal.

pub mod logging;

pub use tracing;

/// Lifecycle signal broadcast to every long-running component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Shutdown,
    Finalised,
}
