//! Shadow subsystem errors

use crate::device::{DeviceError, FramebufferStatus};
use crate::shadow::ShadowKind;

/// Errors reported by the shadow subsystem.
///
/// None of these are fatal to a frame: callers degrade to fewer shadows, or
/// to no shadows at all.
#[derive(Debug, thiserror::Error)]
pub enum ShadowError {
    #[error("shadow system is not initialized")]
    NotInitialized,

    #[error("failed to load {program} shadow program")]
    ShaderLoad {
        program: &'static str,
        #[source]
        source: DeviceError,
    },

    #[error("no free {kind} shadow slot (capacity {capacity})")]
    NoFreeSlot { kind: ShadowKind, capacity: usize },

    #[error("failed to allocate shadow {what}")]
    AllocationFailed {
        what: &'static str,
        #[source]
        source: DeviceError,
    },

    #[error("shadow framebuffer incomplete: {status}")]
    FramebufferIncomplete { status: FramebufferStatus },

    #[error("{0} lights are shadowed by cube maps, not 2D maps")]
    NotAFlatMap(ShadowKind),

    #[error("invalid shadow quality {0}, expected 0, 1 or 2")]
    InvalidQuality(u8),
}

/// Result type for shadow operations.
pub type Result<T> = std::result::Result<T, ShadowError>;
