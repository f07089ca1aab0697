//! Region layout validation errors.

use thiserror::Error;

/// Reasons a mapped region cannot be interpreted.
///
/// Raised on the tool side before any slot is read, and on the target
/// side when a requested shape is out of range.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    #[error("bad region magic {0:#010x}")]
    BadMagic(u32),

    #[error("unsupported region version {0}")]
    UnsupportedVersion(u32),

    #[error("checkpoint count {0} out of range 1..={max}", max = crate::layout::MAX_CHECKPOINTS)]
    CheckpointCount(i64),

    #[error("ring capacity {0} out of range 1..={max}", max = crate::layout::MAX_RING_CAPACITY)]
    RingCapacity(u64),

    #[error("unknown clock source {0}")]
    UnknownClock(u32),

    #[error("region too small: layout needs {needed} bytes, have {actual}")]
    TooSmall { needed: usize, actual: usize },
}
