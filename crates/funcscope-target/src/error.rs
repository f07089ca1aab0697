//! Target-side error types.

use std::path::PathBuf;

use funcscope_core::LayoutError;
use thiserror::Error;

pub type TargetResult<T> = Result<T, TargetError>;

#[derive(Error, Debug)]
pub enum TargetError {
    /// Requested shape rejected before any resource was touched.
    #[error("invalid region shape: {0}")]
    Layout(#[from] LayoutError),

    #[error("checkpoint id {id} out of range (have {count})")]
    InvalidCheckpoint { id: usize, count: usize },

    #[error("exit on checkpoint {0} without a matching enter")]
    UnmatchedExit(usize),

    #[error("expected {expected} checkpoint names, got {actual}")]
    NameCount { expected: usize, actual: usize },

    #[error("checkpoint name {0:?} is empty, too long, or contains NUL")]
    InvalidName(String),

    #[error("malformed mount table line {line}: {reason}")]
    MountTable { line: usize, reason: String },

    #[error("no shared region could be allocated: {0}")]
    RegionUnavailable(std::io::Error),

    #[error("failed to bind attach socket {path}: {source}")]
    Bind {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Nix(#[from] nix::Error),
}
