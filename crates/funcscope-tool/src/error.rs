//! Tool-side error types.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use funcscope_core::LayoutError;
use thiserror::Error;

/// Why one target could not be attached.
///
/// Reported per pid; one failing target never aborts a batch.
#[derive(Error, Debug)]
pub enum AttachError {
    #[error("invalid pid {0}")]
    InvalidPid(i32),

    #[error("connect {path}: {source}")]
    Connect {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("target closed the connection without sending a descriptor")]
    NoDescriptor,

    #[error("receiving descriptor: {0}")]
    Recv(#[source] io::Error),

    #[error("no descriptor within {0:?}")]
    Timeout(Duration),

    #[error("mapping region: {0}")]
    Map(#[source] io::Error),

    #[error("region layout: {0}")]
    Layout(#[from] LayoutError),

    #[error(transparent)]
    Io(#[from] io::Error),
}
