//! Attach socket naming.
//!
//! A target listens on `<dir>/funcscope.<pid>.sock`. Knowing the pid is
//! all a tool needs to find it.

use std::path::{Path, PathBuf};

/// Default directory for attach sockets.
pub const DEFAULT_SOCK_DIR: &str = "/tmp";

/// Socket path for `pid` under `dir`.
pub fn sock_path(dir: &Path, pid: i32) -> PathBuf {
    dir.join(format!("funcscope.{}.sock", pid))
}
