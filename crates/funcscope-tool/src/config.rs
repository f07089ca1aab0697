//! Tool configuration: defaults plus environment overrides.

use std::path::PathBuf;
use std::time::Duration;

use funcscope_core::env::env_get;
use funcscope_core::path::DEFAULT_SOCK_DIR;

pub const DEFAULT_ATTACH_TIMEOUT_MS: u64 = 5000;

#[derive(Debug, Clone)]
pub struct AttachConfig {
    /// Directory holding target attach sockets
    pub sock_dir: PathBuf,
    /// Bound on the whole multiplexed wait for descriptors
    pub timeout: Duration,
}

impl Default for AttachConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl AttachConfig {
    /// Environment variables (all optional):
    /// - `FUNCSCOPE_SOCK_DIR` - Attach socket directory
    /// - `FUNCSCOPE_ATTACH_TIMEOUT_MS` - Attach timeout in milliseconds
    pub fn from_env() -> Self {
        Self {
            sock_dir: PathBuf::from(env_get("FUNCSCOPE_SOCK_DIR", DEFAULT_SOCK_DIR.to_string())),
            timeout: Duration::from_millis(env_get(
                "FUNCSCOPE_ATTACH_TIMEOUT_MS",
                DEFAULT_ATTACH_TIMEOUT_MS,
            )),
        }
    }

    pub fn new() -> Self {
        Self {
            sock_dir: PathBuf::from(DEFAULT_SOCK_DIR),
            timeout: Duration::from_millis(DEFAULT_ATTACH_TIMEOUT_MS),
        }
    }

    pub fn sock_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.sock_dir = dir.into();
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
