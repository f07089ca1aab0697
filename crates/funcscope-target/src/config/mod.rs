//! Target configuration
//!
//! Library defaults with runtime environment overrides.
//!
//! # Example
//!
//! ```rust,ignore
//! use funcscope_target::config::TargetConfig;
//!
//! // Defaults with env overrides
//! let config = TargetConfig::from_env();
//!
//! // Or customize programmatically
//! let config = TargetConfig::from_env()
//!     .ring_capacity(1024)
//!     .hugepages(false);
//! ```

pub mod defaults;

use std::path::PathBuf;

use funcscope_core::clock::ClockSource;
use funcscope_core::env::{env_get, env_get_bool, env_get_opt};

/// Target configuration with builder pattern.
#[derive(Debug, Clone)]
pub struct TargetConfig {
    /// Samples kept per checkpoint
    pub ring_capacity: u32,
    /// Directory holding the attach socket
    pub sock_dir: PathBuf,
    /// Sample unit
    pub clock: ClockSource,
    /// Try a large-page backing before the fallback
    pub hugepages: bool,
    /// Mount table consulted for large-page filesystems
    pub mounts_path: PathBuf,
    /// Id the attach socket is named after. `None` = own pid.
    pub endpoint_id: Option<i32>,
}

impl Default for TargetConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

impl TargetConfig {
    /// Create config from defaults with environment overrides.
    ///
    /// Environment variables (all optional):
    /// - `FUNCSCOPE_RING_CAPACITY` - Samples kept per checkpoint
    /// - `FUNCSCOPE_SOCK_DIR` - Attach socket directory
    /// - `FUNCSCOPE_CLOCK` - `cycles` or `nanos`
    /// - `FUNCSCOPE_HUGEPAGES` - Try large pages (0/1)
    pub fn from_env() -> Self {
        Self {
            ring_capacity: env_get("FUNCSCOPE_RING_CAPACITY", defaults::RING_CAPACITY),
            sock_dir: PathBuf::from(env_get("FUNCSCOPE_SOCK_DIR", defaults::SOCK_DIR.to_string())),
            clock: env_get_opt::<ClockSource>("FUNCSCOPE_CLOCK")
                .unwrap_or_else(ClockSource::preferred)
                .effective(),
            hugepages: env_get_bool("FUNCSCOPE_HUGEPAGES", defaults::HUGEPAGES),
            mounts_path: PathBuf::from(defaults::MOUNTS_PATH),
            endpoint_id: None,
        }
    }

    /// Create config with library defaults only (no env override).
    pub fn new() -> Self {
        Self {
            ring_capacity: defaults::RING_CAPACITY,
            sock_dir: PathBuf::from(defaults::SOCK_DIR),
            clock: ClockSource::preferred(),
            hugepages: defaults::HUGEPAGES,
            mounts_path: PathBuf::from(defaults::MOUNTS_PATH),
            endpoint_id: None,
        }
    }

    // Builder methods

    pub fn ring_capacity(mut self, n: u32) -> Self {
        self.ring_capacity = n;
        self
    }

    pub fn sock_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.sock_dir = dir.into();
        self
    }

    pub fn clock(mut self, clock: ClockSource) -> Self {
        self.clock = clock.effective();
        self
    }

    pub fn hugepages(mut self, enable: bool) -> Self {
        self.hugepages = enable;
        self
    }

    pub fn mounts_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.mounts_path = path.into();
        self
    }

    pub fn endpoint_id(mut self, id: i32) -> Self {
        self.endpoint_id = Some(id);
        self
    }

    /// Id the attach socket is named after.
    pub fn resolved_endpoint_id(&self) -> i32 {
        self.endpoint_id.unwrap_or_else(|| std::process::id() as i32)
    }
}
