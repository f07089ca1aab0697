//! Library defaults for target configuration.

use funcscope_core::layout::DEFAULT_RING_CAPACITY;

pub const RING_CAPACITY: u32 = DEFAULT_RING_CAPACITY;
pub const SOCK_DIR: &str = funcscope_core::path::DEFAULT_SOCK_DIR;
pub const HUGEPAGES: bool = true;
pub const MOUNTS_PATH: &str = "/proc/self/mounts";
