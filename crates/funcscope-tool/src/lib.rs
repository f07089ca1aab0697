//! # funcscope-tool - Attach to live targets and read their checkpoints
//!
//! The tool side never signals or stops a target. It connects to each
//! target's attach socket, receives the region descriptor, maps it
//! read-only, and computes statistics from whatever the ring holds at
//! that moment.
//!
//! ## Module Structure
//!
//! | Module | Purpose |
//! |--------|---------|
//! | `client` | Non-blocking connect, descriptor receive |
//! | `mux` | epoll readiness multiplexer |
//! | `attach` | Multi-target attach orchestration |
//! | `mapping` | Read-only region mapping and header validation |
//! | `observe` | Periodic observation loop |
//! | `pid` | Process id validation |
//! | `config` | Tool configuration |
//! | `error` | Error types |
//!
//! ```ignore
//! let config = AttachConfig::from_env();
//! let results = attach(&[pid], &config)?;
//! let mut observer = Observer::new(
//!     results.into_iter().filter_map(|(pid, r)| r.ok().map(|m| (pid, m))),
//! );
//! for report in observer.sample() {
//!     println!("{report}");
//! }
//! ```

pub mod attach;
pub mod client;
pub mod config;
pub mod error;
pub mod mapping;
pub mod mux;
pub mod observe;
pub mod pid;

pub use attach::{attach, AttachResults};
pub use config::AttachConfig;
pub use error::AttachError;
pub use mapping::MappedRegion;
pub use observe::{CheckpointReport, Observer, Target};
pub use pid::{parse_pid, pid_exists};

/// Most pids one tool invocation will track.
pub const MAX_TARGETS: usize = 32;
