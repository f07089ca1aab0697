//! # funcscope-target - instrumentation inside the measured process
//!
//! Records per-checkpoint timing samples straight into a shared memory
//! region and hands that region to inspecting tools on request.
//!
//! ## Components
//!
//! | Module       | Role                                                        |
//! |--------------|-------------------------------------------------------------|
//! | `hugepage`   | Finds a usable hugetlbfs mount (table, statfs, probe)      |
//! | `mounts`     | Mount table tokenizer                                       |
//! | `region`     | Large-page or memfd backed shared mapping                   |
//! | `table`      | Header, slots and names over the region                     |
//! | `server`     | Non-blocking attach socket, descriptor hand-off             |
//! | `funcscope`  | The handle: initialize, enter/exit, poll, cleanup           |
//! | `config`     | Defaults plus `FUNCSCOPE_*` environment overrides           |

pub mod config;
pub mod error;
pub mod funcscope;
pub mod hugepage;
pub mod mounts;
pub mod region;
pub mod server;
pub mod table;

pub use config::TargetConfig;
pub use error::{TargetError, TargetResult};
pub use funcscope::{Funcscope, FuncscopeBuilder, ScopeGuard};
pub use region::Backing;
