//! # funcscope-core - Shared definitions for both sides of funcscope
//!
//! The instrumented target and the inspecting tool never share code at
//! runtime, only memory. This crate is the contract between them:
//!
//! - [`layout`]: byte layout of the shared region (header, slots, names).
//! - [`slot`]: single-producer ring slot accessors and the wrap-aware
//!   sample window.
//! - [`stats`]: descriptive statistics over a sample window.
//! - [`clock`]: timestamp source used by the recording entry points.
//! - [`path`]: pid-derived attach socket path.
//! - [`fdpass`]: descriptor transfer over a local socket.
//! - [`env`]: environment variable helpers used by the config layers.
//!
//! All multi-byte fields use native byte order. The region is only ever
//! shared between processes on the same host and architecture.

pub mod clock;
pub mod env;
pub mod error;
pub mod fdpass;
pub mod layout;
pub mod path;
pub mod slot;
pub mod stats;

pub use clock::ClockSource;
pub use error::LayoutError;
pub use layout::{RegionHeader, RegionLayout};
pub use slot::{SlotRef, SlotWriter};
pub use stats::SampleStats;
