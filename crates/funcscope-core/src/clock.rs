//! Timestamp source for the recording entry points.
//!
//! The hot path reads a free-running counter: the TSC on x86_64, the
//! virtual counter on aarch64, or `CLOCK_MONOTONIC` elsewhere. None of
//! these enter the kernel (the monotonic clock is served from the vDSO).

use std::fmt;
use std::str::FromStr;

/// Unit of recorded samples. Stored in the region header.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ClockSource {
    /// Raw architecture cycle counter ticks.
    Cycles = 1,
    /// Monotonic nanoseconds.
    Nanos = 2,
}

impl ClockSource {
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            1 => Some(ClockSource::Cycles),
            2 => Some(ClockSource::Nanos),
            _ => None,
        }
    }

    /// Best source for this architecture.
    pub const fn preferred() -> Self {
        if HAS_CYCLE_COUNTER {
            ClockSource::Cycles
        } else {
            ClockSource::Nanos
        }
    }

    /// Resolve a requested source against what the architecture offers.
    pub const fn effective(self) -> Self {
        match self {
            ClockSource::Cycles if !HAS_CYCLE_COUNTER => ClockSource::Nanos,
            other => other,
        }
    }

    /// Short unit label for reports.
    pub fn unit(&self) -> &'static str {
        match self {
            ClockSource::Cycles => "cycles",
            ClockSource::Nanos => "ns",
        }
    }

    /// Current timestamp in this source's unit.
    #[inline(always)]
    pub fn now(self) -> u64 {
        match self {
            ClockSource::Cycles => cycles(),
            ClockSource::Nanos => monotonic_ns(),
        }
    }
}

impl fmt::Display for ClockSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClockSource::Cycles => write!(f, "cycles"),
            ClockSource::Nanos => write!(f, "nanos"),
        }
    }
}

impl FromStr for ClockSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cycles" | "tsc" => Ok(ClockSource::Cycles),
            "nanos" | "ns" | "monotonic" => Ok(ClockSource::Nanos),
            other => Err(format!("unknown clock source: {}", other)),
        }
    }
}

cfg_if::cfg_if! {
    if #[cfg(target_arch = "x86_64")] {
        const HAS_CYCLE_COUNTER: bool = true;

        #[inline(always)]
        fn cycles() -> u64 {
            // Safety: RDTSC is available on every x86_64 CPU.
            unsafe { core::arch::x86_64::_rdtsc() }
        }
    } else if #[cfg(target_arch = "aarch64")] {
        const HAS_CYCLE_COUNTER: bool = true;

        #[inline(always)]
        fn cycles() -> u64 {
            let v: u64;
            // Safety: CNTVCT_EL0 is readable from EL0 on Linux.
            unsafe { core::arch::asm!("mrs {}, cntvct_el0", out(reg) v, options(nomem, nostack)) };
            v
        }
    } else {
        const HAS_CYCLE_COUNTER: bool = false;

        #[inline(always)]
        fn cycles() -> u64 {
            monotonic_ns()
        }
    }
}

#[inline(always)]
fn monotonic_ns() -> u64 {
    let mut ts = libc::timespec { tv_sec: 0, tv_nsec: 0 };
    // Safety: ts is a valid out-pointer; CLOCK_MONOTONIC always exists.
    unsafe { libc::clock_gettime(libc::CLOCK_MONOTONIC, &mut ts) };
    ts.tv_sec as u64 * 1_000_000_000 + ts.tv_nsec as u64
}
