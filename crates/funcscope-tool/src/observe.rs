//! Periodic observation of attached regions.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use funcscope_core::stats::SampleStats;
use log::warn;

use crate::mapping::MappedRegion;

/// Longest uninterrupted sleep between stop-flag checks.
const STOP_CHECK_SLICE: Duration = Duration::from_millis(50);

/// One attached region plus its names, read once at attach.
pub struct Target {
    pid: i32,
    region: MappedRegion,
    names: Vec<String>,
}

impl Target {
    pub fn new(pid: i32, region: MappedRegion) -> Self {
        let names = (0..region.num_checkpoints())
            .map(|id| region.name(id).unwrap_or_default())
            .collect();
        Self { pid, region, names }
    }

    pub fn pid(&self) -> i32 {
        self.pid
    }

    pub fn region(&self) -> &MappedRegion {
        &self.region
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

/// Statistics for one checkpoint of one target at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct CheckpointReport {
    pub pid: i32,
    pub id: usize,
    pub name: String,
    /// Sample unit, from the region header.
    pub unit: &'static str,
    pub stats: SampleStats,
}

impl fmt::Display for CheckpointReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pid {} [{}] {} unit {}",
            self.pid, self.name, self.stats, self.unit
        )
    }
}

/// Reads every checkpoint of every attached target, one cycle at a time.
pub struct Observer {
    targets: Vec<Target>,
    scratch: Vec<u64>,
}

impl Observer {
    pub fn new(regions: impl IntoIterator<Item = (i32, MappedRegion)>) -> Self {
        Self {
            targets: regions
                .into_iter()
                .map(|(pid, region)| Target::new(pid, region))
                .collect(),
            scratch: Vec::new(),
        }
    }

    pub fn targets(&self) -> &[Target] {
        &self.targets
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Snapshot every checkpoint now.
    ///
    /// Targets in ascending pid order when built from [`attach`](crate::attach),
    /// checkpoints in id order.
    pub fn sample(&mut self) -> Vec<CheckpointReport> {
        let mut reports = Vec::new();
        for target in &self.targets {
            let unit = target.region.clock().unit();
            for (id, name) in target.names.iter().enumerate() {
                let stats = target
                    .region
                    .stats(id, &mut self.scratch)
                    .unwrap_or_default();
                reports.push(CheckpointReport {
                    pid: target.pid,
                    id,
                    name: name.clone(),
                    unit,
                    stats,
                });
            }
        }
        reports
    }

    /// Sleep `interval`, then sample and hand each report to `emit`.
    ///
    /// Runs `repeat` cycles, forever if `repeat <= 0`. A stop request cuts
    /// the current sleep short; the cycle still emits, then the loop ends.
    /// Returns the number of cycles emitted.
    pub fn run<F>(&mut self, interval: Duration, repeat: i64, stop: &AtomicBool, mut emit: F) -> u64
    where
        F: FnMut(&CheckpointReport),
    {
        let mut cycles = 0u64;
        while !stop.load(Ordering::Relaxed) {
            if repeat > 0 && cycles >= repeat as u64 {
                break;
            }
            sleep_unless_stopped(interval, stop);
            for report in self.sample() {
                emit(&report);
            }
            cycles += 1;
        }
        cycles
    }

    /// Unmap every region. All are unmapped even if one fails; the first
    /// failure is returned.
    pub fn detach(self) -> io::Result<()> {
        let mut first = Ok(());
        for target in self.targets {
            if let Err(e) = target.region.unmap() {
                warn!("pid {}: unmap failed: {}", target.pid, e);
                if first.is_ok() {
                    first = Err(e);
                }
            }
        }
        first
    }
}

fn sleep_unless_stopped(interval: Duration, stop: &AtomicBool) {
    let deadline = Instant::now() + interval;
    loop {
        if stop.load(Ordering::Relaxed) {
            return;
        }
        let now = Instant::now();
        if now >= deadline {
            return;
        }
        thread::sleep((deadline - now).min(STOP_CHECK_SLICE));
    }
}
