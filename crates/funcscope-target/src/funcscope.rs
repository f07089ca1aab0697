//! `Funcscope` - the target-side handle.
//!
//! Returned by initialization and threaded through every later call;
//! there is no process-wide global. Owns the region, the checkpoint
//! table over it, and the attach server that hands the region out.
//!
//! ```rust,ignore
//! let fs = FuncscopeBuilder::with_names(["parse", "render"]).build()?;
//! loop {
//!     fs.poll_every_n(65536);
//!     fs.enter(0)?;
//!     parse();
//!     fs.exit(0)?;
//! }
//! ```

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use funcscope_core::clock::ClockSource;
use funcscope_core::layout::{encode_name, RegionHeader, RegionLayout, NAME_LEN};
use funcscope_core::stats::SampleStats;
use log::debug;

use crate::config::TargetConfig;
use crate::error::{TargetError, TargetResult};
use crate::region::{Backing, Region};
use crate::server::AttachServer;
use crate::table::CheckpointTable;

/// Builder for a [`Funcscope`] handle.
///
/// All validation happens before any file, mapping or socket is created.
#[derive(Debug, Clone)]
pub struct FuncscopeBuilder {
    count: i64,
    names: Option<Vec<String>>,
    config: Option<TargetConfig>,
}

impl FuncscopeBuilder {
    /// `num_checkpoints` slots named `checkpoint_<id>`.
    pub fn new(num_checkpoints: i64) -> Self {
        Self {
            count: num_checkpoints,
            names: None,
            config: None,
        }
    }

    /// One slot per name, ids in iteration order.
    pub fn with_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        Self {
            count: names.len() as i64,
            names: Some(names),
            config: None,
        }
    }

    /// Override the environment-derived configuration.
    pub fn config(mut self, config: TargetConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn build(self) -> TargetResult<Funcscope> {
        let config = self.config.unwrap_or_else(TargetConfig::from_env);
        let layout = RegionLayout::new(self.count, config.ring_capacity)?;
        let names = encode_names(self.names, layout.num_checkpoints())?;

        let region = Region::allocate(layout.total_size(), &config)?;
        // Safety: fresh zeroed mapping of at least total_size bytes, page
        // aligned, not yet visible to any tool.
        let table = unsafe { CheckpointTable::init(region.base(), layout, config.clock, &names) };
        let server = AttachServer::bind(&config.sock_dir, config.resolved_endpoint_id())?;

        debug!(
            "funcscope: {} checkpoints x {} samples ({} bytes, {:?})",
            layout.num_checkpoints(),
            layout.ring_capacity(),
            layout.total_size(),
            region.backing()
        );

        Ok(Funcscope {
            server,
            table,
            region,
            clock: config.clock,
            starts: (0..layout.num_checkpoints()).map(|_| AtomicU64::new(0)).collect(),
        })
    }
}

fn encode_names(names: Option<Vec<String>>, count: usize) -> TargetResult<Vec<[u8; NAME_LEN]>> {
    let names = names.unwrap_or_else(|| (0..count).map(|id| format!("checkpoint_{}", id)).collect());
    if names.len() != count {
        return Err(TargetError::NameCount {
            expected: count,
            actual: names.len(),
        });
    }
    names
        .into_iter()
        .map(|name| match encode_name(&name) {
            Some(raw) if !name.is_empty() => Ok(raw),
            _ => Err(TargetError::InvalidName(name)),
        })
        .collect()
}

/// Target-side instrumentation handle.
///
/// `enter`/`exit`/`record` never lock, allocate, log or enter the
/// kernel. Each checkpoint expects one writer at a time; concurrent
/// writers to the same id lose samples (never memory safety).
pub struct Funcscope {
    // Field order is drop order: stop handing out the region before
    // unmapping it.
    server: AttachServer,
    table: CheckpointTable,
    region: Region,
    clock: ClockSource,
    starts: Box<[AtomicU64]>,
}

impl Funcscope {
    /// `num_checkpoints` default-named checkpoints, configuration from
    /// the environment. Valid range is `1..=127`.
    pub fn initialize(num_checkpoints: i32) -> TargetResult<Self> {
        FuncscopeBuilder::new(num_checkpoints as i64).build()
    }

    /// Mark the start of checkpoint `id`.
    #[inline(always)]
    pub fn enter(&self, id: usize) -> TargetResult<()> {
        let start = self.start(id)?;
        start.store(self.clock.now(), Ordering::Relaxed);
        Ok(())
    }

    /// Close checkpoint `id`, record and return the elapsed time.
    #[inline(always)]
    pub fn exit(&self, id: usize) -> TargetResult<u64> {
        let now = self.clock.now();
        let start_cell = self.start(id)?;
        let start = start_cell.load(Ordering::Relaxed);
        if start == 0 {
            return Err(TargetError::UnmatchedExit(id));
        }
        start_cell.store(0, Ordering::Relaxed);

        let elapsed = now.saturating_sub(start);
        self.table.slot(id)?.publish(elapsed);
        Ok(elapsed)
    }

    /// Append an externally measured sample to checkpoint `id`.
    #[inline(always)]
    pub fn record(&self, id: usize, value: u64) -> TargetResult<()> {
        self.table.slot(id)?.publish(value);
        Ok(())
    }

    /// `enter(id)` now, `exit(id)` when the guard drops.
    pub fn scope(&self, id: usize) -> TargetResult<ScopeGuard<'_>> {
        self.enter(id)?;
        Ok(ScopeGuard { scope: self, id })
    }

    /// Serve pending attach requests, checking at most once per `n`
    /// calls. Call from the workload loop; never blocks.
    #[inline]
    pub fn poll_every_n(&self, n: u64) -> usize {
        self.server.poll_every_n(n, self.region.fd())
    }

    /// Statistics over this process's own samples for `id`.
    pub fn stats(&self, id: usize) -> TargetResult<SampleStats> {
        let slot = self.table.slot(id)?;
        Ok(SampleStats::from_slot(&slot, &mut Vec::new()))
    }

    /// Id of the checkpoint called `name`.
    pub fn checkpoint_id(&self, name: &str) -> Option<usize> {
        (0..self.num_checkpoints()).find(|&id| self.table.name(id).as_deref() == Some(name))
    }

    pub fn name(&self, id: usize) -> Option<String> {
        self.table.name(id)
    }

    pub fn num_checkpoints(&self) -> usize {
        self.table.layout().num_checkpoints()
    }

    pub fn layout(&self) -> &RegionLayout {
        self.table.layout()
    }

    pub fn header(&self) -> RegionHeader {
        self.table.header()
    }

    pub fn clock(&self) -> ClockSource {
        self.clock
    }

    pub fn backing(&self) -> Backing {
        self.region.backing()
    }

    /// Bytes mapped (the backing may round the layout size up).
    pub fn region_len(&self) -> usize {
        self.region.len()
    }

    pub fn sock_path(&self) -> &Path {
        self.server.path()
    }

    /// Unlink the attach socket and release the region.
    ///
    /// Tools that already attached keep their mapping; the pages live
    /// until the last mapping goes away.
    pub fn cleanup(self) -> TargetResult<()> {
        let Funcscope { server, table, region, .. } = self;
        let sock = server.shutdown();
        drop(table);
        let mem = region.release();
        sock.and(mem)
    }

    #[inline(always)]
    fn start(&self, id: usize) -> TargetResult<&AtomicU64> {
        self.starts.get(id).ok_or(TargetError::InvalidCheckpoint {
            id,
            count: self.starts.len(),
        })
    }
}

/// RAII pairing of [`Funcscope::enter`] and [`Funcscope::exit`].
pub struct ScopeGuard<'a> {
    scope: &'a Funcscope,
    id: usize,
}

impl Drop for ScopeGuard<'_> {
    #[inline(always)]
    fn drop(&mut self) {
        // id was validated by enter; a nested scope on the same id may
        // already have consumed the start mark.
        let _ = self.scope.exit(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use funcscope_core::path::sock_path;

    fn test_config(dir: &Path, id: i32) -> TargetConfig {
        TargetConfig::new()
            .hugepages(false)
            .sock_dir(dir)
            .endpoint_id(id)
            .ring_capacity(16)
            .clock(ClockSource::Nanos)
    }

    #[test]
    fn test_every_valid_count_initializes() {
        let dir = tempfile::tempdir().unwrap();
        for n in 1..=127i64 {
            let fs = FuncscopeBuilder::new(n)
                .config(test_config(dir.path(), n as i32))
                .build()
                .unwrap();
            assert_eq!(fs.header().num_checkpoints as i64, n);
            assert_eq!(fs.num_checkpoints() as i64, n);
            fs.cleanup().unwrap();
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_invalid_count_touches_nothing() {
        let dir = tempfile::tempdir().unwrap();
        for n in [-5i64, 0, 128, 255] {
            let err = FuncscopeBuilder::new(n)
                .config(test_config(dir.path(), 1))
                .build()
                .err()
                .unwrap();
            assert!(matches!(err, TargetError::Layout(_)));
            assert!(!sock_path(dir.path(), 1).exists());
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_bad_names_touch_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let long = "n".repeat(NAME_LEN);
        for names in [vec!["ok", ""], vec!["ok", long.as_str()]] {
            let err = FuncscopeBuilder::with_names(names)
                .config(test_config(dir.path(), 2))
                .build()
                .err()
                .unwrap();
            assert!(matches!(err, TargetError::InvalidName(_)));
        }
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_enter_exit_records_one_sample() {
        let dir = tempfile::tempdir().unwrap();
        let fs = FuncscopeBuilder::with_names(["work"])
            .config(test_config(dir.path(), 3))
            .build()
            .unwrap();

        fs.enter(0).unwrap();
        std::hint::black_box((0..1000u64).sum::<u64>());
        let elapsed = fs.exit(0).unwrap();

        let stats = fs.stats(0).unwrap();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.avg, elapsed as f64);
        assert_eq!(stats.min, elapsed);
    }

    #[test]
    fn test_out_of_range_id_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let fs = FuncscopeBuilder::new(2)
            .config(test_config(dir.path(), 4))
            .build()
            .unwrap();
        assert!(matches!(fs.enter(2), Err(TargetError::InvalidCheckpoint { id: 2, count: 2 })));
        assert!(fs.exit(7).is_err());
        assert!(fs.record(2, 1).is_err());
        assert!(fs.scope(99).is_err());
    }

    #[test]
    fn test_exit_without_enter_records_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let fs = FuncscopeBuilder::new(1)
            .config(test_config(dir.path(), 5))
            .build()
            .unwrap();
        assert!(matches!(fs.exit(0), Err(TargetError::UnmatchedExit(0))));
        assert_eq!(fs.stats(0).unwrap().count, 0);
    }

    #[test]
    fn test_scope_guard_records_on_drop() {
        let dir = tempfile::tempdir().unwrap();
        let fs = FuncscopeBuilder::new(1)
            .config(test_config(dir.path(), 6))
            .build()
            .unwrap();
        for _ in 0..3 {
            let _g = fs.scope(0).unwrap();
        }
        assert_eq!(fs.stats(0).unwrap().count, 3);
    }

    #[test]
    fn test_ring_wrap_keeps_latest_window() {
        let dir = tempfile::tempdir().unwrap();
        let fs = FuncscopeBuilder::new(1)
            .config(test_config(dir.path(), 7))
            .build()
            .unwrap();
        for v in 0..(16 + 5) {
            fs.record(0, v).unwrap();
        }
        let stats = fs.stats(0).unwrap();
        assert_eq!(stats.count, 16);
        assert_eq!(stats.min, 5);
        assert_eq!(stats.max, 20);
    }

    #[test]
    fn test_names_and_lookup() {
        let dir = tempfile::tempdir().unwrap();
        let fs = FuncscopeBuilder::with_names(["alpha", "beta"])
            .config(test_config(dir.path(), 8))
            .build()
            .unwrap();
        assert_eq!(fs.checkpoint_id("beta"), Some(1));
        assert_eq!(fs.checkpoint_id("gamma"), None);
        assert_eq!(fs.name(0).as_deref(), Some("alpha"));

        let fs2 = FuncscopeBuilder::new(2)
            .config(test_config(dir.path(), 9))
            .build()
            .unwrap();
        assert_eq!(fs2.name(1).as_deref(), Some("checkpoint_1"));
    }

    #[test]
    fn test_cleanup_unlinks_socket() {
        let dir = tempfile::tempdir().unwrap();
        let fs = FuncscopeBuilder::new(1)
            .config(test_config(dir.path(), 10))
            .build()
            .unwrap();
        let path = fs.sock_path().to_path_buf();
        assert!(path.exists());
        fs.cleanup().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn test_drop_unlinks_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = {
            let fs = FuncscopeBuilder::new(1)
                .config(test_config(dir.path(), 11))
                .build()
                .unwrap();
            fs.sock_path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_second_handle_on_same_endpoint_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let first = FuncscopeBuilder::new(1)
            .config(test_config(dir.path(), 12))
            .build()
            .unwrap();

        let err = FuncscopeBuilder::new(1)
            .config(test_config(dir.path(), 12))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, TargetError::Bind { .. }));

        // The refused build must not take the live handle's path with it.
        let path = first.sock_path().to_path_buf();
        assert!(path.exists());
        assert!(std::os::unix::net::UnixStream::connect(&path).is_ok());
        first.cleanup().unwrap();
        assert!(!path.exists());
    }
}
