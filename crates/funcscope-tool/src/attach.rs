//! Multi-target attach.
//!
//! One connection per pid, all registered on a single multiplexer, so the
//! whole batch waits as long as the slowest target and no longer. Each pid
//! ends in its own `Result`; an unreachable target never aborts the rest.

use std::collections::BTreeMap;
use std::os::fd::AsFd;
use std::os::unix::net::UnixStream;
use std::time::Instant;

use funcscope_core::path::sock_path;
use log::{debug, info, warn};

use crate::client::{connect_nonblocking, try_recv_region, Received};
use crate::config::AttachConfig;
use crate::error::AttachError;
use crate::mapping::MappedRegion;
use crate::mux::Multiplexer;

/// Per-pid outcome of [`attach`].
pub type AttachResults = BTreeMap<i32, Result<MappedRegion, AttachError>>;

/// A connection still waiting for its descriptor.
struct PendingTarget {
    pid: i32,
    stream: UnixStream,
}

/// Attach to every pid in `pids`.
///
/// Duplicates are collapsed. The returned map holds one entry per distinct
/// pid. The outer error is reserved for failing to create the multiplexer
/// or to wait on it; everything target-specific lands in the map.
pub fn attach(pids: &[i32], config: &AttachConfig) -> Result<AttachResults, AttachError> {
    let mut results = AttachResults::new();
    let mut pending: Vec<Option<PendingTarget>> = Vec::new();

    let mut distinct: Vec<i32> = pids.to_vec();
    distinct.sort_unstable();
    distinct.dedup();
    let total = distinct.len();

    let mut mux = Multiplexer::new(total.max(1))?;

    for &pid in &distinct {
        if pid <= 0 {
            results.insert(pid, Err(AttachError::InvalidPid(pid)));
            continue;
        }
        let path = sock_path(&config.sock_dir, pid);
        let stream = match connect_nonblocking(&path) {
            Ok(stream) => stream,
            Err(source) => {
                results.insert(pid, Err(AttachError::Connect { path, source }));
                continue;
            }
        };
        let token = pending.len() as u64;
        if let Err(e) = mux.register(stream.as_fd(), token) {
            results.insert(pid, Err(AttachError::Io(e)));
            continue;
        }
        debug!("pid {}: connected to {}", pid, path.display());
        pending.push(Some(PendingTarget { pid, stream }));
    }

    let mut outstanding = pending.len();
    let mut attached = 0usize;
    let deadline = Instant::now() + config.timeout;
    let mut ready = Vec::with_capacity(pending.len());

    while outstanding > 0 {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        ready.clear();
        mux.wait(deadline - now, &mut ready)?;

        for &token in &ready {
            let idx = token as usize;
            let Some(target) = pending.get_mut(idx).and_then(Option::take) else {
                continue;
            };
            let outcome = match try_recv_region(&target.stream) {
                Ok(Received::NotYet) => {
                    pending[idx] = Some(target);
                    continue;
                }
                Ok(Received::Descriptor(fd)) => MappedRegion::map(fd),
                Ok(Received::Closed) => Err(AttachError::NoDescriptor),
                Err(e) => Err(AttachError::Recv(e)),
            };
            // The stream closes right after; a failed deregister is moot.
            let _ = mux.deregister(target.stream.as_fd());
            outstanding -= 1;

            match &outcome {
                Ok(region) => {
                    attached += 1;
                    info!("[+] attached pid {} ({}/{})", target.pid, attached, total);
                    debug!(
                        "pid {}: {} checkpoints, {} bytes, samples in {}",
                        target.pid,
                        region.num_checkpoints(),
                        region.len(),
                        region.clock().unit()
                    );
                }
                Err(e) => warn!("pid {}: {}", target.pid, e),
            }
            results.insert(target.pid, outcome);
        }
    }

    for target in pending.into_iter().flatten() {
        warn!("pid {}: no descriptor within {:?}", target.pid, config.timeout);
        results.insert(target.pid, Err(AttachError::Timeout(config.timeout)));
    }

    Ok(results)
}
