//! `AttachServer` - hands the region descriptor to attaching tools.
//!
//! The listener is non-blocking and is only ever touched from
//! [`AttachServer::poll_every_n`], which the workload calls from its own
//! loop. There is no server thread. Protocol per connection: accept,
//! send one `SCM_RIGHTS` message carrying the region descriptor, close.

use std::io;
use std::os::fd::{AsFd, BorrowedFd};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use funcscope_core::fdpass::send_fd;
use funcscope_core::path::sock_path;
use log::{debug, info, trace, warn};

use crate::error::{TargetError, TargetResult};

/// Upper bound on connections served by one poll.
const MAX_ACCEPTS_PER_POLL: usize = 16;

pub struct AttachServer {
    listener: UnixListener,
    path: PathBuf,
    ticks: AtomicU64,
}

impl AttachServer {
    /// Bind `<dir>/funcscope.<id>.sock`.
    ///
    /// A leftover socket file from a crashed predecessor is unlinked and
    /// the bind retried once. A path some live listener still answers on
    /// is left alone and reported as `AddrInUse`.
    pub fn bind(dir: &Path, id: i32) -> TargetResult<Self> {
        let path = sock_path(dir, id);
        let listener = match UnixListener::bind(&path) {
            Ok(l) => l,
            Err(e) if e.kind() == io::ErrorKind::AddrInUse => {
                if !is_stale(&path) {
                    return Err(TargetError::Bind { path, source: e });
                }
                warn!("funcscope: stale socket {}, replacing", path.display());
                match std::fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(source) => return Err(TargetError::Bind { path, source }),
                }
                UnixListener::bind(&path).map_err(|source| TargetError::Bind {
                    path: path.clone(),
                    source,
                })?
            }
            Err(source) => return Err(TargetError::Bind { path, source }),
        };
        let server = Self {
            listener,
            path,
            ticks: AtomicU64::new(0),
        };
        // From here on Drop unlinks the path on any failure.
        server.listener.set_nonblocking(true)?;
        info!("funcscope: attach socket {}", server.path.display());
        Ok(server)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Check for attach requests at most once every `n` calls.
    ///
    /// Returns the number of tools served by this call. Never blocks.
    #[inline]
    pub fn poll_every_n(&self, n: u64, region_fd: BorrowedFd<'_>) -> usize {
        let tick = self.ticks.fetch_add(1, Ordering::Relaxed);
        if n > 1 && tick % n != 0 {
            return 0;
        }
        self.serve_pending(region_fd)
    }

    /// Accept and serve every queued connection (bounded per call).
    #[cold]
    pub fn serve_pending(&self, region_fd: BorrowedFd<'_>) -> usize {
        let mut served = 0;
        for _ in 0..MAX_ACCEPTS_PER_POLL {
            let stream = match self.listener.accept() {
                Ok((stream, _)) => stream,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    // Retried on the next poll.
                    trace!("funcscope: accept: {}", e);
                    break;
                }
            };
            // A full peer buffer must not stall the workload.
            if let Err(e) = stream.set_nonblocking(true) {
                warn!("funcscope: dropping attach connection: {}", e);
                continue;
            }
            match send_fd(stream.as_fd(), region_fd) {
                Ok(()) => {
                    served += 1;
                    debug!("funcscope: region descriptor sent");
                }
                Err(e) => warn!("funcscope: descriptor send failed: {}", e),
            }
        }
        served
    }

    /// Close the listener and unlink its path.
    pub fn shutdown(self) -> TargetResult<()> {
        let result = std::fs::remove_file(&self.path);
        // Drop finds the path already gone and stays quiet.
        drop(self);
        match result {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e.into()),
            _ => Ok(()),
        }
    }
}

impl Drop for AttachServer {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            if e.kind() != io::ErrorKind::NotFound {
                warn!("funcscope: unlink {}: {}", self.path.display(), e);
            }
        }
    }
}

/// True if nothing accepts connections on `path` any more.
fn is_stale(path: &Path) -> bool {
    match UnixStream::connect(path) {
        Ok(_) => false,
        Err(e) => matches!(
            e.kind(),
            io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound
        ),
    }
}
