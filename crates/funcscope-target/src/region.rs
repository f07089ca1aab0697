//! Shared region allocation.
//!
//! Two backings, tried in order:
//!
//! - **Large page:** a file on a usable hugetlbfs mount (see
//!   [`crate::hugepage`]), sized up to a whole number of large pages.
//!   The file is unlinked right after creation; only the descriptor keeps
//!   it alive, so nothing is left on disk when the process goes away.
//! - **Fallback:** an anonymous memory file (`memfd_create`).
//!
//! Either way the region is a `MAP_SHARED` mapping of a descriptor that
//! can be handed to another process.

use std::ffi::CStr;
use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, FromRawFd, OwnedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;
use std::ptr::NonNull;

use funcscope_core::layout::align_up;
use log::{debug, info, trace, warn};

use crate::config::TargetConfig;
use crate::error::{TargetError, TargetResult};
use crate::hugepage::{self, HugePageMount};

/// What backs a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backing {
    HugePage,
    Fallback,
}

/// A read-write shared mapping owned by the target.
pub struct Region {
    base: NonNull<u8>,
    /// Mapped length (whole backing file).
    len: usize,
    fd: OwnedFd,
    backing: Backing,
}

// Safety: the mapping is process-wide memory; all concurrent access to
// its contents goes through atomics (see funcscope_core::slot).
unsafe impl Send for Region {}
unsafe impl Sync for Region {}

impl Region {
    /// Allocate a zeroed region of at least `size` bytes.
    ///
    /// Large-page trouble of any kind degrades to the fallback. Only a
    /// fallback failure is an error.
    pub fn allocate(size: usize, config: &TargetConfig) -> TargetResult<Self> {
        if config.hugepages {
            match hugepage::detect(&config.mounts_path) {
                Ok(Some(mount)) => match Self::allocate_hugepage(size, &mount, config) {
                    Ok(region) => {
                        info!(
                            "funcscope: region {} bytes on large pages ({})",
                            region.len,
                            mount.dir.display()
                        );
                        return Ok(region);
                    }
                    Err(e) => warn!(
                        "funcscope: large-page allocation under {} failed: {}; using fallback",
                        mount.dir.display(),
                        e
                    ),
                },
                Ok(None) => debug!("funcscope: no usable large-page mount"),
                Err(e) => warn!("funcscope: large-page detection failed: {}; using fallback", e),
            }
        }

        let region = Self::allocate_fallback(size).map_err(TargetError::RegionUnavailable)?;
        info!("funcscope: region {} bytes on anonymous shared memory", region.len);
        Ok(region)
    }

    fn allocate_hugepage(size: usize, mount: &HugePageMount, config: &TargetConfig) -> io::Result<Self> {
        let path = mount
            .dir
            .join(format!(".funcscope_{}", config.resolved_endpoint_id()));
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(&path)?;
        // The descriptor is the only handle anyone needs from here on.
        RegionFile::new(path).unlink()?;

        let len = align_up(size, mount.page_size);
        file.set_len(len as u64)?;
        Self::map(file.into(), len, Backing::HugePage)
    }

    fn allocate_fallback(size: usize) -> io::Result<Self> {
        const NAME: &CStr = c"funcscope";
        // Safety: NAME is a valid C string; the result is checked.
        let raw = unsafe { libc::memfd_create(NAME.as_ptr(), libc::MFD_CLOEXEC) };
        if raw < 0 {
            return Err(io::Error::last_os_error());
        }
        // Safety: raw is a fresh descriptor we own.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        let len = align_up(size, page_size());
        let file = File::from(fd);
        file.set_len(len as u64)?;
        Self::map(file.into(), len, Backing::Fallback)
    }

    fn map(fd: OwnedFd, len: usize, backing: Backing) -> io::Result<Self> {
        // Safety: fd refers to a file at least len bytes long.
        let addr = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED,
                fd.as_raw_fd(),
                0,
            )
        };
        if addr == libc::MAP_FAILED {
            return Err(io::Error::last_os_error());
        }
        let base = NonNull::new(addr as *mut u8)
            .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "mmap returned null"))?;
        Ok(Self { base, len, fd, backing })
    }

    #[inline]
    pub fn base(&self) -> NonNull<u8> {
        self.base
    }

    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn backing(&self) -> Backing {
        self.backing
    }

    /// Descriptor to hand to attaching tools.
    pub fn fd(&self) -> BorrowedFd<'_> {
        self.fd.as_fd()
    }

    /// Unmap and close, reporting failure.
    pub fn release(self) -> TargetResult<()> {
        let this = std::mem::ManuallyDrop::new(self);
        // Safety: base/len came from a successful mmap; `this` is never
        // used again, and the descriptor is moved out exactly once.
        let (ret, fd) = unsafe {
            let ret = libc::munmap(this.base.as_ptr() as *mut libc::c_void, this.len);
            (ret, std::ptr::read(&this.fd))
        };
        let ret = if ret != 0 { Err(io::Error::last_os_error()) } else { Ok(()) };
        drop(fd);
        ret.map_err(TargetError::from)
    }
}

impl Drop for Region {
    fn drop(&mut self) {
        // Safety: base/len came from a successful mmap.
        unsafe {
            libc::munmap(self.base.as_ptr() as *mut libc::c_void, self.len);
        }
    }
}

fn page_size() -> usize {
    // Safety: sysconf has no preconditions.
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size > 0 {
        size as usize
    } else {
        4096
    }
}

/// Path of a freshly created region file. Removed on drop unless
/// [`RegionFile::unlink`] already removed it.
struct RegionFile {
    path: Option<PathBuf>,
}

impl RegionFile {
    fn new(path: PathBuf) -> Self {
        Self { path: Some(path) }
    }

    /// Remove the path now. On failure the path is kept so drop tries
    /// once more.
    fn unlink(mut self) -> io::Result<()> {
        let Some(path) = self.path.take() else {
            return Ok(());
        };
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) => {
                self.path = Some(path);
                Err(e)
            }
        }
    }
}

impl Drop for RegionFile {
    fn drop(&mut self) {
        if let Some(path) = self.path.take() {
            if let Err(e) = std::fs::remove_file(&path) {
                trace!("region file cleanup {}: {}", path.display(), e);
            }
        }
    }
}
