//! Large-page filesystem detection.
//!
//! A mount point qualifies only if all three checks pass:
//!
//! 1. the mount table lists it as `hugetlbfs`;
//! 2. `statfs` on it reports the hugetlbfs magic (rejects spoofed or
//!    stale table entries);
//! 3. a probe file created there can actually be mapped. Mount presence
//!    says nothing about permissions or the free page pool.
//!
//! The probe file is removed on every path out of the probe.

use std::fs::{File, OpenOptions};
use std::os::fd::AsRawFd;
use std::os::unix::fs::OpenOptionsExt;
use std::path::{Path, PathBuf};

use log::{debug, trace};
use nix::sys::statfs::{statfs, HUGETLBFS_MAGIC};

use crate::error::TargetResult;
use crate::mounts::{read_mounts, MountEntry};

/// Used when the filesystem does not report its page size.
pub const DEFAULT_HUGE_PAGE_SIZE: usize = 2 * 1024 * 1024;

const HUGETLBFS: &str = "hugetlbfs";

/// A usable large-page mount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HugePageMount {
    pub dir: PathBuf,
    pub page_size: usize,
}

/// Find the first usable large-page mount listed in `mounts_path`.
///
/// `Ok(None)` means none qualified. An unreadable or malformed mount
/// table is an error; callers decide whether that is fatal.
pub fn detect(mounts_path: &Path) -> TargetResult<Option<HugePageMount>> {
    let mounts = read_mounts(mounts_path)?;
    Ok(first_usable(&mounts))
}

fn first_usable(mounts: &[MountEntry]) -> Option<HugePageMount> {
    mounts
        .iter()
        .filter(|m| m.fstype == HUGETLBFS)
        .find_map(|m| {
            let page_size = match verify_fs_type(&m.target) {
                Some(size) => size,
                None => {
                    debug!("{}: listed as hugetlbfs but statfs disagrees", m.target.display());
                    return None;
                }
            };
            if !probe(&m.target, page_size) {
                debug!("{}: probe mapping failed", m.target.display());
                return None;
            }
            Some(HugePageMount { dir: m.target.clone(), page_size })
        })
}

/// Re-check the filesystem type. Returns its page size when it is
/// hugetlbfs.
fn verify_fs_type(dir: &Path) -> Option<usize> {
    let st = statfs(dir).ok()?;
    if st.filesystem_type() != HUGETLBFS_MAGIC {
        return None;
    }
    let block = st.block_size() as usize;
    Some(if block > 0 { block } else { DEFAULT_HUGE_PAGE_SIZE })
}

/// Removes the probe file when dropped.
struct ProbeFile {
    path: PathBuf,
    file: File,
}

impl Drop for ProbeFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            trace!("probe cleanup {}: {}", self.path.display(), e);
        }
    }
}

/// Map (then release) one page from a fresh file under `dir`.
fn probe(dir: &Path, page_size: usize) -> bool {
    let path = dir.join(format!("huge_test_{}", std::process::id()));
    let file = match OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o600)
        .open(&path)
    {
        Ok(f) => f,
        Err(e) => {
            trace!("probe open {}: {}", path.display(), e);
            return false;
        }
    };
    let probe = ProbeFile { path, file };

    if probe.file.set_len(page_size as u64).is_err() {
        return false;
    }

    // Safety: fresh shared mapping of our own file, unmapped right away.
    unsafe {
        let addr = libc::mmap(
            std::ptr::null_mut(),
            page_size,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            probe.file.as_raw_fd(),
            0,
        );
        if addr == libc::MAP_FAILED {
            return false;
        }
        libc::munmap(addr, page_size);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn mount_table(lines: &str) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(lines.as_bytes()).unwrap();
        f
    }

    #[test]
    fn test_no_hugetlbfs_entries() {
        let table = mount_table("proc /proc proc rw 0 0\n");
        assert_eq!(detect(table.path()).unwrap(), None);
    }

    #[test]
    fn test_spoofed_entry_is_rejected() {
        // A plain directory listed as hugetlbfs fails the statfs check,
        // and the probe must not leave anything behind in it.
        let dir = tempfile::tempdir().unwrap();
        let table = mount_table(&format!("none {} hugetlbfs rw 0 0\n", dir.path().display()));

        assert_eq!(detect(table.path()).unwrap(), None);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_malformed_table_is_an_error() {
        let table = mount_table("this is not a mount line\n");
        assert!(detect(table.path()).is_err());
    }

    #[test]
    fn test_missing_table_is_an_error() {
        assert!(detect(Path::new("/nonexistent/funcscope/mounts")).is_err());
    }

    #[test]
    fn test_probe_cleans_up_on_success_and_failure() {
        // tmpfs/ext4 accept a 4 KiB shared mapping, so this exercises the
        // success path; an unwritable directory exercises open failure.
        let dir = tempfile::tempdir().unwrap();
        assert!(probe(dir.path(), 4096));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);

        assert!(!probe(Path::new("/nonexistent/funcscope"), 4096));
    }
}
