//! `MappedRegion` - read-only view of a target's region.
//!
//! The size comes from the received descriptor (`fstat`), never from an
//! assumption: the large-page backing rounds the file up, the layout
//! inside is described by the header. The header is validated before
//! any slot is touched.

use std::fs::File;
use std::io;
use std::mem::size_of;
use std::os::fd::{AsRawFd, OwnedFd};
use std::ptr::{self, NonNull};

use funcscope_core::clock::ClockSource;
use funcscope_core::layout::{decode_name, RegionHeader, RegionLayout, NAME_LEN};
use funcscope_core::slot::SlotRef;
use funcscope_core::stats::SampleStats;
use funcscope_core::LayoutError;

use crate::error::AttachError;

/// Owns one `PROT_READ` shared mapping.
struct Mapping {
    base: NonNull<u8>,
    len: usize,
}

impl Mapping {
    fn new(fd: &File, len: usize) -> io::Result<Self> {
        // Safety: read-only shared mapping of len bytes of fd.
        let addr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ,
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
        Ok(Self { base, len })
    }

    fn unmap(self) -> io::Result<()> {
        let this = std::mem::ManuallyDrop::new(self);
        // Safety: base/len from a successful mmap, not used afterwards.
        let ret = unsafe { libc::munmap(this.base.as_ptr() as *mut libc::c_void, this.len) };
        if ret != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}

impl Drop for Mapping {
    fn drop(&mut self) {
        // Safety: base/len from a successful mmap.
        unsafe {
            libc::munmap(self.base.as_ptr() as *mut libc::c_void, self.len);
        }
    }
}

pub struct MappedRegion {
    mapping: Mapping,
    layout: RegionLayout,
    header: RegionHeader,
    clock: ClockSource,
}

// Safety: read-only mapping; slot reads go through atomics.
unsafe impl Send for MappedRegion {}
unsafe impl Sync for MappedRegion {}

impl MappedRegion {
    /// Map a received region descriptor read-only and validate it.
    pub fn map(fd: OwnedFd) -> Result<Self, AttachError> {
        let file = File::from(fd);
        let len = file.metadata().map_err(AttachError::Map)?.len() as usize;
        if len < size_of::<RegionHeader>() {
            return Err(LayoutError::TooSmall {
                needed: size_of::<RegionHeader>(),
                actual: len,
            }
            .into());
        }

        let mapping = Mapping::new(&file, len).map_err(AttachError::Map)?;
        // Safety: the mapping is at least one header long and page aligned.
        let header = unsafe { ptr::read_volatile(mapping.base.as_ptr() as *const RegionHeader) };
        let layout = RegionLayout::from_header(&header, len)?;
        let clock = header.clock()?;
        // The descriptor is not needed once mapped.
        drop(file);

        Ok(Self {
            mapping,
            layout,
            header,
            clock,
        })
    }

    pub fn len(&self) -> usize {
        self.mapping.len
    }

    pub fn is_empty(&self) -> bool {
        self.mapping.len == 0
    }

    pub fn header(&self) -> &RegionHeader {
        &self.header
    }

    pub fn layout(&self) -> &RegionLayout {
        &self.layout
    }

    pub fn num_checkpoints(&self) -> usize {
        self.layout.num_checkpoints()
    }

    /// Unit of every sample in this region.
    pub fn clock(&self) -> ClockSource {
        self.clock
    }

    pub fn name(&self, id: usize) -> Option<String> {
        if id >= self.num_checkpoints() {
            return None;
        }
        // Safety: validated layout fits in the mapping; names are
        // written before the region is ever handed out.
        let raw = unsafe {
            std::slice::from_raw_parts(
                self.mapping.base.as_ptr().add(self.layout.name_offset(id)),
                NAME_LEN,
            )
        };
        Some(decode_name(raw))
    }

    /// Read-only view of slot `id`; the mapping is `PROT_READ`.
    pub fn slot(&self, id: usize) -> Option<SlotRef<'_>> {
        if id >= self.num_checkpoints() {
            return None;
        }
        // Safety: id in range; validated layout fits in the mapping.
        Some(unsafe { SlotRef::from_raw(self.mapping.base.as_ptr(), &self.layout, id) })
    }

    /// Statistics for checkpoint `id` right now.
    pub fn stats(&self, id: usize, scratch: &mut Vec<u64>) -> Option<SampleStats> {
        self.slot(id).map(|slot| SampleStats::from_slot(&slot, scratch))
    }

    /// Drop the mapping, reporting `munmap` failure.
    pub fn unmap(self) -> io::Result<()> {
        self.mapping.unmap()
    }
}
