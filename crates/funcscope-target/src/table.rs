//! `CheckpointTable` - writer's view of the region layout.
//!
//! Header and names are written once by [`CheckpointTable::init`] before
//! the region is shared. After that only slot cursors and samples change,
//! and only through [`SlotWriter::publish`].

use std::ptr::{self, NonNull};

use funcscope_core::clock::ClockSource;
use funcscope_core::layout::{RegionHeader, RegionLayout, NAME_LEN, SLOT_WRITE_POS_OFFSET};
use funcscope_core::slot::SlotWriter;

use crate::error::{TargetError, TargetResult};

pub struct CheckpointTable {
    base: NonNull<u8>,
    layout: RegionLayout,
}

// Safety: see Region; slot contents are only touched through atomics.
unsafe impl Send for CheckpointTable {}
unsafe impl Sync for CheckpointTable {}

impl CheckpointTable {
    /// Write header, slot prefixes and names into a zeroed region.
    ///
    /// # Safety
    /// `base` must point to at least `layout.total_size()` writable,
    /// 8-byte aligned bytes that stay mapped for the table's lifetime and
    /// that no other process is reading yet.
    pub unsafe fn init(
        base: NonNull<u8>,
        layout: RegionLayout,
        clock: ClockSource,
        names: &[[u8; NAME_LEN]],
    ) -> Self {
        debug_assert_eq!(names.len(), layout.num_checkpoints());
        let raw = base.as_ptr();

        ptr::write(raw as *mut RegionHeader, RegionHeader::new(&layout, clock));
        for (id, name) in names.iter().enumerate() {
            let slot = raw.add(layout.slot_offset(id));
            ptr::write(slot as *mut u32, layout.ring_capacity());
            ptr::write(slot.add(SLOT_WRITE_POS_OFFSET) as *mut u64, 0);
            ptr::copy_nonoverlapping(name.as_ptr(), raw.add(layout.name_offset(id)), NAME_LEN);
        }

        Self { base, layout }
    }

    #[inline]
    pub fn layout(&self) -> &RegionLayout {
        &self.layout
    }

    pub fn header(&self) -> RegionHeader {
        // Safety: written in init, immutable afterwards.
        unsafe { ptr::read(self.base.as_ptr() as *const RegionHeader) }
    }

    /// Bounds-checked slot access.
    #[inline(always)]
    pub fn slot(&self, id: usize) -> TargetResult<SlotWriter<'_>> {
        if id >= self.layout.num_checkpoints() {
            return Err(TargetError::InvalidCheckpoint {
                id,
                count: self.layout.num_checkpoints(),
            });
        }
        // Safety: id checked above; region outlives &self.
        Ok(unsafe { SlotWriter::from_raw(self.base.as_ptr(), &self.layout, id) })
    }

    pub fn name(&self, id: usize) -> Option<String> {
        if id >= self.layout.num_checkpoints() {
            return None;
        }
        // Safety: id checked; names are immutable after init.
        let raw = unsafe {
            std::slice::from_raw_parts(self.base.as_ptr().add(self.layout.name_offset(id)), NAME_LEN)
        };
        Some(funcscope_core::layout::decode_name(raw))
    }
}
