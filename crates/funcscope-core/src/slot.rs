//! `SlotRef` - one checkpoint's ring inside a mapped region.
//!
//! # Memory ordering
//!
//! Exactly one producer (the target) writes a slot. Readers (tool
//! processes) may inspect it at any moment from another address space.
//!
//! - **Producer:** store the sample at `write_pos % level` (Relaxed), then
//!   publish `write_pos + 1` with Release.
//! - **Reader:** load `write_pos` with Acquire, then load samples (Relaxed).
//!
//! Readers get a [`SlotRef`], which has no write path; only the target's
//! table hands out a [`SlotWriter`].
//!
//! A reader that observes cursor `p` therefore sees every sample written
//! before `p` was published. Samples are 64-bit atomics, so an entry is
//! never torn; at worst a reader racing a wrap sees an entry that was
//! already replaced by a newer sample.
//!
//! `write_pos` only ever increases. The valid window is the last
//! `min(write_pos, level)` samples, oldest at `write_pos % level` once the
//! ring has wrapped.

use std::ops::Deref;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::layout::{RegionLayout, SLOT_HEADER_SIZE, SLOT_WRITE_POS_OFFSET};

/// Read-only view of one slot in a mapped region.
///
/// Safe to build over a `PROT_READ` mapping: nothing here stores.
///
/// ```compile_fail
/// fn append(slot: funcscope_core::SlotRef<'_>) {
///     slot.publish(1);
/// }
/// ```
#[derive(Clone, Copy)]
pub struct SlotRef<'a> {
    level: u32,
    write_pos: &'a AtomicU64,
    samples: &'a [AtomicU64],
}

impl<'a> SlotRef<'a> {
    /// Build a view of slot `id`.
    ///
    /// # Safety
    /// - `base` must point to a mapping of at least `layout.total_size()`
    ///   bytes, aligned to 8 bytes, valid for `'a`.
    /// - `id < layout.num_checkpoints()`.
    pub unsafe fn from_raw(base: *const u8, layout: &RegionLayout, id: usize) -> Self {
        let slot = base.add(layout.slot_offset(id));
        // A hostile or half-initialized level must never index past the
        // stride the header promised.
        let raw_level = std::ptr::read_volatile(slot as *const u32);
        let level = raw_level.min(layout.ring_capacity());
        let write_pos = &*(slot.add(SLOT_WRITE_POS_OFFSET) as *const AtomicU64);
        let samples = std::slice::from_raw_parts(
            slot.add(SLOT_HEADER_SIZE) as *const AtomicU64,
            level as usize,
        );
        Self { level, write_pos, samples }
    }

    /// Ring capacity of this slot.
    #[inline]
    pub fn level(&self) -> u32 {
        self.level
    }

    /// Total samples ever written (never decreases).
    #[inline]
    pub fn write_pos(&self) -> u64 {
        self.write_pos.load(Ordering::Acquire)
    }

    /// Number of samples currently in the window.
    #[inline]
    pub fn len(&self) -> usize {
        self.write_pos().min(self.level as u64) as usize
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copy the current window into `buf`, oldest sample first.
    pub fn window_into(&self, buf: &mut Vec<u64>) {
        buf.clear();
        if self.level == 0 {
            return;
        }
        let pos = self.write_pos();
        let level = self.level as u64;
        let n = pos.min(level);
        let start = pos - n;
        buf.reserve(n as usize);
        for i in 0..n {
            let idx = ((start + i) % level) as usize;
            buf.push(self.samples[idx].load(Ordering::Relaxed));
        }
    }

    /// Snapshot of the current window, oldest sample first.
    pub fn window(&self) -> Vec<u64> {
        let mut buf = Vec::new();
        self.window_into(&mut buf);
        buf
    }
}

/// Producer handle for one slot. Reads go through the [`SlotRef`] it
/// derefs to.
#[derive(Clone, Copy)]
pub struct SlotWriter<'a> {
    slot: SlotRef<'a>,
}

impl<'a> SlotWriter<'a> {
    /// Build a writer for slot `id`.
    ///
    /// # Safety
    /// Same as [`SlotRef::from_raw`], and the mapping must be writable.
    pub unsafe fn from_raw(base: *mut u8, layout: &RegionLayout, id: usize) -> Self {
        Self {
            slot: SlotRef::from_raw(base as *const u8, layout, id),
        }
    }

    /// Append one sample.
    ///
    /// Wait-free: two relaxed loads/stores and one release store.
    /// Callers must serialize writers per slot.
    #[inline(always)]
    pub fn publish(&self, value: u64) {
        let slot = &self.slot;
        if slot.level == 0 {
            return;
        }
        let pos = slot.write_pos.load(Ordering::Relaxed);
        let idx = (pos % slot.level as u64) as usize;
        slot.samples[idx].store(value, Ordering::Relaxed);
        slot.write_pos.store(pos.wrapping_add(1), Ordering::Release);
    }
}

impl<'a> Deref for SlotWriter<'a> {
    type Target = SlotRef<'a>;

    fn deref(&self) -> &SlotRef<'a> {
        &self.slot
    }
}
