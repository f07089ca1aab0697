//! Byte layout of the shared checkpoint region.
//!
//! ```text
//! 0x00                       RegionHeader (64 bytes)
//! 0x40                       slot[0]  { level: u32, _pad: u32, write_pos: u64, samples: [u64; cap] }
//! 0x40 + stride              slot[1]
//! ...
//! names_offset               name[0]  [u8; NAME_LEN] (NUL padded)
//! names_offset + NAME_LEN    name[1]
//! ...
//! total_size
//! ```
//!
//! Every offset is derivable from `num_checkpoints` and `ring_capacity`
//! in the header alone, so the tool never needs out-of-band shape data.
//! Slots are padded to a cache line so two checkpoints never share one.

use std::mem::size_of;

use crate::clock::ClockSource;
use crate::error::LayoutError;

/// "FSCP" in little-endian order.
pub const REGION_MAGIC: u32 = 0x5043_5346;
/// Bumped whenever the byte layout changes.
pub const REGION_VERSION: u32 = 1;

/// Largest accepted checkpoint count.
pub const MAX_CHECKPOINTS: usize = 127;
/// Largest accepted per-slot ring capacity.
pub const MAX_RING_CAPACITY: u32 = 1 << 20;
/// Default per-slot ring capacity.
pub const DEFAULT_RING_CAPACITY: u32 = 4096;
/// Fixed byte length of one name entry, including the NUL terminator.
pub const NAME_LEN: usize = 64;

pub const CACHE_LINE: usize = 64;

/// Size of the per-slot prefix before the sample array.
pub const SLOT_HEADER_SIZE: usize = 16;
/// Offset of `write_pos` inside a slot.
pub const SLOT_WRITE_POS_OFFSET: usize = 8;

/// Region header. Written once by the target at initialization.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionHeader {
    pub magic: u32,
    pub version: u32,
    pub num_checkpoints: u32,
    pub ring_capacity: u32,
    /// Bytes in use by the layout (the backing file may be larger).
    pub region_size: u64,
    /// [`ClockSource`] discriminant, i.e. the unit of every sample.
    pub clock: u32,
    pub _reserved: u32,
    pub _pad: [u64; 4],
}

const _: () = assert!(size_of::<RegionHeader>() == CACHE_LINE);

impl RegionHeader {
    pub fn new(layout: &RegionLayout, clock: ClockSource) -> Self {
        Self {
            magic: REGION_MAGIC,
            version: REGION_VERSION,
            num_checkpoints: layout.num_checkpoints() as u32,
            ring_capacity: layout.ring_capacity(),
            region_size: layout.total_size() as u64,
            clock: clock as u32,
            _reserved: 0,
            _pad: [0; 4],
        }
    }

    /// Unit of the samples recorded in this region.
    pub fn clock(&self) -> Result<ClockSource, LayoutError> {
        ClockSource::from_raw(self.clock).ok_or(LayoutError::UnknownClock(self.clock))
    }
}

/// Shape of a region: how many slots, how deep each ring is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegionLayout {
    num_checkpoints: usize,
    ring_capacity: u32,
}

impl RegionLayout {
    /// Validate a requested shape.
    ///
    /// `num_checkpoints` is signed so callers can pass through whatever
    /// they were given; anything outside `1..=127` is rejected.
    pub fn new(num_checkpoints: i64, ring_capacity: u32) -> Result<Self, LayoutError> {
        if num_checkpoints < 1 || num_checkpoints > MAX_CHECKPOINTS as i64 {
            return Err(LayoutError::CheckpointCount(num_checkpoints));
        }
        if ring_capacity == 0 || ring_capacity > MAX_RING_CAPACITY {
            return Err(LayoutError::RingCapacity(ring_capacity as u64));
        }
        Ok(Self {
            num_checkpoints: num_checkpoints as usize,
            ring_capacity,
        })
    }

    /// Recover the layout from a header read out of a mapping of
    /// `mapped_len` bytes.
    pub fn from_header(header: &RegionHeader, mapped_len: usize) -> Result<Self, LayoutError> {
        if header.magic != REGION_MAGIC {
            return Err(LayoutError::BadMagic(header.magic));
        }
        if header.version != REGION_VERSION {
            return Err(LayoutError::UnsupportedVersion(header.version));
        }
        header.clock()?;
        let layout = Self::new(header.num_checkpoints as i64, header.ring_capacity)?;

        let needed = layout.total_size();
        if (header.region_size as usize) < needed || mapped_len < needed {
            return Err(LayoutError::TooSmall {
                needed,
                actual: mapped_len.min(header.region_size as usize),
            });
        }
        Ok(layout)
    }

    #[inline]
    pub fn num_checkpoints(&self) -> usize {
        self.num_checkpoints
    }

    #[inline]
    pub fn ring_capacity(&self) -> u32 {
        self.ring_capacity
    }

    /// Byte distance between consecutive slots.
    #[inline]
    pub fn slot_stride(&self) -> usize {
        align_up(
            SLOT_HEADER_SIZE + self.ring_capacity as usize * size_of::<u64>(),
            CACHE_LINE,
        )
    }

    #[inline]
    pub fn slot_offset(&self, id: usize) -> usize {
        debug_assert!(id < self.num_checkpoints);
        size_of::<RegionHeader>() + id * self.slot_stride()
    }

    #[inline]
    pub fn names_offset(&self) -> usize {
        size_of::<RegionHeader>() + self.num_checkpoints * self.slot_stride()
    }

    #[inline]
    pub fn name_offset(&self, id: usize) -> usize {
        debug_assert!(id < self.num_checkpoints);
        self.names_offset() + id * NAME_LEN
    }

    /// Bytes the layout occupies.
    #[inline]
    pub fn total_size(&self) -> usize {
        self.names_offset() + self.num_checkpoints * NAME_LEN
    }
}

/// Round `value` up to a multiple of `align` (a power of two).
#[inline]
pub const fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}

/// Decode a NUL-padded name entry.
pub fn decode_name(raw: &[u8]) -> String {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

/// Encode a name into a fixed entry. Returns `None` if it does not fit
/// with its terminator.
pub fn encode_name(name: &str) -> Option<[u8; NAME_LEN]> {
    let bytes = name.as_bytes();
    if bytes.len() >= NAME_LEN || bytes.contains(&0) {
        return None;
    }
    let mut out = [0u8; NAME_LEN];
    out[..bytes.len()].copy_from_slice(bytes);
    Some(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_out_of_range_counts() {
        for n in [-1i64, 0, 128, 1000] {
            assert_eq!(
                RegionLayout::new(n, DEFAULT_RING_CAPACITY),
                Err(LayoutError::CheckpointCount(n))
            );
        }
        assert!(RegionLayout::new(1, DEFAULT_RING_CAPACITY).is_ok());
        assert!(RegionLayout::new(127, DEFAULT_RING_CAPACITY).is_ok());
    }

    #[test]
    fn test_rejects_bad_capacity() {
        assert!(RegionLayout::new(1, 0).is_err());
        assert!(RegionLayout::new(1, MAX_RING_CAPACITY + 1).is_err());
    }

    #[test]
    fn test_offsets_are_cache_aligned_and_disjoint() {
        let layout = RegionLayout::new(3, 5).unwrap();
        // 16 + 5 * 8 = 56 -> 64
        assert_eq!(layout.slot_stride(), 64);
        assert_eq!(layout.slot_offset(0), 64);
        assert_eq!(layout.slot_offset(2), 64 + 128);
        assert_eq!(layout.names_offset(), 64 + 3 * 64);
        assert_eq!(layout.name_offset(1), layout.names_offset() + NAME_LEN);
        assert_eq!(layout.total_size(), layout.names_offset() + 3 * NAME_LEN);
        for id in 0..3 {
            assert_eq!(layout.slot_offset(id) % CACHE_LINE, 0);
        }
    }

    #[test]
    fn test_header_round_trip_validation() {
        let layout = RegionLayout::new(2, 16).unwrap();
        let header = RegionHeader::new(&layout, ClockSource::Nanos);
        assert_eq!(RegionLayout::from_header(&header, layout.total_size()), Ok(layout));

        let mut bad = header;
        bad.magic = 0xdead_beef;
        assert_eq!(
            RegionLayout::from_header(&bad, layout.total_size()),
            Err(LayoutError::BadMagic(0xdead_beef))
        );

        let mut bad = header;
        bad.version = 99;
        assert_eq!(
            RegionLayout::from_header(&bad, layout.total_size()),
            Err(LayoutError::UnsupportedVersion(99))
        );

        assert!(matches!(
            RegionLayout::from_header(&header, layout.total_size() - 1),
            Err(LayoutError::TooSmall { .. })
        ));
    }

    #[test]
    fn test_name_encoding() {
        let raw = encode_name("alpha").unwrap();
        assert_eq!(decode_name(&raw), "alpha");
        assert!(encode_name(&"x".repeat(NAME_LEN)).is_none());
        assert!(encode_name("a\0b").is_none());
        assert_eq!(decode_name(&[b'a'; 4]), "aaaa");
    }
}
