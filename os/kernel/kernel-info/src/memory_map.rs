//! # Firmware Memory Map
//!
//! The boot stub forwards the firmware memory map as a flat byte buffer of
//! self-describing records:
//!
//! ```text
//! offset  size  field
//! 0       4     size    (length of the record *after* this field)
//! 4       8     base    (physical address)
//! 12      8     length  (bytes)
//! 20      4     type    (1 = usable, 0 = terminator, other = reserved)
//! 24      ..    padding up to 4 + size
//! ```
//!
//! Records are little-endian and unaligned. The next record starts
//! `size + 4` bytes after the current one, so producers may append fields
//! this module does not know about.
//!
//! [`MemoryMap::regions`] walks the buffer lazily. The walk ends at the end of
//! the buffer, at a terminator record, or at the first malformed record; the
//! latter is reported through [`MemoryMapIter::error`] instead of failing.

use core::fmt;
use core::iter::FusedIterator;
use kernel_memory_addresses::PhysicalAddress;

/// Width of the leading `size` field.
pub const MMAP_SIZE_FIELD_LEN: usize = size_of::<u32>();

/// Bytes of payload every record must carry after the `size` field.
pub const MMAP_RECORD_PAYLOAD_LEN: usize = 20;

/// Length of a record without padding, including the `size` field.
pub const MMAP_RECORD_LEN: usize = MMAP_SIZE_FIELD_LEN + MMAP_RECORD_PAYLOAD_LEN;

/// Firmware classification of a physical range.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum RegionKind {
    /// Available RAM (type 1).
    Usable,
    /// Reserved, unusable (type 2).
    Reserved,
    /// ACPI tables, reclaimable after parsing (type 3).
    AcpiReclaimable,
    /// ACPI non-volatile storage (type 4).
    AcpiNvs,
    /// Defective RAM (type 5).
    BadMemory,
    /// Any other non-zero type.
    Other(u32),
}

impl RegionKind {
    /// Decodes a raw type marker. Returns `None` for the terminator (0).
    #[must_use]
    pub const fn from_raw(raw: u32) -> Option<Self> {
        Some(match raw {
            0 => return None,
            1 => Self::Usable,
            2 => Self::Reserved,
            3 => Self::AcpiReclaimable,
            4 => Self::AcpiNvs,
            5 => Self::BadMemory,
            other => Self::Other(other),
        })
    }

    #[must_use]
    pub const fn as_raw(self) -> u32 {
        match self {
            Self::Usable => 1,
            Self::Reserved => 2,
            Self::AcpiReclaimable => 3,
            Self::AcpiNvs => 4,
            Self::BadMemory => 5,
            Self::Other(raw) => raw,
        }
    }
}

impl fmt::Display for RegionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Usable => f.write_str("usable"),
            Self::Reserved => f.write_str("reserved"),
            Self::AcpiReclaimable => f.write_str("ACPI reclaimable"),
            Self::AcpiNvs => f.write_str("ACPI NVS"),
            Self::BadMemory => f.write_str("bad memory"),
            Self::Other(raw) => write!(f, "type {raw}"),
        }
    }
}

/// One firmware-reported physical range.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct MemoryRegion {
    pub base: PhysicalAddress,
    /// Length in bytes.
    pub length: u64,
    pub kind: RegionKind,
}

impl MemoryRegion {
    #[must_use]
    pub const fn new(base: PhysicalAddress, length: u64, kind: RegionKind) -> Self {
        Self { base, length, kind }
    }

    /// Exclusive end address, saturating at `u64::MAX`.
    #[must_use]
    pub const fn end(&self) -> PhysicalAddress {
        PhysicalAddress::new(self.base.as_u64().saturating_add(self.length))
    }

    #[must_use]
    pub const fn is_usable(&self) -> bool {
        matches!(self.kind, RegionKind::Usable)
    }

    /// Encodes the region as an unpadded record, as a boot stub would emit it.
    #[must_use]
    pub fn to_record(&self) -> [u8; MMAP_RECORD_LEN] {
        let mut out = [0u8; MMAP_RECORD_LEN];
        #[allow(clippy::cast_possible_truncation)]
        let size = MMAP_RECORD_PAYLOAD_LEN as u32;
        out[0..4].copy_from_slice(&size.to_le_bytes());
        out[4..12].copy_from_slice(&self.base.as_u64().to_le_bytes());
        out[12..20].copy_from_slice(&self.length.to_le_bytes());
        out[20..24].copy_from_slice(&self.kind.as_raw().to_le_bytes());
        out
    }
}

impl fmt::Display for MemoryRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:#x} - {:#x}] ({})",
            self.base.as_u64(),
            self.end().as_u64(),
            self.kind
        )
    }
}

/// Why a memory map walk stopped before the end of the buffer.
#[derive(Copy, Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum MemoryMapError {
    #[error("record at offset {offset} needs {needed} bytes but only {available} remain")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("record at offset {offset} declares size {size}, below the minimum record payload")]
    RecordTooShort { offset: usize, size: u32 },
}

/// Borrowed firmware memory map buffer.
#[derive(Copy, Clone, Debug)]
pub struct MemoryMap<'a> {
    bytes: &'a [u8],
}

impl<'a> MemoryMap<'a> {
    #[must_use]
    pub const fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    #[must_use]
    pub const fn empty() -> Self {
        Self { bytes: &[] }
    }

    /// Buffer length in bytes.
    #[must_use]
    pub const fn len_bytes(&self) -> usize {
        self.bytes.len()
    }

    /// Lazily decodes the records in buffer order.
    #[must_use]
    pub const fn regions(&self) -> MemoryMapIter<'a> {
        MemoryMapIter {
            bytes: self.bytes,
            offset: 0,
            state: WalkState::Walking,
        }
    }
}

impl<'a> IntoIterator for MemoryMap<'a> {
    type Item = MemoryRegion;
    type IntoIter = MemoryMapIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.regions()
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
enum WalkState {
    Walking,
    Exhausted,
    Terminated,
    Malformed(MemoryMapError),
}

/// Iterator over the records of a [`MemoryMap`].
#[derive(Clone, Debug)]
pub struct MemoryMapIter<'a> {
    bytes: &'a [u8],
    offset: usize,
    state: WalkState,
}

impl MemoryMapIter<'_> {
    /// The malformed record that stopped the walk, if any.
    #[must_use]
    pub const fn error(&self) -> Option<MemoryMapError> {
        match self.state {
            WalkState::Malformed(e) => Some(e),
            _ => None,
        }
    }

    /// Whether the walk stopped at a terminator record.
    #[must_use]
    pub const fn terminated(&self) -> bool {
        matches!(self.state, WalkState::Terminated)
    }

    /// Byte offset of the next record.
    #[must_use]
    pub const fn offset(&self) -> usize {
        self.offset
    }

    fn decode(&self) -> Result<(Option<MemoryRegion>, usize), MemoryMapError> {
        let rest = &self.bytes[self.offset..];
        if rest.len() < MMAP_RECORD_LEN {
            return Err(MemoryMapError::Truncated {
                offset: self.offset,
                needed: MMAP_RECORD_LEN,
                available: rest.len(),
            });
        }

        let size = read_u32(rest, 0);
        if (size as usize) < MMAP_RECORD_PAYLOAD_LEN {
            return Err(MemoryMapError::RecordTooShort {
                offset: self.offset,
                size,
            });
        }

        let base = read_u64(rest, 4);
        let length = read_u64(rest, 12);
        let kind = RegionKind::from_raw(read_u32(rest, 20));

        // Trailing padding of the last record may be cut off; the payload is intact.
        let stride = (size as usize)
            .saturating_add(MMAP_SIZE_FIELD_LEN)
            .min(rest.len());

        let region = kind.map(|kind| MemoryRegion::new(PhysicalAddress::new(base), length, kind));
        Ok((region, stride))
    }
}

impl Iterator for MemoryMapIter<'_> {
    type Item = MemoryRegion;

    fn next(&mut self) -> Option<Self::Item> {
        if self.state != WalkState::Walking {
            return None;
        }
        if self.offset >= self.bytes.len() {
            self.state = WalkState::Exhausted;
            return None;
        }

        match self.decode() {
            Ok((Some(region), stride)) => {
                self.offset += stride;
                Some(region)
            }
            Ok((None, _)) => {
                self.state = WalkState::Terminated;
                None
            }
            Err(e) => {
                self.state = WalkState::Malformed(e);
                None
            }
        }
    }
}

impl FusedIterator for MemoryMapIter<'_> {}

#[inline]
fn read_u32(bytes: &[u8], at: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[at..at + 4]);
    u32::from_le_bytes(raw)
}

#[inline]
fn read_u64(bytes: &[u8], at: usize) -> u64 {
    let mut raw = [0u8; 8];
    raw.copy_from_slice(&bytes[at..at + 8]);
    u64::from_le_bytes(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn region(base: u64, length: u64, kind: RegionKind) -> MemoryRegion {
        MemoryRegion::new(PhysicalAddress::new(base), length, kind)
    }

    fn encode(regions: &[MemoryRegion]) -> Vec<u8> {
        regions.iter().flat_map(MemoryRegion::to_record).collect()
    }

    #[test]
    fn walks_records_in_order() {
        let input = [
            region(0x0, 0x9_F000, RegionKind::Usable),
            region(0xF_0000, 0x1_0000, RegionKind::Reserved),
            region(0x10_0000, 0x700_0000, RegionKind::Usable),
        ];
        let bytes = encode(&input);
        let map = MemoryMap::new(&bytes);

        let mut it = map.regions();
        let out: Vec<_> = it.by_ref().collect();
        assert_eq!(out, input);
        assert!(it.error().is_none());
        assert!(!it.terminated());
        assert_eq!(it.offset(), bytes.len());
    }

    #[test]
    fn honors_record_size_for_stride() {
        // A producer that appends a 4-byte extended attribute field.
        let mut bytes = Vec::new();
        for r in [
            region(0x1000, 0x1000, RegionKind::Usable),
            region(0x8000, 0x2000, RegionKind::AcpiNvs),
        ] {
            let mut rec = r.to_record().to_vec();
            rec[0..4].copy_from_slice(&24u32.to_le_bytes());
            rec.extend_from_slice(&[0xAA; 4]);
            bytes.extend_from_slice(&rec);
        }

        let out: Vec<_> = MemoryMap::new(&bytes).regions().collect();
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].base.as_u64(), 0x8000);
        assert_eq!(out[1].kind, RegionKind::AcpiNvs);
    }

    #[test]
    fn stops_at_terminator() {
        let mut bytes = encode(&[region(0x1000, 0x1000, RegionKind::Usable)]);
        let mut term = region(0, 0, RegionKind::Usable).to_record();
        term[20..24].copy_from_slice(&0u32.to_le_bytes());
        bytes.extend_from_slice(&term);
        bytes.extend_from_slice(&region(0x9000, 0x1000, RegionKind::Usable).to_record());

        let mut it = MemoryMap::new(&bytes).regions();
        assert_eq!(it.next().map(|r| r.base.as_u64()), Some(0x1000));
        assert_eq!(it.next(), None);
        assert!(it.terminated());
        assert_eq!(it.next(), None);
    }

    #[test]
    fn truncated_tail_is_reported() {
        let mut bytes = encode(&[region(0x1000, 0x1000, RegionKind::Usable)]);
        bytes.extend_from_slice(&[20, 0, 0, 0, 1, 2, 3]);

        let mut it = MemoryMap::new(&bytes).regions();
        assert_eq!(it.by_ref().count(), 1);
        assert_eq!(
            it.error(),
            Some(MemoryMapError::Truncated {
                offset: 24,
                needed: MMAP_RECORD_LEN,
                available: 7,
            })
        );
    }

    #[test]
    fn undersized_record_is_reported() {
        let mut bytes = region(0x1000, 0x1000, RegionKind::Usable).to_record();
        bytes[0..4].copy_from_slice(&0u32.to_le_bytes());

        let mut it = MemoryMap::new(&bytes).regions();
        assert_eq!(it.next(), None);
        assert_eq!(
            it.error(),
            Some(MemoryMapError::RecordTooShort { offset: 0, size: 0 })
        );
    }

    #[test]
    fn empty_map_yields_nothing() {
        let mut it = MemoryMap::empty().regions();
        assert_eq!(it.next(), None);
        assert!(it.error().is_none());
    }

    #[test]
    fn kinds_round_trip_through_raw_markers() {
        assert_eq!(RegionKind::from_raw(0), None);
        assert_eq!(RegionKind::from_raw(1), Some(RegionKind::Usable));
        assert_eq!(RegionKind::from_raw(5), Some(RegionKind::BadMemory));
        assert_eq!(RegionKind::from_raw(12), Some(RegionKind::Other(12)));
        assert_eq!(RegionKind::Other(12).as_raw(), 12);
    }

    #[test]
    fn region_display() {
        let r = region(0x10_0000, 0x1_0000, RegionKind::Usable);
        assert_eq!(r.to_string(), "[0x100000 - 0x110000] (usable)");
        assert!(r.is_usable());
    }
}
