use std::collections::BTreeSet;

use crate::error::RangeError;

/// A virtual address interval mapped into the device's address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MappedRange {
    pub base: u64,
    pub size: u64,
}

impl MappedRange {
    pub const fn new(base: u64, size: u64) -> Self {
        Self { base, size }
    }

    /// Exclusive end address, saturating at `u64::MAX`.
    pub fn end(&self) -> u64 {
        self.base.saturating_add(self.size)
    }

    pub fn contains(&self, addr: u64) -> bool {
        self.base <= addr && addr < self.end()
    }

    /// Bytes available from `addr` to the end of this range, if `addr` lies inside it.
    pub fn available_from(&self, addr: u64) -> Option<u64> {
        self.contains(addr).then(|| self.end() - addr)
    }
}

/// Set of mapped ranges.
///
/// Ranges are tracked as exact `(base, size)` pairs: overlapping entries are allowed and are never
/// merged, and unmapping requires the identical pair.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MappedRanges {
    ranges: BTreeSet<MappedRange>,
}

impl MappedRanges {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a range. Mapping an already-present pair is a no-op.
    pub fn map(&mut self, base: u64, size: u64) {
        self.ranges.insert(MappedRange::new(base, size));
    }

    pub fn unmap(&mut self, base: u64, size: u64) -> Result<(), RangeError> {
        if self.ranges.remove(&MappedRange::new(base, size)) {
            Ok(())
        } else {
            Err(RangeError::NotMapped { base, size })
        }
    }

    pub fn is_mapped(&self, base: u64, size: u64) -> bool {
        self.ranges.contains(&MappedRange::new(base, size))
    }

    /// Contiguous bytes available from `addr`.
    ///
    /// When several ranges contain `addr` the largest availability wins. Returns `None` if no range
    /// contains it.
    pub fn available_from(&self, addr: u64) -> Option<u64> {
        self.ranges
            .iter()
            .filter_map(|r| r.available_from(addr))
            .max()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MappedRange> {
        self.ranges.iter()
    }
}
