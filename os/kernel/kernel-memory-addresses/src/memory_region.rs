use crate::{MemoryAddress, PAGE_SIZE, Size4K, floor_to_power_of_two};
use core::fmt;

/// A contiguous `(start, size)` address range.
///
/// Used for physical and virtual ranges alike. When a region backs a page
/// allocator, both `start` and `size` are page-aligned.
#[derive(Copy, Clone, Default, Eq, PartialEq, Hash)]
pub struct MemoryRegion {
    start: MemoryAddress,
    size: u64,
}

impl MemoryRegion {
    #[inline]
    #[must_use]
    pub const fn new(start: u64, size: u64) -> Self {
        Self {
            start: MemoryAddress::new(start),
            size,
        }
    }

    #[inline]
    #[must_use]
    pub const fn from_address(start: MemoryAddress, size: u64) -> Self {
        Self { start, size }
    }

    /// The empty region at address zero.
    #[inline]
    #[must_use]
    pub const fn empty() -> Self {
        Self::new(0, 0)
    }

    #[inline]
    #[must_use]
    pub const fn start(&self) -> MemoryAddress {
        self.start
    }

    #[inline]
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// Exclusive end address.
    #[inline]
    #[must_use]
    pub const fn end(&self) -> MemoryAddress {
        MemoryAddress::new(self.start.as_u64() + self.size)
    }

    #[inline]
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Number of whole pages in this region.
    #[inline]
    #[must_use]
    pub const fn pages(&self) -> u64 {
        self.size / PAGE_SIZE
    }

    #[inline]
    #[must_use]
    pub const fn is_page_aligned(&self) -> bool {
        self.start.is_aligned::<Size4K>() && self.size % PAGE_SIZE == 0
    }

    #[inline]
    pub fn contains(&self, addr: impl Into<MemoryAddress>) -> bool {
        let addr = addr.into();
        self.start <= addr && addr < self.end()
    }

    /// `true` if `other` lies completely inside this region.
    #[inline]
    #[must_use]
    pub fn contains_region(&self, other: &Self) -> bool {
        other.start >= self.start && other.end() <= self.end()
    }

    /// `true` if the two regions share at least one byte.
    #[inline]
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        self.start < other.end() && other.start < self.end()
    }

    /// Cut the region so it ends no later than `location`.
    #[must_use]
    pub fn trim_end(&self, location: impl Into<MemoryAddress>) -> Self {
        let location = location.into();
        if location <= self.start {
            return Self::from_address(self.start, 0);
        }
        if location >= self.end() {
            return *self;
        }
        Self::from_address(self.start, location - self.start)
    }

    /// Shrink the size down to the next power of two.
    #[must_use]
    pub const fn floor_size_to_power_of_two(&self) -> Self {
        Self {
            start: self.start,
            size: floor_to_power_of_two(self.size),
        }
    }
}

impl fmt::Debug for MemoryRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "MemoryRegion(0x{:08X}..0x{:08X}, {:#X} bytes)",
            self.start.as_u64(),
            self.end().as_u64(),
            self.size
        )
    }
}

impl fmt::Display for MemoryRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:08X}-{:08X}",
            self.start.as_u64(),
            self.end().as_u64().saturating_sub(1)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PhysicalAddress, VirtualAddress};

    #[test]
    fn contains_is_half_open() {
        let r = MemoryRegion::new(0x1000, 0x2000);
        assert!(r.contains(PhysicalAddress::new(0x1000)));
        assert!(r.contains(VirtualAddress::new(0x2FFF)));
        assert!(!r.contains(MemoryAddress::new(0x3000)));
        assert!(!r.contains(MemoryAddress::new(0x0FFF)));
    }

    #[test]
    fn intersection() {
        let a = MemoryRegion::new(0x1000, 0x2000);
        assert!(a.intersects(&MemoryRegion::new(0x2000, 0x1000)));
        assert!(!a.intersects(&MemoryRegion::new(0x3000, 0x1000)));
        assert!(!a.intersects(&MemoryRegion::new(0x0, 0x1000)));
        assert!(!a.intersects(&MemoryRegion::new(0x1800, 0)));
    }

    #[test]
    fn containment_of_regions() {
        let outer = MemoryRegion::new(0, 0x10_0000);
        assert!(outer.contains_region(&MemoryRegion::new(0x1000, 0x1000)));
        assert!(!outer.contains_region(&MemoryRegion::new(0xF_F000, 0x2000)));
    }

    #[test]
    fn trim_end_cuts_tail() {
        let r = MemoryRegion::new(0, 256 * 1024 * 1024);
        let trimmed = r.trim_end(MemoryAddress::new(0x0C00_0000));
        assert_eq!(trimmed.size(), 0x0C00_0000);
        assert_eq!(r.trim_end(MemoryAddress::new(0x2000_0000)), r);
        assert!(r.trim_end(MemoryAddress::new(0)).is_empty());
    }

    #[test]
    fn floor_power_of_two() {
        let r = MemoryRegion::new(0x4000_0000, 30 * 1024 * 1024);
        assert_eq!(r.floor_size_to_power_of_two().size(), 16 * 1024 * 1024);
        assert_eq!(r.floor_size_to_power_of_two().start(), r.start());
    }
}
