use core::fmt;
use kernel_info::boot::{BootMemoryRegion, BootMemoryType};
use kernel_memory_addresses::{AddressSpaceKind, MemoryRegion};

/// One entry of the kernel memory map.
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct KernelMemoryMap {
    pub start: u64,
    pub size: u64,
    pub kind: BootMemoryType,
    /// The address space `start` refers to.
    pub address_space: AddressSpaceKind,
}

impl KernelMemoryMap {
    pub const EMPTY: Self = Self::new(0, 0, BootMemoryType::Unknown, AddressSpaceKind::None);

    #[must_use]
    pub const fn new(start: u64, size: u64, kind: BootMemoryType, address_space: AddressSpaceKind) -> Self {
        Self {
            start,
            size,
            kind,
            address_space,
        }
    }

    #[must_use]
    pub const fn end(&self) -> u64 {
        self.start + self.size
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.size == 0
    }

    #[must_use]
    pub const fn region(&self) -> MemoryRegion {
        MemoryRegion::new(self.start, self.size)
    }

    #[must_use]
    pub const fn contains_addr(&self, addr: u64) -> bool {
        self.start <= addr && addr < self.end()
    }

    /// Whether `map` lies entirely inside this entry.
    #[must_use]
    pub const fn contains_map(&self, map: &Self) -> bool {
        self.start <= map.start && map.end() <= self.end()
    }

    /// Whether the two ranges share at least one byte.
    #[must_use]
    pub const fn intersects(&self, map: &Self) -> bool {
        !self.is_empty() && !map.is_empty() && self.start < map.end() && map.start < self.end()
    }
}

impl From<&BootMemoryRegion> for KernelMemoryMap {
    fn from(r: &BootMemoryRegion) -> Self {
        Self::new(r.start, r.size, r.kind, r.address_space)
    }
}

impl Default for KernelMemoryMap {
    fn default() -> Self {
        Self::EMPTY
    }
}

impl fmt::Debug for KernelMemoryMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Map Start={:08X}, Size={:08X}, Type={:?}, AddrKind={:?}",
            self.start, self.size, self.kind, self.address_space
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn m(start: u64, size: u64) -> KernelMemoryMap {
        KernelMemoryMap::new(start, size, BootMemoryType::Reserved, AddressSpaceKind::Both)
    }

    #[test]
    fn adjacent_ranges_do_not_intersect() {
        assert!(!m(0x1000, 0x1000).intersects(&m(0x2000, 0x1000)));
        assert!(m(0x1000, 0x1001).intersects(&m(0x2000, 0x1000)));
    }

    #[test]
    fn enclosing_range_intersects() {
        assert!(m(0x2000, 0x1000).intersects(&m(0x0, 0x10000)));
    }

    #[test]
    fn contains_map_includes_exact_end() {
        assert!(m(0, 0x4000).contains_map(&m(0x3000, 0x1000)));
        assert!(!m(0, 0x4000).contains_map(&m(0x3000, 0x1001)));
    }
}
