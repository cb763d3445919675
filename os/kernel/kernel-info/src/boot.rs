//! # Kernel Boot Information
//!
//! What the boot loader hands to the memory subsystem: the amount of
//! installed RAM and a memory map of typed `(start, size)` entries.

use kernel_memory_addresses::{AddressSpaceKind, MemoryRegion};

/// Type tag of a boot memory map entry.
///
/// Only three categories drive allocation decisions (see
/// [`BootMemoryType::category`]); the finer tags are kept so diagnostics can
/// tell firmware regions apart from loader- or kernel-created ones.
#[repr(u8)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub enum BootMemoryType {
    #[default]
    Unknown = 0,
    SystemUsable = 1,
    Reserved = 2,
    AcpiReclaimable = 3,
    AcpiNvs = 4,
    BadMemory = 5,
    KernelElf = 7,
    BootInfoHeader = 8,
    PageTable = 12,
    InitialStack = 13,
    /// Like [`BootMemoryType::Reserved`], but added manually.
    CustomReserved = 15,
    /// Backing storage of the kernel memory map itself.
    KernelMemoryMap = 17,
    /// Backing storage of a page frame allocator's page array.
    PageFrameAllocator = 18,
    /// The page managers avoid this region even if it is usable.
    /// May overlap with other entries.
    KernelReserved = 19,
}

/// The three bookkeeping categories a boot map entry is sorted into.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum MemoryCategory {
    SystemUsable,
    Used,
    KernelReserved,
}

impl BootMemoryType {
    #[must_use]
    pub const fn category(self) -> MemoryCategory {
        match self {
            Self::SystemUsable => MemoryCategory::SystemUsable,
            Self::KernelReserved => MemoryCategory::KernelReserved,
            _ => MemoryCategory::Used,
        }
    }
}

/// One entry of the boot memory map.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct BootMemoryRegion {
    pub start: u64,
    pub size: u64,
    pub kind: BootMemoryType,
    /// The address space `start` refers to.
    pub address_space: AddressSpaceKind,
}

impl BootMemoryRegion {
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
    pub const fn region(&self) -> MemoryRegion {
        MemoryRegion::new(self.start, self.size)
    }

    #[must_use]
    pub const fn end(&self) -> u64 {
        self.start + self.size
    }

    #[must_use]
    pub const fn contains(&self, addr: u64) -> bool {
        self.start <= addr && addr < self.end()
    }
}

/// Boot loader handoff relevant to memory management.
#[derive(Copy, Clone, Debug)]
pub struct BootInfo<'a> {
    /// Installed physical memory in bytes.
    pub installed_memory: u64,
    pub memory_map: &'a [BootMemoryRegion],
}

impl<'a> BootInfo<'a> {
    #[must_use]
    pub const fn new(installed_memory: u64, memory_map: &'a [BootMemoryRegion]) -> Self {
        Self {
            installed_memory,
            memory_map,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories() {
        assert_eq!(BootMemoryType::SystemUsable.category(), MemoryCategory::SystemUsable);
        assert_eq!(BootMemoryType::KernelReserved.category(), MemoryCategory::KernelReserved);
        assert_eq!(BootMemoryType::KernelElf.category(), MemoryCategory::Used);
        assert_eq!(BootMemoryType::AcpiNvs.category(), MemoryCategory::Used);
    }

    #[test]
    fn entry_contains() {
        let e = BootMemoryRegion::new(0x1000, 0x1000, BootMemoryType::Reserved, AddressSpaceKind::Both);
        assert!(e.contains(0x1000));
        assert!(!e.contains(0x2000));
        assert_eq!(e.region().size(), 0x1000);
    }
}
