use crate::PageEntryBits;
use kernel_memory_addresses::VirtualAddress;

pub const ENTRIES_PER_TABLE: usize = 1024;

/// Index into a page directory (VA bits `[31:22]`) or a page table (VA bits `[21:12]`).
#[repr(transparent)]
#[derive(Copy, Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct TableIndex(u16);

impl TableIndex {
    #[inline]
    #[must_use]
    pub const fn new(v: u16) -> Self {
        debug_assert!((v as usize) < ENTRIES_PER_TABLE);
        Self(v)
    }

    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn directory(va: VirtualAddress) -> Self {
        Self::new(((va.as_u64() >> 22) & 0x3FF) as u16)
    }

    #[inline]
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn table(va: VirtualAddress) -> Self {
        Self::new(((va.as_u64() >> 12) & 0x3FF) as u16)
    }

    #[inline]
    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

/// One 4 KiB frame of entries; used for both the directory and the page tables.
#[repr(C, align(4096))]
pub struct EntryTable {
    entries: [PageEntryBits; ENTRIES_PER_TABLE],
}

impl EntryTable {
    #[inline]
    #[must_use]
    pub const fn get(&self, i: TableIndex) -> PageEntryBits {
        self.entries[i.as_usize()]
    }

    #[inline]
    pub const fn set(&mut self, i: TableIndex, e: PageEntryBits) {
        self.entries[i.as_usize()] = e;
    }

    #[inline]
    pub fn zero(&mut self) {
        self.entries.fill(PageEntryBits::new());
    }
}

const _: () = assert!(size_of::<EntryTable>() == 4096);
