use bitfield_struct::bitfield;
use kernel_memory_addresses::PhysicalAddress;

/// A 32-bit (non-PAE) page directory or page table entry.
///
/// | Bits  | Name | Meaning |
/// |-------|------|---------|
/// | 0     | P    | Present |
/// | 1     | RW   | Writable |
/// | 2     | US   | User accessible |
/// | 3     | PWT  | Write-through |
/// | 4     | PCD  | Cache disable |
/// | 5     | A    | Accessed |
/// | 6     | D    | Dirty (PTE only) |
/// | 7     | PS   | 4 MiB page (PDE only) |
/// | 8     | G    | Global (PTE only) |
/// | 9–11  | AVL  | Free for the OS |
/// | 12–31 | addr | Frame bits `[31:12]` |
#[bitfield(u32)]
#[derive(PartialEq, Eq)]
pub struct PageEntryBits {
    pub present: bool,
    pub writable: bool,
    pub user_access: bool,
    pub write_through: bool,
    pub cache_disabled: bool,
    pub accessed: bool,
    pub dirty: bool,
    pub large_page: bool,
    pub global: bool,
    #[bits(3)]
    pub os_available: u8,
    #[bits(20)]
    frame: u32,
}

impl PageEntryBits {
    /// Entry pointing at `table`, present and writable.
    #[must_use]
    pub fn table_link(table: PhysicalAddress) -> Self {
        Self::new()
            .with_present(true)
            .with_writable(true)
            .with_frame_address(table)
    }

    /// Writable 4 KiB leaf for `frame`.
    #[must_use]
    pub fn leaf(frame: PhysicalAddress, present: bool) -> Self {
        Self::new()
            .with_present(present)
            .with_writable(true)
            .with_frame_address(frame)
    }

    #[must_use]
    pub const fn frame_address(&self) -> PhysicalAddress {
        PhysicalAddress::new((self.frame() as u64) << 12)
    }

    /// Stores the frame bits of `pa`. The low 12 bits are dropped.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn with_frame_address(self, pa: PhysicalAddress) -> Self {
        self.with_frame(((pa.as_u64() >> 12) & 0xF_FFFF) as u32)
    }
}
