use bitfield_struct::bitfield;
use kernel_memory_addresses::PhysicalAddress;

/// CR3: Page-Directory Base Register (32-bit paging, no PAE).
///
/// Holds the physical base address of the page directory and the cache
/// control flags used for directory walks. Loading a new value flushes all
/// non-global TLB entries, which is how an address-space switch works.
#[bitfield(u32)]
pub struct PageDirectoryBase {
    /// Bits 0–2: Reserved (must be 0).
    #[bits(3)]
    pub reserved0: u8,

    /// Bit 3 (PWT): page-level Write-Through for the page directory.
    pub pwt: bool,

    /// Bit 4 (PCD): page-level Cache Disable for the page directory.
    pub pcd: bool,

    /// Bits 5–11: Reserved (must be 0 when written).
    #[bits(7)]
    pub reserved1: u8,

    /// Bits 12–31: page directory physical base >> 12.
    #[bits(20)]
    directory_base_4k: u32,
}

impl PageDirectoryBase {
    /// Create a `PageDirectoryBase` from the page directory's physical address.
    ///
    /// `directory` must be 4 KiB-aligned and below 4 GiB.
    #[must_use]
    pub fn from_directory_phys(directory: PhysicalAddress) -> Self {
        debug_assert_eq!(
            directory.as_u64() & 0xFFF,
            0,
            "page directory must be 4K-aligned"
        );
        debug_assert!(directory.as_u64() <= u64::from(u32::MAX));
        let mut cr3 = Self::new();
        #[allow(clippy::cast_possible_truncation)]
        cr3.set_directory_base_4k((directory.as_u64() >> 12) as u32);
        cr3
    }

    /// Return the full physical address of the page directory.
    #[must_use]
    pub fn directory_phys(&self) -> PhysicalAddress {
        PhysicalAddress::new(u64::from(self.directory_base_4k()) << 12)
    }
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl crate::LoadRegisterUnsafe for PageDirectoryBase {
    unsafe fn load_unsafe() -> Self {
        let mut cr3: u32;
        unsafe {
            core::arch::asm!("mov {}, cr3", out(reg) cr3, options(nomem, nostack, preserves_flags));
        }
        Self::from_bits(cr3)
    }
}

#[cfg(all(feature = "asm", target_arch = "x86"))]
impl crate::StoreRegisterUnsafe for PageDirectoryBase {
    unsafe fn store_unsafe(self) {
        let cr3 = self.into_bits();
        unsafe {
            core::arch::asm!("mov cr3, {}", in(reg) cr3, options(nostack, preserves_flags));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn directory_round_trip() {
        let pd = PhysicalAddress::new(0x0012_3000);
        let cr3 = PageDirectoryBase::from_directory_phys(pd);
        assert_eq!(cr3.directory_phys(), pd);
        assert_eq!(cr3.into_bits(), 0x0012_3000);
    }
}
