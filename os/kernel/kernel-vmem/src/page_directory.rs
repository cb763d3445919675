//! # Two-Level Page Table
//!
//! The directory and its page tables live in one reserved, contiguous
//! physical block (see [`crate::PAGE_TABLE_FOOTPRINT`]):
//!
//! ```text
//! base            base + 4 KiB                      base + 4 KiB + 4 MiB
//! ┌──────────────┬─────────┬─────────┬─────┬─────────┐
//! │ directory    │ table 0 │ table 1 │ ... │ table N │
//! └──────────────┴─────────┴─────────┴─────┴─────────┘
//! ```

use crate::{
    DIRECTORY_ENTRY_SPAN, EntryTable, MapError, PageEntryBits, PageTable, PhysMapper, TableIndex,
};
use kernel_memory_addresses::{PhysicalAddress, Size4K, VirtualAddress, pages_for};
use kernel_registers::PageDirectoryBase;

const WINDOW_END: u64 = 1 << 32;

pub struct TwoLevelPageTable<M: PhysMapper> {
    mapper: M,
    directory: PhysicalAddress,
    flushes: u64,
}

impl<M: PhysMapper> TwoLevelPageTable<M> {
    /// Takes over the reserved block at `base` and clears the directory.
    ///
    /// # Errors
    /// [`MapError::Unaligned`] if `base` is not page aligned.
    pub fn new(mapper: M, base: PhysicalAddress) -> Result<Self, MapError> {
        if !base.is_aligned::<Size4K>() {
            return Err(MapError::Unaligned(base.as_u64()));
        }
        let pt = Self {
            mapper,
            directory: base,
            flushes: 0,
        };
        // SAFETY: the caller reserved the directory frame for us.
        unsafe { pt.mapper.phys_to_mut::<EntryTable>(base).zero() };
        log::debug!(target: "vmem", "page directory at {base}");
        Ok(pt)
    }

    #[must_use]
    pub const fn mapper(&self) -> &M {
        &self.mapper
    }

    #[must_use]
    pub const fn directory(&self) -> PhysicalAddress {
        self.directory
    }

    /// Value to load into CR3 to activate this table.
    #[must_use]
    pub fn directory_base(&self) -> PageDirectoryBase {
        PageDirectoryBase::from_directory_phys(self.directory)
    }

    /// Number of full TLB flushes issued so far.
    #[must_use]
    pub const fn flush_count(&self) -> u64 {
        self.flushes
    }

    /// Loads CR3 with this directory.
    ///
    /// # Safety
    /// The running code and stack must be mapped in this table.
    pub unsafe fn activate(&self) {
        #[cfg(all(target_os = "none", target_arch = "x86"))]
        unsafe {
            use kernel_registers::StoreRegisterUnsafe;
            self.directory_base().store_unsafe();
        }
    }

    const fn table_frame(&self, dir: TableIndex) -> PhysicalAddress {
        PhysicalAddress::new(self.directory.as_u64() + 4096 * (1 + dir.as_usize() as u64))
    }

    #[allow(clippy::mut_from_ref)]
    fn directory_mut(&self) -> &mut EntryTable {
        // SAFETY: reserved at construction; only reached through `&self`/`&mut self` of this table.
        unsafe { self.mapper.phys_to_mut::<EntryTable>(self.directory) }
    }

    /// Page table covering `va`, linking and clearing it on first use if `create` is set.
    #[allow(clippy::mut_from_ref)]
    fn table_mut(&self, va: VirtualAddress, create: bool) -> Option<&mut EntryTable> {
        let dir = TableIndex::directory(va);
        let directory = self.directory_mut();
        let pde = directory.get(dir);
        let frame = self.table_frame(dir);
        // SAFETY: table frames are part of the reserved block.
        let table = unsafe { self.mapper.phys_to_mut::<EntryTable>(frame) };
        if !pde.present() {
            if !create {
                return None;
            }
            table.zero();
            directory.set(dir, PageEntryBits::table_link(frame));
        }
        Some(table)
    }

    fn check_range(virt: VirtualAddress, size: u64) -> Result<(), MapError> {
        if !virt.is_aligned::<Size4K>() {
            return Err(MapError::Unaligned(virt.as_u64()));
        }
        if virt.as_u64() + size > WINDOW_END {
            return Err(MapError::OutOfRange(virt));
        }
        Ok(())
    }

    fn invalidate(&mut self, _virt: VirtualAddress) {
        #[cfg(all(target_os = "none", target_arch = "x86"))]
        unsafe {
            core::arch::asm!("invlpg [{}]", in(reg) _virt.as_u64() as u32, options(nostack, preserves_flags));
        }
    }

    fn entry_phys(&self, virt: VirtualAddress) -> Result<PhysicalAddress, MapError> {
        self.translate(virt).ok_or(MapError::NotMapped(virt))
    }
}

impl<M: PhysMapper> PageTable for TwoLevelPageTable<M> {
    fn map(
        &mut self,
        virt: VirtualAddress,
        phys: PhysicalAddress,
        size: u64,
        present: bool,
        flush: bool,
    ) -> Result<(), MapError> {
        Self::check_range(virt, size)?;
        if !phys.is_aligned::<Size4K>() {
            return Err(MapError::Unaligned(phys.as_u64()));
        }

        for i in 0..pages_for(size) {
            let va = virt + i * 4096;
            let Some(table) = self.table_mut(va, true) else {
                return Err(MapError::NotMapped(va));
            };
            table.set(TableIndex::table(va), PageEntryBits::leaf(phys + i * 4096, present));
            if flush {
                self.invalidate(va);
            }
        }
        Ok(())
    }

    fn unmap(&mut self, virt: VirtualAddress, size: u64, flush: bool) -> Result<(), MapError> {
        Self::check_range(virt, size)?;
        for i in 0..pages_for(size) {
            let va = virt + i * 4096;
            if let Some(table) = self.table_mut(va, false) {
                table.set(TableIndex::table(va), PageEntryBits::new());
            }
            if flush {
                self.invalidate(va);
            }
        }
        Ok(())
    }

    fn translate(&self, virt: VirtualAddress) -> Option<PhysicalAddress> {
        if virt.as_u64() >= WINDOW_END {
            return None;
        }
        let pte = self.table_mut(virt, false)?.get(TableIndex::table(virt));
        pte.present()
            .then(|| pte.frame_address() + virt.page_offset::<Size4K>())
    }

    fn flush(&mut self) {
        self.flushes += 1;
        #[cfg(all(target_os = "none", target_arch = "x86"))]
        unsafe {
            use kernel_registers::{LoadRegisterUnsafe, PageDirectoryBase, StoreRegisterUnsafe};
            PageDirectoryBase::load_unsafe().store_unsafe();
        }
    }

    fn set_writable(&mut self, virt: VirtualAddress, size: u64, writable: bool) -> Result<(), MapError> {
        Self::check_range(virt, size)?;
        for i in 0..pages_for(size) {
            let va = virt + i * 4096;
            let table = self.table_mut(va, false).ok_or(MapError::NotMapped(va))?;
            let idx = TableIndex::table(va);
            table.set(idx, table.get(idx).with_writable(writable));
            self.invalidate(va);
        }
        Ok(())
    }

    fn read_u32(&self, virt: VirtualAddress) -> Result<u32, MapError> {
        Ok(self.mapper.read_u32(self.entry_phys(virt)?))
    }

    fn write_u32(&mut self, virt: VirtualAddress, value: u32) -> Result<(), MapError> {
        let pa = self.entry_phys(virt)?;
        self.mapper.write_u32(pa, value);
        Ok(())
    }

    fn fill_u32(&mut self, virt: VirtualAddress, size: u64, value: u32) -> Result<(), MapError> {
        if !virt.is_aligned::<Size4K>() {
            return Err(MapError::Unaligned(virt.as_u64()));
        }
        for i in 0..pages_for(size) {
            let pa = self.entry_phys(virt + i * 4096)?;
            self.mapper.fill_frame_u32(pa, value);
        }
        Ok(())
    }
}

const _: () = assert!(DIRECTORY_ENTRY_SPAN == 1024 * 4096);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimulatedPhys;

    const BASE: PhysicalAddress = PhysicalAddress::new(0x0040_0000);

    fn table() -> TwoLevelPageTable<SimulatedPhys> {
        TwoLevelPageTable::new(SimulatedPhys::new(), BASE).unwrap()
    }

    #[test]
    fn fill_writes_whole_frames() {
        let mut pt = table();
        let va = VirtualAddress::new(0x4000_0000);
        pt.map(va, PhysicalAddress::new(0x0030_0000), 2 * 4096, true, false).unwrap();
        pt.fill_u32(va, 2 * 4096, 0xEBFE_EBFE).unwrap();
        assert_eq!(pt.read_u32(va).unwrap(), 0xEBFE_EBFE);
        assert_eq!(pt.read_u32(va + 2 * 4096 - 4).unwrap(), 0xEBFE_EBFE);
        assert!(matches!(
            pt.fill_u32(va + 2 * 4096, 4096, 0),
            Err(MapError::NotMapped(_))
        ));
    }

    #[test]
    fn map_links_table_and_writes_leaf() {
        let mut pt = table();
        let va = VirtualAddress::new(0x4000_3000);
        let pa = PhysicalAddress::new(0x0030_0000);
        pt.map(va, pa, 4096, true, false).unwrap();

        let pde = pt.directory_mut().get(TableIndex::directory(va));
        assert!(pde.present());
        assert_eq!(pde.frame_address(), BASE + 4096 * (1 + 0x100));
        assert_eq!(pt.translate(va + 0x10), Some(pa + 0x10));
    }

    #[test]
    fn multi_page_map_is_linear() {
        let mut pt = table();
        let va = VirtualAddress::new(0x003F_E000);
        pt.map(va, PhysicalAddress::new(0x1000), 4 * 4096, true, true).unwrap();
        for i in 0..4 {
            assert_eq!(
                pt.translate(va + i * 4096),
                Some(PhysicalAddress::new(0x1000 + i * 4096))
            );
        }
    }

    #[test]
    fn unmap_clears_only_requested_pages() {
        let mut pt = table();
        let va = VirtualAddress::new(0x0C00_0000);
        pt.map(va, PhysicalAddress::new(0x0C00_0000), 2 * 4096, true, false).unwrap();
        pt.unmap(va, 4096, false).unwrap();
        assert!(!pt.is_mapped(va));
        assert!(pt.is_mapped(va + 4096));
    }

    #[test]
    fn not_present_mapping_does_not_translate() {
        let mut pt = table();
        let va = VirtualAddress::new(0x5000);
        pt.map(va, PhysicalAddress::new(0x9000), 4096, false, false).unwrap();
        assert_eq!(pt.translate(va), None);
    }

    #[test]
    fn rejects_unaligned_and_out_of_window() {
        let mut pt = table();
        assert_eq!(
            pt.map(VirtualAddress::new(0x1001), PhysicalAddress::new(0), 4096, true, false),
            Err(MapError::Unaligned(0x1001))
        );
        let high = VirtualAddress::new(0xFFFF_F000);
        assert!(matches!(
            pt.map(high, PhysicalAddress::new(0), 2 * 4096, true, false),
            Err(MapError::OutOfRange(_))
        ));
    }

    #[test]
    fn write_through_mapping_lands_in_frame() {
        let mut pt = table();
        let va = VirtualAddress::new(0x4000_0000);
        let pa = PhysicalAddress::new(0x0020_0000);
        pt.map(va, pa, 4096, true, false).unwrap();
        pt.write_u32(va + 8, 0xEBFE_EBFE).unwrap();
        assert_eq!(pt.mapper().read_u32(pa + 8), 0xEBFE_EBFE);
        assert_eq!(
            pt.read_u32(VirtualAddress::new(0x5000_0000)),
            Err(MapError::NotMapped(VirtualAddress::new(0x5000_0000)))
        );
    }

    #[test]
    fn set_writable_toggles_bit() {
        let mut pt = table();
        let va = VirtualAddress::new(0x2000);
        pt.map(va, PhysicalAddress::new(0x2000), 4096, true, false).unwrap();
        pt.set_writable(va, 4096, false).unwrap();
        let e = pt.table_mut(va, false).unwrap().get(TableIndex::table(va));
        assert!(!e.writable());
        assert!(e.present());
    }

    #[test]
    fn flush_is_counted() {
        let mut pt = table();
        pt.flush();
        pt.flush();
        assert_eq!(pt.flush_count(), 2);
    }
}
