use crate::{KernelMemoryMap, KernelMemoryMapArray, MemoryMapError};
use kernel_info::boot::{BootInfo, BootMemoryType, MemoryCategory};
use kernel_info::memory::{
    KERNEL_MEMORY_MAP_SIZE, KERNEL_RESERVED_MAP_CAPACITY, SYSTEM_USABLE_MAP_CAPACITY,
    USED_MAP_CAPACITY,
};
use kernel_memory_addresses::{AddressSpaceKind, PAGE_SIZE};
use log::{debug, info};

const TARGET: &str = "mmap";

pub struct KernelMemoryMapManager {
    system_usable: KernelMemoryMapArray<SYSTEM_USABLE_MAP_CAPACITY>,
    used: KernelMemoryMapArray<USED_MAP_CAPACITY>,
    kernel_reserved: KernelMemoryMapArray<KERNEL_RESERVED_MAP_CAPACITY>,
    initial_map: KernelMemoryMap,
}

impl KernelMemoryMapManager {
    /// Sorts the boot map into the three categories and registers the
    /// manager's own storage as used.
    ///
    /// # Errors
    /// No place for the initial map, or more boot entries than an array holds.
    pub fn setup(boot: &BootInfo<'_>) -> Result<Self, MemoryMapError> {
        let addr = Self::find_initial_page(boot).ok_or(MemoryMapError::NoInitialPage)?;
        info!(target: TARGET, "Initial Page: {addr:#X}");

        let mut mgr = Self {
            system_usable: KernelMemoryMapArray::new(),
            used: KernelMemoryMapArray::new(),
            kernel_reserved: KernelMemoryMapArray::new(),
            initial_map: KernelMemoryMap::new(
                addr,
                KERNEL_MEMORY_MAP_SIZE,
                BootMemoryType::KernelMemoryMap,
                AddressSpaceKind::Both,
            ),
        };

        for entry in boot.memory_map {
            let map = KernelMemoryMap::from(entry);
            match entry.kind.category() {
                MemoryCategory::SystemUsable => mgr.system_usable.add(map)?,
                MemoryCategory::KernelReserved => mgr.kernel_reserved.add(map)?,
                MemoryCategory::Used => mgr.used.add(map)?,
            }
        }
        mgr.used.add(mgr.initial_map)?;

        info!(
            target: TARGET,
            "Filling Lists Done. SystemUsable: {}, KernelReserved: {}, Used: {}",
            mgr.system_usable.count(),
            mgr.kernel_reserved.count(),
            mgr.used.count()
        );
        mgr.print();
        Ok(mgr)
    }

    /// The first address right after a non-usable entry that lies in usable
    /// memory and in no other entry.
    fn find_initial_page(boot: &BootInfo<'_>) -> Option<u64> {
        boot.memory_map
            .iter()
            .filter(|m| m.kind != BootMemoryType::SystemUsable)
            .map(|m| m.end())
            .find(|&addr| {
                let mut in_usable = false;
                for m in boot.memory_map {
                    if !m.contains(addr) {
                        continue;
                    }
                    if m.kind != BootMemoryType::SystemUsable {
                        return false;
                    }
                    in_usable = true;
                }
                in_usable
            })
    }

    /// Carves `size` bytes from the first usable gap that directly follows a
    /// used entry and records it as used. The gap starts on the next page
    /// boundary.
    ///
    /// # Errors
    /// [`MemoryMapError::NoGap`] if no such gap exists.
    pub fn allocate(
        &mut self,
        size: u64,
        kind: BootMemoryType,
        address_space: AddressSpaceKind,
    ) -> Result<KernelMemoryMap, MemoryMapError> {
        let candidate = self
            .used
            .iter()
            .map(|m| KernelMemoryMap::new(m.end().next_multiple_of(PAGE_SIZE), size, kind, address_space))
            .find(|c| self.is_usable(c))
            .ok_or(MemoryMapError::NoGap { size })?;

        self.used.add(candidate)?;
        debug!(
            target: TARGET,
            "Allocated: at {:08X}, size {:08X}, type {:?}",
            candidate.start,
            size,
            kind
        );
        Ok(candidate)
    }

    fn is_usable(&self, candidate: &KernelMemoryMap) -> bool {
        !self.used.intersects(candidate)
            && !self.kernel_reserved.intersects(candidate)
            && self.system_usable.contains(candidate)
    }

    #[must_use]
    pub const fn system_usable(&self) -> &KernelMemoryMapArray<SYSTEM_USABLE_MAP_CAPACITY> {
        &self.system_usable
    }

    #[must_use]
    pub const fn used(&self) -> &KernelMemoryMapArray<USED_MAP_CAPACITY> {
        &self.used
    }

    #[must_use]
    pub const fn kernel_reserved(&self) -> &KernelMemoryMapArray<KERNEL_RESERVED_MAP_CAPACITY> {
        &self.kernel_reserved
    }

    #[must_use]
    pub const fn initial_map(&self) -> KernelMemoryMap {
        self.initial_map
    }

    pub fn print(&self) {
        Self::print_array("SystemUsable", self.system_usable.as_slice());
        Self::print_array("KernelReserved", self.kernel_reserved.as_slice());
        Self::print_array("Used", self.used.as_slice());
    }

    fn print_array(name: &str, maps: &[KernelMemoryMap]) {
        debug!(target: TARGET, "Items of MemoryMap Array [{name}]");
        for m in maps {
            debug!(target: TARGET, "{m:?}");
        }
    }
}
