//! # Virtual Page Manager
//!
//! Hands out mapped kernel virtual memory from three pools:
//!
//! | Pool       | Virtual allocator                        | Backing frames              |
//! |------------|------------------------------------------|-----------------------------|
//! | `Normal`   | buddy stage, then free-list stage        | physical page manager       |
//! | `Identity` | free list over the identity window       | the frame at the same address |
//! | `Global`   | free list                                | physical page manager       |
//!
//! An allocation of `n` pages takes `n` frames and `n` virtual pages, maps
//! them pairwise in chain order and flushes the page table once. Freeing
//! looks up the backing frame first, then unmaps every mapped page of the
//! virtual allocation and releases both sides.
//!
//! With [`VirtualPageManagerConfig::protected_regions`] each virtual
//! allocation gets an unmapped guard page on either side; the returned
//! address is that of the second virtual page.
//!
//! Lock order: pool, then page table. The physical manager locks on its own
//! and is never entered while it holds a lock.

use crate::allocator::PageFrameAllocator;
use crate::options::{AllocatePageOptions, PageAllocationPool, PageFrameAllocatorTraceOptions};
use crate::page::{Page, PageNumber};
use crate::pool::PoolAllocator;
use crate::{
    BuddyAllocator, InitialAllocator, MultiAllocator, PageFrameAllocatorExt, PhysicalPageManager,
    SetupError, fatal,
};
use kernel_info::memory::{MemoryLayout, SELF_TEST_PATTERN};
use kernel_memory_addresses::{
    AddressSpaceKind, MemoryAddress, MemoryRegion, PAGE_SIZE, PhysicalAddress, VirtualAddress, pages_for,
};
use kernel_sync::{Cpu, InterruptControl, SpinMonitor};
use kernel_vmem::{MapError, PageTable};
use log::{info, warn};
use utils_accessors_derive::Setters;

const SELF_TEST_BLOCK: u64 = 4;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Setters)]
pub struct VirtualPageManagerConfig {
    /// Surround every allocation with unmapped guard pages.
    pub protected_regions: bool,
    /// Exercise the normal and identity pools during setup.
    pub self_test: bool,
}

impl VirtualPageManagerConfig {
    pub const DEFAULT: Self = Self {
        protected_regions: cfg!(feature = "protected-regions"),
        self_test: true,
    };
}

impl Default for VirtualPageManagerConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Page records of the virtual pools, sized by [`VirtualPoolStorage::pages`].
pub struct VirtualPoolStorage<'a> {
    pub normal_initial: &'a mut [Page],
    pub normal_buddy: &'a mut [Page],
    pub identity: &'a mut [Page],
    pub global: &'a mut [Page],
}

impl VirtualPoolStorage<'_> {
    /// Records needed per pool, in field order.
    #[must_use]
    pub const fn pages(layout: &MemoryLayout) -> [u64; 4] {
        [
            layout.normal_initial.pages(),
            layout.normal_buddy.pages(),
            layout.identity.pages(),
            layout.global.pages(),
        ]
    }
}

pub struct VirtualPageManager<'a, T: PageTable, I: InterruptControl = Cpu> {
    physical: PhysicalPageManager<'a, I>,
    table: SpinMonitor<T, I>,
    normal: SpinMonitor<PoolAllocator<'a>, I>,
    identity: SpinMonitor<PoolAllocator<'a>, I>,
    global: SpinMonitor<PoolAllocator<'a>, I>,
    identity_region: MemoryRegion,
    global_region: MemoryRegion,
    config: VirtualPageManagerConfig,
}

impl<'a, T: PageTable, I: InterruptControl> VirtualPageManager<'a, T, I> {
    /// Builds the pools and, if configured, runs the self test on the
    /// normal and identity pools.
    ///
    /// # Errors
    /// A pool region or its storage is unusable, or a self-test mapping failed.
    pub fn setup(
        physical: PhysicalPageManager<'a, I>,
        table: T,
        layout: &MemoryLayout,
        storage: VirtualPoolStorage<'a>,
        config: VirtualPageManagerConfig,
    ) -> Result<Self, SetupError> {
        let kind = AddressSpaceKind::Virtual;
        let buddy = BuddyAllocator::new(layout.normal_buddy, storage.normal_buddy, kind, "VirtBuddy")?;
        let initial = InitialAllocator::new(layout.normal_initial, storage.normal_initial, kind, "VirtInitial")?;
        let normal = MultiAllocator::new(buddy, initial, "VirtMulti");
        let identity = InitialAllocator::new(layout.identity, storage.identity, kind, "VirtIdentityInitial")?;
        let global = InitialAllocator::new(layout.global, storage.global, kind, "GlobalInitial")?;

        let manager = Self {
            physical,
            table: SpinMonitor::new(table),
            normal: SpinMonitor::new(normal.into()),
            identity: SpinMonitor::new(identity.into()),
            global: SpinMonitor::new(global.into()),
            identity_region: layout.identity,
            global_region: layout.global,
            config,
        };
        info!(
            target: "alloc::virt",
            "pools ready, guard pages {}",
            if config.protected_regions { "on" } else { "off" }
        );

        if config.self_test {
            manager.self_test(PageAllocationPool::Normal)?;
            manager.self_test(PageAllocationPool::Identity)?;
        }
        manager.dump_stats();
        Ok(manager)
    }

    #[must_use]
    pub const fn physical(&self) -> &PhysicalPageManager<'a, I> {
        &self.physical
    }

    #[must_use]
    pub const fn config(&self) -> VirtualPageManagerConfig {
        self.config
    }

    const fn pool(&self, pool: PageAllocationPool) -> &SpinMonitor<PoolAllocator<'a>, I> {
        match pool {
            PageAllocationPool::Normal => &self.normal,
            PageAllocationPool::Identity => &self.identity,
            PageAllocationPool::Global => &self.global,
        }
    }

    /// Allocates `pages` mapped pages from `options.pool`.
    ///
    /// `None` for `pages == 0`; exhaustion of either side is fatal.
    pub fn allocate_pages(&self, pages: u64, options: AllocatePageOptions) -> Option<VirtualAddress> {
        if pages == 0 {
            warn!(target: "alloc::virt", "requested 0 pages from {:?}", options.pool);
            return None;
        }
        match options.pool {
            PageAllocationPool::Normal | PageAllocationPool::Global => {
                self.allocate_backed(self.pool(options.pool), pages, options)
            }
            PageAllocationPool::Identity => self.allocate_identity(pages, options),
        }
    }

    pub fn allocate_page(&self, options: AllocatePageOptions) -> Option<VirtualAddress> {
        self.allocate_pages(1, options)
    }

    /// Enough mapped pages for `size` bytes; empty for `size == 0`.
    pub fn allocate_region(&self, size: u64, options: AllocatePageOptions) -> MemoryRegion {
        let pages = pages_for(size);
        self.allocate_pages(pages, options).map_or_else(MemoryRegion::empty, |va| {
            MemoryRegion::from_address(va.as_memory_address(), pages * PAGE_SIZE)
        })
    }

    fn virtual_pages(&self, pages: u64) -> u64 {
        if self.config.protected_regions { pages + 2 } else { pages }
    }

    fn first_mapped(&self, pool: &PoolAllocator<'_>, head: PageNumber) -> PageNumber {
        if !self.config.protected_regions {
            return head;
        }
        match pool.next_compound_page(head) {
            Some(next) => next,
            None => fatal!("[{}] guarded allocation at {head} has no body", pool.debug_name()),
        }
    }

    fn allocate_backed(
        &self,
        monitor: &SpinMonitor<PoolAllocator<'a>, I>,
        pages: u64,
        options: AllocatePageOptions,
    ) -> Option<VirtualAddress> {
        let phys_head = self.physical.allocate_pages(pages, options)?;
        let mut pool = monitor.enter();
        let virt_head = pool.allocate_pages(self.virtual_pages(pages), options)?;
        let first = self.first_mapped(&pool, virt_head);

        let mut table = self.table.enter();
        let mut v = Some(first);
        let mut p = Some(phys_head);
        while let (Some(vn), Some(pn)) = (v, p) {
            map_page(&mut *table, virt(vn), self.physical.address(pn));
            v = pool.next_compound_page(vn);
            p = self.physical.next_compound_page(pn);
        }
        table.flush();
        Some(virt(first))
    }

    fn allocate_identity(&self, pages: u64, options: AllocatePageOptions) -> Option<VirtualAddress> {
        let mut pool = self.identity.enter();
        let head = pool.allocate_pages(self.virtual_pages(pages), options)?;
        let first = self.first_mapped(&pool, head);

        let mut table = self.table.enter();
        let mut v = Some(first);
        for _ in 0..pages {
            let Some(vn) = v else { break };
            let va = virt(vn);
            map_page(&mut *table, va, PhysicalAddress::new(va.as_u64()));
            v = pool.next_compound_page(vn);
        }
        table.flush();
        Some(virt(first))
    }

    /// Releases the allocation starting at `addr`, routed by pool region.
    pub fn free_addr(&self, addr: VirtualAddress) {
        if self.identity_region.contains(addr) {
            self.release(&self.identity, addr, false);
        } else if self.global_region.contains(addr) {
            self.release(&self.global, addr, true);
        } else {
            self.release(&self.normal, addr, true);
        }
    }

    fn release(&self, monitor: &SpinMonitor<PoolAllocator<'a>, I>, addr: VirtualAddress, backed: bool) {
        let backing = {
            let mut pool = monitor.enter();
            let mut table = self.table.enter();
            let backing = if backed {
                match table.translate(addr) {
                    Some(pa) => Some(pa),
                    None => fatal!("[{}] free of unmapped address {addr}", pool.debug_name()),
                }
            } else {
                None
            };

            let head_addr = if self.config.protected_regions { addr - PAGE_SIZE } else { addr };
            let head = PageNumber::containing(head_addr);
            let mut cur = Some(head);
            while let Some(n) = cur {
                let va = virt(n);
                if table.is_mapped(va)
                    && let Err(e) = table.unmap(va, PAGE_SIZE, false)
                {
                    fatal!("[{}] unmapping {va}: {e}", pool.debug_name());
                }
                cur = pool.next_compound_page(n);
            }
            table.flush();
            pool.free(head);
            backing
        };

        if let Some(pa) = backing {
            self.physical.free_addr(pa);
        }
    }

    /// Physical address `addr` is mapped to.
    #[must_use]
    pub fn translate(&self, addr: VirtualAddress) -> Option<PhysicalAddress> {
        self.table.enter().translate(addr)
    }

    /// # Errors
    /// `addr` is not mapped.
    pub fn read_u32(&self, addr: VirtualAddress) -> Result<u32, MapError> {
        self.table.enter().read_u32(addr)
    }

    /// # Errors
    /// `addr` is not mapped.
    pub fn write_u32(&self, addr: VirtualAddress, value: u32) -> Result<(), MapError> {
        self.table.enter().write_u32(addr, value)
    }

    /// # Errors
    /// Part of the range is not mapped.
    pub fn set_writable(&self, addr: VirtualAddress, size: u64, writable: bool) -> Result<(), MapError> {
        self.table.enter().set_writable(addr, size, writable)
    }

    /// Runs `f` on the page table.
    pub fn with_table<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        self.table.with(f)
    }

    #[must_use]
    pub fn free_pages(&self, pool: PageAllocationPool) -> u64 {
        self.pool(pool).enter().free_pages()
    }

    #[must_use]
    pub fn total_pages(&self, pool: PageAllocationPool) -> u64 {
        self.pool(pool).enter().total_pages()
    }

    /// Copy of the record of virtual page `num` in `pool`.
    #[must_use]
    pub fn page(&self, pool: PageAllocationPool, num: PageNumber) -> Option<Page> {
        self.pool(pool).enter().page(num).copied()
    }

    pub fn set_trace_options(&self, options: PageFrameAllocatorTraceOptions) {
        for pool in [&self.normal, &self.identity, &self.global] {
            pool.enter().set_trace_options(options);
        }
    }

    pub fn dump_stats(&self) {
        for pool in [&self.normal, &self.identity, &self.global] {
            pool.enter().dump_stats();
        }
    }

    /// Allocates 4-page blocks from `pool` until it is exhausted, maps each
    /// to one shared physical block, writes a pattern through it and frees
    /// everything again. The pool's free count must come out unchanged.
    ///
    /// The block addresses are kept in a list allocated from the normal pool,
    /// so the free count is taken before the list exists and compared after
    /// it is gone.
    ///
    /// # Errors
    /// A mapping failed.
    pub fn self_test(&self, pool: PageAllocationPool) -> Result<(), MapError> {
        let monitor = self.pool(pool);
        let name = monitor.enter().debug_name();
        info!(target: "alloc::virt", "self test {name}");

        let before = monitor.enter().free_pages();
        let list_pages = pages_for(monitor.enter().total_pages() * 4).max(1);
        let list_opts = AllocatePageOptions::new().with_debug_name("SelfTestList");
        let Some(list) = self.allocate_pages(list_pages, list_opts) else {
            fatal!("[{name}] no memory for the self test list");
        };
        let block_opts = AllocatePageOptions::new().with_continuous(true).with_debug_name("SelfTest");
        let Some(block) = self.physical.allocate_pages_addr(SELF_TEST_BLOCK, block_opts) else {
            fatal!("[{name}] no physical block for the self test");
        };

        let count = {
            let a = monitor.enter();
            (a.free_pages() - a.critical_low_pages()) / SELF_TEST_BLOCK
        };
        let size = SELF_TEST_BLOCK * PAGE_SIZE;
        for i in 0..count {
            let Some(addr) = monitor.enter().allocate_pages_addr(SELF_TEST_BLOCK, block_opts) else {
                break;
            };
            let va = VirtualAddress::new(addr.as_u64());
            let mut table = self.table.enter();
            table.write_u32(list + i * 4, word(name, addr))?;
            table.map(va, block, size, true, true)?;
            table.fill_u32(va, size, SELF_TEST_PATTERN)?;
            table.unmap(va, size, true)?;
        }
        self.physical.free_addr(block);

        for i in 0..count {
            let addr = self.table.enter().read_u32(list + i * 4)?;
            monitor.enter().free_addr(MemoryAddress::new(u64::from(addr)));
        }
        self.free_addr(list);

        let after = monitor.enter().free_pages();
        if after != before {
            fatal!("[{name}] self test leaked {} pages", before.abs_diff(after));
        }
        info!(target: "alloc::virt", "self test {name} done");
        Ok(())
    }
}

const fn virt(num: PageNumber) -> VirtualAddress {
    VirtualAddress::new(num.address().as_u64())
}

fn word(name: &str, addr: MemoryAddress) -> u32 {
    match u32::try_from(addr.as_u64()) {
        Ok(w) => w,
        Err(_) => fatal!("[{name}] address {addr} does not fit 32 bits"),
    }
}

fn map_page(table: &mut impl PageTable, va: VirtualAddress, pa: PhysicalAddress) {
    if let Err(e) = table.map(va, pa, PAGE_SIZE, true, false) {
        fatal!("mapping {va} to {pa}: {e}");
    }
}
