//! # Physical Page Manager
//!
//! Owns the one allocator over installed RAM. Setup:
//!
//! 1. Records the page array in the kernel memory map so its frames are
//!    never handed out.
//! 2. Builds a free-list allocator over `[0, installed)`. A page is
//!    `Used` if a physical `Used` or `KernelReserved` map entry covers it,
//!    `Free` if a `SystemUsable` entry does, `Reserved` otherwise. The
//!    identity window is always `Reserved`.
//! 3. Overwrites kernel-reserved frames that are not in use with
//!    `0xFFFFFFFF`.
//! 4. Optionally allocates every free frame once, writes a test pattern
//!    into it and frees it again.
//!
//! Frames are written through a scratch mapping at [`SCRATCH_PAGE`].
//!
//! All operations lock the allocator with interrupts masked, so they may be
//! called from the clock interrupt as well.

use crate::allocator::PageFrameAllocator;
use crate::options::{AllocatePageOptions, PageFrameAllocatorTraceOptions};
use crate::page::{Page, PageNumber, PageStatus};
use crate::{InitialAllocator, PageFrameAllocatorExt, SetupError, fatal};
use kernel_info::boot::BootMemoryType;
use kernel_info::memory::{MemoryLayout, RESERVED_FILL_PATTERN, SELF_TEST_PATTERN};
use kernel_memory_addresses::{
    AddressSpaceKind, MemoryAddress, MemoryRegion, PAGE_SIZE, PhysicalAddress, VirtualAddress,
};
use kernel_mmap::{KernelMemoryMap, KernelMemoryMapManager};
use kernel_sync::{Cpu, InterruptControl, SpinMonitor};
use kernel_vmem::{MapError, PageTable};
use log::{debug, info};
use utils_accessors_derive::Setters;

/// Virtual page used to reach a physical frame during setup.
pub const SCRATCH_PAGE: u64 = 0x2000;

const SELF_TEST_TAG: &str = "SelfTest";

#[derive(Copy, Clone, Debug, Eq, PartialEq, Setters)]
pub struct PhysicalPageManagerConfig {
    /// Write a pattern into every free frame during setup.
    pub self_test: bool,
}

impl PhysicalPageManagerConfig {
    pub const DEFAULT: Self = Self { self_test: true };
}

impl Default for PhysicalPageManagerConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

pub struct PhysicalPageManager<'a, I: InterruptControl = Cpu> {
    allocator: SpinMonitor<InitialAllocator<'a>, I>,
}

impl<'a, I: InterruptControl> PhysicalPageManager<'a, I> {
    pub const DEBUG_NAME: &'static str = "PhysInitial";

    /// Number of page records [`Self::setup`] needs for `installed_memory` bytes.
    #[must_use]
    pub const fn storage_pages(installed_memory: u64) -> u64 {
        installed_memory / PAGE_SIZE
    }

    /// # Errors
    /// The memory map has no room for the page array, `storage` is too
    /// small, or a scratch mapping failed.
    pub fn setup(
        mmap: &mut KernelMemoryMapManager,
        installed_memory: u64,
        layout: &MemoryLayout,
        storage: &'a mut [Page],
        table: &mut impl PageTable,
        config: PhysicalPageManagerConfig,
    ) -> Result<Self, SetupError> {
        let region = MemoryRegion::new(0, installed_memory & !(PAGE_SIZE - 1));
        let array_size = region.pages() * size_of::<Page>() as u64;
        let array = mmap.allocate(array_size, BootMemoryType::PageFrameAllocator, AddressSpaceKind::Both)?;
        debug!(
            target: "alloc::phys",
            "page array at {:08X}, {} KiB",
            array.start,
            array_size / 1024
        );

        let identity = layout.identity;
        let allocator = InitialAllocator::with_status(
            region,
            storage,
            AddressSpaceKind::Physical,
            Self::DEBUG_NAME,
            |addr| initial_status(mmap, identity, addr),
        )?;
        let manager = Self {
            allocator: SpinMonitor::new(allocator),
        };

        Self::clear_kernel_reserved(mmap, installed_memory, table)?;
        if config.self_test {
            manager.self_test(table)?;
        }
        manager.dump_stats();
        Ok(manager)
    }

    fn clear_kernel_reserved(
        mmap: &KernelMemoryMapManager,
        installed_memory: u64,
        table: &mut impl PageTable,
    ) -> Result<(), MapError> {
        for map in mmap
            .kernel_reserved()
            .iter()
            .filter(|m| m.address_space.includes_physical())
        {
            debug!(
                target: "alloc::phys",
                "clearing kernel reserved {:08X}-{:08X}, skipping used regions",
                map.start,
                map.end()
            );
            let mut addr = map.start & !(PAGE_SIZE - 1);
            while addr < map.end().min(installed_memory) {
                if !mmap.used().contains_addr(addr) {
                    fill_frame(table, addr, RESERVED_FILL_PATTERN)?;
                }
                addr += PAGE_SIZE;
            }
        }
        Ok(())
    }

    /// Allocates every free frame, writes the test pattern into it and frees
    /// it again. The free page count must come out unchanged.
    ///
    /// # Errors
    /// The scratch mapping failed.
    pub fn self_test(&self, table: &mut impl PageTable) -> Result<(), MapError> {
        let mut a = self.allocator.enter();
        let before = a.free_pages();
        let count = before - a.critical_low_pages();
        info!(target: "alloc::phys", "self test over {count} pages");

        let opts = AllocatePageOptions::new().with_debug_name(SELF_TEST_TAG);
        for _ in 0..count {
            let Some(num) = a.allocate_page(opts) else { break };
            fill_frame(table, num.address().as_u64(), SELF_TEST_PATTERN)?;
        }

        for index in 0..a.total_pages() {
            let tagged = a
                .page_by_index(index)
                .filter(|p| p.is_used() && p.debug_tag() == Some(SELF_TEST_TAG))
                .map(Page::number);
            if let Some(num) = tagged {
                a.free(num);
            }
        }

        let after = a.free_pages();
        if after != before {
            fatal!("[{}] self test leaked {} pages", Self::DEBUG_NAME, before.abs_diff(after));
        }
        info!(target: "alloc::phys", "self test done");
        Ok(())
    }

    pub fn allocate_pages(&self, pages: u64, options: AllocatePageOptions) -> Option<PageNumber> {
        self.allocator.enter().allocate_pages(pages, options)
    }

    pub fn allocate_page(&self, options: AllocatePageOptions) -> Option<PageNumber> {
        self.allocate_pages(1, options)
    }

    pub fn allocate_pages_addr(&self, pages: u64, options: AllocatePageOptions) -> Option<PhysicalAddress> {
        self.allocate_pages(pages, options).map(|n| phys(n.address()))
    }

    pub fn allocate_page_addr(&self, options: AllocatePageOptions) -> Option<PhysicalAddress> {
        self.allocate_pages_addr(1, options)
    }

    pub fn allocate_region(&self, size: u64, options: AllocatePageOptions) -> MemoryRegion {
        self.allocator.enter().allocate_region(size, options)
    }

    pub fn free(&self, head: PageNumber) {
        self.allocator.enter().free(head);
    }

    pub fn free_addr(&self, addr: PhysicalAddress) {
        self.free(PageNumber::containing(addr));
    }

    /// Copy of the record of page `num`.
    #[must_use]
    pub fn page(&self, num: PageNumber) -> Option<Page> {
        self.allocator.enter().page(num).copied()
    }

    #[must_use]
    pub fn phys_page(&self, addr: PhysicalAddress) -> Option<Page> {
        self.page(PageNumber::containing(addr))
    }

    #[must_use]
    pub fn address(&self, num: PageNumber) -> PhysicalAddress {
        phys(num.address())
    }

    #[must_use]
    pub fn next_page(&self, num: PageNumber) -> Option<PageNumber> {
        self.allocator.enter().next_page(num)
    }

    #[must_use]
    pub fn next_compound_page(&self, num: PageNumber) -> Option<PageNumber> {
        self.allocator.enter().next_compound_page(num)
    }

    #[must_use]
    pub fn total_pages(&self) -> u64 {
        self.allocator.enter().total_pages()
    }

    #[must_use]
    pub fn free_pages(&self) -> u64 {
        self.allocator.enter().free_pages()
    }

    #[must_use]
    pub fn critical_low_pages(&self) -> u64 {
        self.allocator.enter().critical_low_pages()
    }

    #[must_use]
    pub fn region(&self) -> MemoryRegion {
        self.allocator.enter().region()
    }

    pub fn set_trace_options(&self, options: PageFrameAllocatorTraceOptions) {
        self.allocator.enter().set_trace_options(options);
    }

    pub fn dump_stats(&self) {
        self.allocator.enter().dump_stats();
    }

    pub fn dump_pages(&self) {
        self.allocator.enter().dump_pages();
    }
}

const fn phys(addr: MemoryAddress) -> PhysicalAddress {
    PhysicalAddress::new(addr.as_u64())
}

fn initial_status(mmap: &KernelMemoryMapManager, identity: MemoryRegion, addr: MemoryAddress) -> PageStatus {
    if identity.contains(addr) {
        return PageStatus::Reserved;
    }
    let a = addr.as_u64();
    let covers = |m: &KernelMemoryMap| m.address_space.includes_physical() && m.contains_addr(a);
    if mmap.used().iter().any(covers) || mmap.kernel_reserved().iter().any(covers) {
        PageStatus::Used
    } else if mmap.system_usable().iter().any(covers) {
        PageStatus::Free
    } else {
        PageStatus::Reserved
    }
}

/// Fills the frame at `frame` with `value` through the scratch mapping.
fn fill_frame(table: &mut impl PageTable, frame: u64, value: u32) -> Result<(), MapError> {
    let scratch = VirtualAddress::new(SCRATCH_PAGE);
    table.map(scratch, PhysicalAddress::new(frame), PAGE_SIZE, true, true)?;
    table.fill_u32(scratch, PAGE_SIZE, value)?;
    table.unmap(scratch, PAGE_SIZE, true)
}
