//! Closed set of allocator variants a virtual pool can be built from.
//!
//! The variant is chosen once when a pool is set up; every call then goes
//! through a `match` instead of a vtable.

use crate::allocator::PageFrameAllocator;
use crate::options::{AllocatePageOptions, PageFrameAllocatorTraceOptions};
use crate::page::{Page, PageNumber};
use crate::{BitmapAllocator, BuddyAllocator, InitialAllocator, MultiAllocator};
use kernel_memory_addresses::{AddressSpaceKind, MemoryAddress, MemoryRegion};

/// The two-stage allocator of the normal pool.
pub type StagedAllocator<'a> = MultiAllocator<BuddyAllocator<'a>, InitialAllocator<'a>>;

pub enum PoolAllocator<'a> {
    Initial(InitialAllocator<'a>),
    Buddy(BuddyAllocator<'a>),
    Bitmap(BitmapAllocator<'a>),
    Staged(StagedAllocator<'a>),
}

macro_rules! dispatch {
    ($self:expr, $a:ident => $body:expr) => {
        match $self {
            PoolAllocator::Initial($a) => $body,
            PoolAllocator::Buddy($a) => $body,
            PoolAllocator::Bitmap($a) => $body,
            PoolAllocator::Staged($a) => $body,
        }
    };
}

impl<'a> From<InitialAllocator<'a>> for PoolAllocator<'a> {
    fn from(a: InitialAllocator<'a>) -> Self {
        Self::Initial(a)
    }
}

impl<'a> From<BuddyAllocator<'a>> for PoolAllocator<'a> {
    fn from(a: BuddyAllocator<'a>) -> Self {
        Self::Buddy(a)
    }
}

impl<'a> From<BitmapAllocator<'a>> for PoolAllocator<'a> {
    fn from(a: BitmapAllocator<'a>) -> Self {
        Self::Bitmap(a)
    }
}

impl<'a> From<StagedAllocator<'a>> for PoolAllocator<'a> {
    fn from(a: StagedAllocator<'a>) -> Self {
        Self::Staged(a)
    }
}

impl PageFrameAllocator for PoolAllocator<'_> {
    fn allocate_pages(&mut self, pages: u64, options: AllocatePageOptions) -> Option<PageNumber> {
        dispatch!(self, a => a.allocate_pages(pages, options))
    }

    fn free(&mut self, head: PageNumber) {
        dispatch!(self, a => a.free(head));
    }

    fn page(&self, num: PageNumber) -> Option<&Page> {
        dispatch!(self, a => a.page(num))
    }

    fn page_by_index(&self, index: u64) -> Option<&Page> {
        dispatch!(self, a => a.page_by_index(index))
    }

    fn page_index(&self, num: PageNumber) -> Option<u64> {
        dispatch!(self, a => a.page_index(num))
    }

    fn next_page(&self, num: PageNumber) -> Option<PageNumber> {
        dispatch!(self, a => a.next_page(num))
    }

    fn next_compound_page(&self, num: PageNumber) -> Option<PageNumber> {
        dispatch!(self, a => a.next_compound_page(num))
    }

    fn total_pages(&self) -> u64 {
        dispatch!(self, a => a.total_pages())
    }

    fn free_pages(&self) -> u64 {
        dispatch!(self, a => a.free_pages())
    }

    fn requests(&self) -> u64 {
        dispatch!(self, a => a.requests())
    }

    fn releases(&self) -> u64 {
        dispatch!(self, a => a.releases())
    }

    fn max_pages_per_allocation(&self) -> u64 {
        dispatch!(self, a => a.max_pages_per_allocation())
    }

    fn critical_low_pages(&self) -> u64 {
        dispatch!(self, a => a.critical_low_pages())
    }

    fn can_allocate(&self, pages: u64, options: AllocatePageOptions) -> bool {
        dispatch!(self, a => a.can_allocate(pages, options))
    }

    fn region(&self) -> MemoryRegion {
        dispatch!(self, a => a.region())
    }

    fn address_space_kind(&self) -> AddressSpaceKind {
        dispatch!(self, a => a.address_space_kind())
    }

    fn debug_name(&self) -> &'static str {
        dispatch!(self, a => a.debug_name())
    }

    fn set_trace_options(&mut self, options: PageFrameAllocatorTraceOptions) {
        dispatch!(self, a => a.set_trace_options(options));
    }

    fn contains_address(&self, addr: MemoryAddress) -> bool {
        dispatch!(self, a => a.contains_address(addr))
    }
}
