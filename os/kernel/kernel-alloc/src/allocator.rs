//! # Page Frame Allocator Contract
//!
//! [`PageFrameAllocator`] is what every allocator variant implements and
//! what the page managers build on. Allocations are identified by the
//! [`PageNumber`] of their head page; [`PageFrameAllocator::next_compound_page`]
//! walks the remaining pages of an allocation in order.
//!
//! Allocation either succeeds or stops the kernel through [`crate::fatal()`].
//! The only `None` an allocation returns is for a zero-page request, which
//! is logged and otherwise ignored. The same holds for freeing: a double free
//! or a free of a reserved page is fatal.
//!
//! [`PageFrameAllocatorExt`] adds the address-based conveniences on top.

use crate::options::{AllocatePageOptions, PageFrameAllocatorTraceOptions};
use crate::page::{Page, PageNumber};
use kernel_memory_addresses::{AddressSpaceKind, MemoryAddress, MemoryRegion, PAGE_SIZE, pages_for};
use log::{info, warn};

pub trait PageFrameAllocator {
    /// Allocates `pages` pages and returns the head of the allocation.
    ///
    /// `None` only for `pages == 0`. Exhaustion is fatal.
    fn allocate_pages(&mut self, pages: u64, options: AllocatePageOptions) -> Option<PageNumber>;

    fn allocate_page(&mut self, options: AllocatePageOptions) -> Option<PageNumber> {
        self.allocate_pages(1, options)
    }

    /// Releases the allocation headed by `head`.
    fn free(&mut self, head: PageNumber);

    /// Record of page `num`, if this allocator covers it.
    fn page(&self, num: PageNumber) -> Option<&Page>;

    fn page_by_address(&self, addr: MemoryAddress) -> Option<&Page> {
        self.page(PageNumber::containing(addr))
    }

    /// Record at position `index` counted over all pages of this allocator.
    fn page_by_index(&self, index: u64) -> Option<&Page>;

    /// Position of page `num` counted over all pages of this allocator.
    fn page_index(&self, num: PageNumber) -> Option<u64>;

    fn page_index_of_address(&self, addr: MemoryAddress) -> Option<u64> {
        self.page_index(PageNumber::containing(addr))
    }

    #[inline]
    fn address(&self, num: PageNumber) -> MemoryAddress {
        num.address()
    }

    /// The page after `num` in address order.
    fn next_page(&self, num: PageNumber) -> Option<PageNumber>;

    /// The next page of the allocation `num` belongs to, `None` after its last page.
    fn next_compound_page(&self, num: PageNumber) -> Option<PageNumber>;

    fn total_pages(&self) -> u64;

    fn free_pages(&self) -> u64;

    /// Number of successful allocations.
    fn requests(&self) -> u64;

    /// Number of frees.
    fn releases(&self) -> u64;

    /// Largest request a single allocation can satisfy.
    fn max_pages_per_allocation(&self) -> u64;

    /// Pages kept back from callers that probe for free memory.
    fn critical_low_pages(&self) -> u64 {
        0
    }

    /// Whether a request of `pages` pages would succeed right now.
    fn can_allocate(&self, pages: u64, _options: AllocatePageOptions) -> bool {
        pages <= self.max_pages_per_allocation() && pages <= self.free_pages()
    }

    fn region(&self) -> MemoryRegion;

    fn address_space_kind(&self) -> AddressSpaceKind;

    fn debug_name(&self) -> &'static str;

    fn set_trace_options(&mut self, options: PageFrameAllocatorTraceOptions);

    fn contains_page(&self, num: PageNumber) -> bool {
        self.contains_address(num.address())
    }

    fn contains_address(&self, addr: MemoryAddress) -> bool {
        self.region().contains(addr)
    }
}

/// Address-based helpers available on every [`PageFrameAllocator`].
pub trait PageFrameAllocatorExt: PageFrameAllocator {
    /// Like [`PageFrameAllocator::allocate_pages`], returning the base address.
    fn allocate_pages_addr(&mut self, pages: u64, options: AllocatePageOptions) -> Option<MemoryAddress> {
        self.allocate_pages(pages, options).map(PageNumber::address)
    }

    fn allocate_page_addr(&mut self, options: AllocatePageOptions) -> Option<MemoryAddress> {
        self.allocate_pages_addr(1, options)
    }

    /// Frees the allocation whose head page contains `addr`.
    fn free_addr(&mut self, addr: MemoryAddress) {
        self.free(PageNumber::containing(addr));
    }

    /// Allocates enough whole pages for `size` bytes. Empty for `size == 0`.
    fn allocate_region(&mut self, size: u64, options: AllocatePageOptions) -> MemoryRegion {
        let pages = pages_for(size);
        match self.allocate_pages_addr(pages, options) {
            Some(start) => MemoryRegion::from_address(start, pages * PAGE_SIZE),
            None => MemoryRegion::empty(),
        }
    }

    fn used_pages(&self) -> u64 {
        self.total_pages() - self.free_pages()
    }

    fn dump_stats(&self) {
        let total = self.total_pages();
        let free = self.free_pages();
        info!(
            target: "alloc",
            "[{}] Pages: {total}, Free: {free}, Used: {} ({} KiB free), Requests: {}, Releases: {}",
            self.debug_name(),
            total - free,
            free * PAGE_SIZE / 1024,
            self.requests(),
            self.releases()
        );
    }

    /// Status of every page, 64 per line.
    fn dump_pages(&self) {
        const PER_LINE: usize = 64;
        let total = self.total_pages();
        let mut line = [b' '; PER_LINE];
        let mut start = 0;
        while start < total {
            let count = usize::try_from((total - start).min(PER_LINE as u64)).unwrap_or(PER_LINE);
            for (i, slot) in line.iter_mut().enumerate() {
                *slot = if i < count {
                    self.page_by_index(start + i as u64)
                        .map_or(b'?', |p| p.status().symbol())
                } else {
                    b' '
                };
            }
            let text = core::str::from_utf8(&line[..count]).unwrap_or("");
            let base = self.page_by_index(start).map_or(0, |p| p.address().as_u64());
            info!(target: "alloc", "[{}] {base:08X} {text}", self.debug_name());
            start += PER_LINE as u64;
        }
    }
}

impl<A: PageFrameAllocator + ?Sized> PageFrameAllocatorExt for A {}

/// Common handling of a zero-page request.
pub(crate) fn reject_empty_request(name: &str) -> Option<PageNumber> {
    warn!(target: "alloc", "[{name}] requested 0 pages");
    None
}

/// Fatal out-of-memory stop with the allocator's state.
#[cold]
pub(crate) fn out_of_memory(name: &str, pages: u64, free: u64) -> ! {
    crate::fatal!("[{name}] out of memory. Free pages: {free}, requested: {pages}")
}
