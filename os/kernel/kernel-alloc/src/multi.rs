//! # Dispatching Allocator
//!
//! Two allocators over disjoint regions behind one interface. Requests below
//! [`MULTI_ALLOCATOR_THRESHOLD`] pages go to the fast allocator while it can
//! serve them; everything else goes to the bulk allocator. Lookups and frees
//! go to whichever allocator contains the page.

use crate::allocator::PageFrameAllocator;
use crate::fatal;
use crate::options::{AllocatePageOptions, PageFrameAllocatorTraceOptions};
use crate::page::{Page, PageNumber};
use kernel_info::memory::MULTI_ALLOCATOR_THRESHOLD;
use kernel_memory_addresses::{AddressSpaceKind, MemoryAddress, MemoryRegion};

pub struct MultiAllocator<A, B> {
    fast: A,
    bulk: B,
    name: &'static str,
}

impl<A: PageFrameAllocator, B: PageFrameAllocator> MultiAllocator<A, B> {
    #[must_use]
    pub const fn new(fast: A, bulk: B, name: &'static str) -> Self {
        Self { fast, bulk, name }
    }

    #[must_use]
    pub const fn fast(&self) -> &A {
        &self.fast
    }

    #[must_use]
    pub const fn bulk(&self) -> &B {
        &self.bulk
    }

    fn owner(&self, num: PageNumber) -> &dyn PageFrameAllocator {
        if self.fast.contains_page(num) {
            &self.fast
        } else if self.bulk.contains_page(num) {
            &self.bulk
        } else {
            fatal!("[{}] page {num} belongs to no sub-allocator", self.name)
        }
    }

    fn owner_mut(&mut self, num: PageNumber) -> &mut dyn PageFrameAllocator {
        if self.fast.contains_page(num) {
            &mut self.fast
        } else if self.bulk.contains_page(num) {
            &mut self.bulk
        } else {
            fatal!("[{}] page {num} belongs to no sub-allocator", self.name)
        }
    }
}

impl<A: PageFrameAllocator, B: PageFrameAllocator> PageFrameAllocator for MultiAllocator<A, B> {
    fn allocate_pages(&mut self, pages: u64, options: AllocatePageOptions) -> Option<PageNumber> {
        if pages < MULTI_ALLOCATOR_THRESHOLD && self.fast.can_allocate(pages, options) {
            self.fast.allocate_pages(pages, options)
        } else {
            self.bulk.allocate_pages(pages, options)
        }
    }

    fn free(&mut self, head: PageNumber) {
        self.owner_mut(head).free(head);
    }

    fn page(&self, num: PageNumber) -> Option<&Page> {
        if self.fast.contains_page(num) {
            self.fast.page(num)
        } else {
            self.bulk.page(num)
        }
    }

    fn page_by_index(&self, index: u64) -> Option<&Page> {
        let fast = self.fast.total_pages();
        if index < fast {
            self.fast.page_by_index(index)
        } else {
            self.bulk.page_by_index(index - fast)
        }
    }

    fn page_index(&self, num: PageNumber) -> Option<u64> {
        if self.fast.contains_page(num) {
            self.fast.page_index(num)
        } else {
            self.bulk
                .page_index(num)
                .map(|i| i + self.fast.total_pages())
        }
    }

    fn next_page(&self, num: PageNumber) -> Option<PageNumber> {
        self.owner(num).next_page(num)
    }

    fn next_compound_page(&self, num: PageNumber) -> Option<PageNumber> {
        self.owner(num).next_compound_page(num)
    }

    fn total_pages(&self) -> u64 {
        self.fast.total_pages() + self.bulk.total_pages()
    }

    fn free_pages(&self) -> u64 {
        self.fast.free_pages() + self.bulk.free_pages()
    }

    fn requests(&self) -> u64 {
        self.fast.requests() + self.bulk.requests()
    }

    fn releases(&self) -> u64 {
        self.fast.releases() + self.bulk.releases()
    }

    fn max_pages_per_allocation(&self) -> u64 {
        self.fast
            .max_pages_per_allocation()
            .max(self.bulk.max_pages_per_allocation())
    }

    fn critical_low_pages(&self) -> u64 {
        self.fast.critical_low_pages() + self.bulk.critical_low_pages()
    }

    fn can_allocate(&self, pages: u64, options: AllocatePageOptions) -> bool {
        self.fast.can_allocate(pages, options) || self.bulk.can_allocate(pages, options)
    }

    fn region(&self) -> MemoryRegion {
        let (a, b) = (self.fast.region(), self.bulk.region());
        let start = a.start().min(b.start());
        let end = a.end().max(b.end());
        MemoryRegion::from_address(start, end - start)
    }

    fn address_space_kind(&self) -> AddressSpaceKind {
        self.fast.address_space_kind()
    }

    fn debug_name(&self) -> &'static str {
        self.name
    }

    fn set_trace_options(&mut self, options: PageFrameAllocatorTraceOptions) {
        self.fast.set_trace_options(options);
        self.bulk.set_trace_options(options);
    }

    fn contains_address(&self, addr: MemoryAddress) -> bool {
        self.fast.contains_address(addr) || self.bulk.contains_address(addr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{BuddyAllocator, InitialAllocator};
    use kernel_memory_addresses::PAGE_SIZE;

    const INITIAL: u64 = 0x4000_0000;
    const BUDDY: u64 = 0x4080_0000;

    fn with_multi(test: impl FnOnce(&mut MultiAllocator<BuddyAllocator<'_>, InitialAllocator<'_>>)) {
        let mut a = vec![Page::default(); 512];
        let mut b = vec![Page::default(); 2048];
        let fast = BuddyAllocator::new(
            MemoryRegion::new(BUDDY, 512 * PAGE_SIZE),
            &mut a,
            AddressSpaceKind::Virtual,
            "buddy",
        )
        .unwrap();
        let bulk = InitialAllocator::new(
            MemoryRegion::new(INITIAL, 2048 * PAGE_SIZE),
            &mut b,
            AddressSpaceKind::Virtual,
            "initial",
        )
        .unwrap();
        test(&mut MultiAllocator::new(fast, bulk, "multi"));
    }

    #[test]
    fn routes_by_size() {
        with_multi(|m| {
            let small = m.allocate_pages(3, AllocatePageOptions::new()).unwrap();
            assert!(m.fast().contains_page(small));
            let large = m.allocate_pages(600, AllocatePageOptions::new()).unwrap();
            assert!(m.bulk().contains_page(large));
            assert_eq!(m.free_pages(), 512 + 2048 - 4 - 600);
            assert_eq!(m.requests(), 2);

            m.free(small);
            m.free(large);
            assert_eq!(m.free_pages(), 512 + 2048);
            assert_eq!(m.releases(), 2);
        });
    }

    #[test]
    fn requests_beyond_the_largest_block_go_to_bulk() {
        with_multi(|m| {
            let head = m.allocate_pages(300, AllocatePageOptions::new()).unwrap();
            assert!(m.bulk().contains_page(head));
        });
    }

    #[test]
    fn falls_back_when_fast_is_exhausted() {
        with_multi(|m| {
            m.allocate_pages(256, AllocatePageOptions::new()).unwrap();
            m.allocate_pages(256, AllocatePageOptions::new()).unwrap();
            assert_eq!(m.fast().free_pages(), 0);
            let head = m.allocate_page(AllocatePageOptions::new()).unwrap();
            assert!(m.bulk().contains_page(head));
        });
    }

    #[test]
    fn combined_geometry() {
        with_multi(|m| {
            assert_eq!(m.total_pages(), 2560);
            assert_eq!(m.region().start().as_u64(), INITIAL);
            assert_eq!(m.region().end().as_u64(), BUDDY + 512 * PAGE_SIZE);
            assert_eq!(m.address_space_kind(), AddressSpaceKind::Virtual);
            let buddy_first = PageNumber::containing(MemoryAddress::new(BUDDY));
            assert_eq!(m.page_index(buddy_first), Some(0));
            let initial_first = PageNumber::containing(MemoryAddress::new(INITIAL));
            assert_eq!(m.page_index(initial_first), Some(512));
            assert_eq!(m.page_by_index(512).unwrap().address().as_u64(), INITIAL);
        });
    }

    #[test]
    #[should_panic(expected = "belongs to no sub-allocator")]
    fn foreign_free_is_fatal() {
        with_multi(|m| m.free(PageNumber::new(1)));
    }
}
