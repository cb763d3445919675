//! # Free-List Allocator
//!
//! Keeps every free page on one circular doubly linked list in address
//! order (as built) and hands pages out from its head. An allocation is
//! itself a circular list of its pages, starting at the head page.
//!
//! Requests of more than one page on a virtual allocator, or with
//! [`AllocatePageOptions::continuous`], must be consecutive frames. The
//! allocator looks for a run of consecutive page numbers on the free list
//! and rotates the list so the run comes first. If there is none, the list is
//! rebuilt in address order and searched once more before giving up.

use crate::allocator::{PageFrameAllocator, out_of_memory, reject_empty_request};
use crate::frames::PageFrames;
use crate::options::{AllocatePageOptions, PageFrameAllocatorTraceOptions};
use crate::page::{NONE, Page, PageNumber, PageStatus};
use crate::{SetupError, fatal};
use kernel_memory_addresses::{AddressSpaceKind, MemoryAddress, MemoryRegion};
use log::{debug, trace};

pub struct InitialAllocator<'a> {
    frames: PageFrames<'a>,
    free_list: u32,
    free_pages: u64,
    requests: u64,
    releases: u64,
    kind: AddressSpaceKind,
    name: &'static str,
    trace: PageFrameAllocatorTraceOptions,
}

impl<'a> InitialAllocator<'a> {
    /// An allocator over `region` with every page free.
    ///
    /// # Errors
    /// See [`SetupError`].
    pub fn new(
        region: MemoryRegion,
        storage: &'a mut [Page],
        kind: AddressSpaceKind,
        name: &'static str,
    ) -> Result<Self, SetupError> {
        Self::with_status(region, storage, kind, name, |_| PageStatus::Free)
    }

    /// An allocator over `region` whose pages start out as `status` says.
    ///
    /// # Errors
    /// See [`SetupError`].
    pub fn with_status(
        region: MemoryRegion,
        storage: &'a mut [Page],
        kind: AddressSpaceKind,
        name: &'static str,
        mut status: impl FnMut(MemoryAddress) -> PageStatus,
    ) -> Result<Self, SetupError> {
        let mut frames = PageFrames::new(region, storage)?;
        for page in frames.iter_mut() {
            page.set_status(status(page.address()));
        }

        let mut allocator = Self {
            frames,
            free_list: NONE,
            free_pages: 0,
            requests: 0,
            releases: 0,
            kind,
            name,
            trace: PageFrameAllocatorTraceOptions::DISABLED,
        };
        allocator.build_free_list();
        debug!(
            target: "alloc::initial",
            "[{name}] {region}: {} pages, {} free",
            allocator.frames.len(),
            allocator.free_pages
        );
        Ok(allocator)
    }

    /// Links all free pages in address order and recounts them.
    fn build_free_list(&mut self) {
        self.free_list = NONE;
        let mut free = 0;
        for idx in 0..self.frames.len() {
            if self.frames.get(idx).is_free() {
                self.frames.push_back(&mut self.free_list, idx);
                free += 1;
            }
        }
        self.free_pages = free;

        let listed = self.frames.list_len(self.free_list);
        if listed != free {
            fatal!("[{}] free list holds {listed} pages, counter says {free}", self.name);
        }
    }

    /// Rotates the free list so that it starts with `pages` consecutive frames.
    fn move_to_free_continuous(&mut self, pages: u64) -> bool {
        if self.free_list == NONE {
            return false;
        }
        let mut cur = self.free_list;
        let mut run_head = cur;
        let mut run_len = 1;
        for _ in 0..self.free_pages {
            if run_len >= pages {
                self.free_list = run_head;
                return true;
            }
            let next = self.frames.get(cur).next;
            if next == self.free_list {
                break;
            }
            if next == cur + 1 {
                run_len += 1;
            } else {
                run_head = next;
                run_len = 1;
            }
            cur = next;
        }
        if run_len >= pages {
            self.free_list = run_head;
            return true;
        }
        false
    }

    fn pop_free(&mut self) -> u32 {
        let idx = self.free_list;
        self.frames.unlink(&mut self.free_list, idx);
        idx
    }
}

impl PageFrameAllocator for InitialAllocator<'_> {
    fn allocate_pages(&mut self, pages: u64, options: AllocatePageOptions) -> Option<PageNumber> {
        if pages == 0 {
            return reject_empty_request(self.name);
        }
        if pages > self.free_pages {
            out_of_memory(self.name, pages, self.free_pages);
        }
        if self.trace.traces(pages) {
            trace!(target: "alloc::initial", "[{}] requesting {pages} pages", self.name);
        }

        if pages > 1 && (self.kind == AddressSpaceKind::Virtual || options.continuous) {
            if !self.move_to_free_continuous(pages) {
                self.build_free_list();
                if !self.move_to_free_continuous(pages) {
                    fatal!(
                        "[{}] out of memory: no consecutive run of {pages} pages, {} free",
                        self.name,
                        self.free_pages
                    );
                }
            }
        }

        let tag = options.debug_name;
        let head = self.pop_free();
        let page = self.frames.get_mut(head);
        page.take(head, tag);
        page.set_pages_used(u32::try_from(pages).unwrap_or(u32::MAX));

        let mut chain = head;
        for _ in 1..pages {
            let idx = self.pop_free();
            self.frames.push_back(&mut chain, idx);
            self.frames.get_mut(idx).take(head, tag);
        }

        self.free_pages -= pages;
        self.requests += 1;
        let num = self.frames.number_of(head);
        if self.trace.traces(pages) {
            trace!(
                target: "alloc::initial",
                "[{}] allocated {pages} pages at {:08X}, {} free",
                self.name,
                num.address().as_u64(),
                self.free_pages
            );
        }
        Some(num)
    }

    fn free(&mut self, head: PageNumber) {
        let Some(idx) = self.frames.index_of(head) else {
            fatal!("[{}] page {head} is outside {}", self.name, self.frames.region());
        };
        let page = *self.frames.get(idx);
        match page.status() {
            PageStatus::Used => {}
            PageStatus::Free => fatal!("[{}] double free of page {head}", self.name),
            PageStatus::Reserved => fatal!("[{}] free of reserved page {head}", self.name),
        }
        if page.head != idx {
            fatal!("[{}] page {head} does not head an allocation", self.name);
        }

        let expected = u64::from(page.pages_used());
        let mut count = 0;
        let mut cur = idx;
        loop {
            let next = self.frames.get(cur).next;
            self.frames.get_mut(cur).release();
            self.frames.push_back(&mut self.free_list, cur);
            count += 1;
            if next == idx || count > expected {
                break;
            }
            cur = next;
        }
        if count != expected {
            fatal!(
                "[{}] allocation at {head} released {count} pages, {expected} recorded",
                self.name
            );
        }

        self.free_pages += count;
        self.releases += 1;
        if self.trace.traces(count) {
            trace!(target: "alloc::initial", "[{}] freed {count} pages at {head}", self.name);
        }
    }

    fn page(&self, num: PageNumber) -> Option<&Page> {
        self.frames.page(num)
    }

    fn page_by_index(&self, index: u64) -> Option<&Page> {
        let idx = u32::try_from(index).ok().filter(|&i| i < self.frames.len())?;
        Some(self.frames.get(idx))
    }

    fn page_index(&self, num: PageNumber) -> Option<u64> {
        self.frames.index_of(num).map(u64::from)
    }

    fn next_page(&self, num: PageNumber) -> Option<PageNumber> {
        let idx = self.frames.index_of(num)?;
        (idx + 1 < self.frames.len()).then(|| num.offset(1))
    }

    fn next_compound_page(&self, num: PageNumber) -> Option<PageNumber> {
        let page = self.frames.page(num)?;
        if !page.is_used() || page.next == page.head {
            return None;
        }
        Some(self.frames.number_of(page.next))
    }

    fn total_pages(&self) -> u64 {
        u64::from(self.frames.len())
    }

    fn free_pages(&self) -> u64 {
        self.free_pages
    }

    fn requests(&self) -> u64 {
        self.requests
    }

    fn releases(&self) -> u64 {
        self.releases
    }

    fn max_pages_per_allocation(&self) -> u64 {
        self.total_pages()
    }

    fn region(&self) -> MemoryRegion {
        self.frames.region()
    }

    fn address_space_kind(&self) -> AddressSpaceKind {
        self.kind
    }

    fn debug_name(&self) -> &'static str {
        self.name
    }

    fn set_trace_options(&mut self, options: PageFrameAllocatorTraceOptions) {
        self.trace = options;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PageFrameAllocatorExt;
    use kernel_memory_addresses::PAGE_SIZE;

    const BASE: u64 = 0x10_0000;

    fn storage(n: usize) -> Vec<Page> {
        vec![Page::default(); n]
    }

    fn allocator(storage: &mut [Page], pages: u64, kind: AddressSpaceKind) -> InitialAllocator<'_> {
        InitialAllocator::new(MemoryRegion::new(BASE, pages * PAGE_SIZE), storage, kind, "test").unwrap()
    }

    fn chain(a: &InitialAllocator<'_>, head: PageNumber) -> Vec<u64> {
        let mut out = vec![head.as_u64()];
        let mut cur = head;
        while let Some(next) = a.next_compound_page(cur) {
            out.push(next.as_u64());
            cur = next;
        }
        out
    }

    #[test]
    fn allocate_and_free_round_trip() {
        let mut s = storage(16);
        let mut a = allocator(&mut s, 16, AddressSpaceKind::Physical);
        let head = a.allocate_pages(3, AllocatePageOptions::new().with_debug_name("t")).unwrap();
        assert_eq!(a.free_pages(), 13);
        assert_eq!(chain(&a, head).len(), 3);
        assert_eq!(a.page(head).unwrap().pages_used(), 3);
        assert_eq!(a.page(head).unwrap().debug_tag(), Some("t"));

        a.free(head);
        assert_eq!(a.free_pages(), 16);
        assert!(a.frames.iter().all(Page::is_free));
        assert_eq!(a.frames.list_len(a.free_list), 16);
        assert_eq!((a.requests(), a.releases()), (1, 1));
    }

    #[test]
    fn zero_pages_is_rejected_without_abort() {
        let mut s = storage(4);
        let mut a = allocator(&mut s, 4, AddressSpaceKind::Physical);
        assert_eq!(a.allocate_pages(0, AllocatePageOptions::new()), None);
        assert_eq!(a.free_pages(), 4);
    }

    #[test]
    fn virtual_requests_are_consecutive_after_fragmentation() {
        let mut s = storage(16);
        let mut a = allocator(&mut s, 16, AddressSpaceKind::Virtual);
        let singles: Vec<_> = (0..8)
            .map(|_| a.allocate_page(AllocatePageOptions::new()).unwrap())
            .collect();
        // Free every other page: the free list now interleaves holes with the tail run.
        for n in singles.iter().step_by(2) {
            a.free(*n);
        }
        let head = a.allocate_pages(4, AllocatePageOptions::new()).unwrap();
        let pages = chain(&a, head);
        assert_eq!(pages.len(), 4);
        assert!(pages.windows(2).all(|w| w[1] == w[0] + 1), "{pages:X?}");
    }

    #[test]
    fn continuous_option_on_physical_allocator() {
        let mut s = storage(8);
        let mut a = allocator(&mut s, 8, AddressSpaceKind::Physical);
        let x = a.allocate_page(AllocatePageOptions::new()).unwrap();
        let _y = a.allocate_page(AllocatePageOptions::new()).unwrap();
        a.free(x);
        // Free list: 2..8 followed by 0.
        let head = a
            .allocate_pages(5, AllocatePageOptions::new().with_continuous(true))
            .unwrap();
        let pages = chain(&a, head);
        assert!(pages.windows(2).all(|w| w[1] == w[0] + 1), "{pages:X?}");
    }

    #[test]
    fn rebuild_finds_run_split_across_list_order() {
        let mut s = storage(8);
        let mut a = allocator(&mut s, 8, AddressSpaceKind::Virtual);
        let all: Vec<_> = (0..8)
            .map(|_| a.allocate_page(AllocatePageOptions::new()).unwrap())
            .collect();
        // Release in an order that leaves 4,5 and 6,7 apart on the list.
        for i in [6, 0, 4, 2, 7, 5] {
            a.free(all[i]);
        }
        let head = a.allocate_pages(4, AllocatePageOptions::new()).unwrap();
        assert_eq!(chain(&a, head), vec![0x104, 0x105, 0x106, 0x107]);
    }

    #[test]
    fn reserved_pages_are_never_handed_out() {
        let mut s = storage(4);
        let mut a = InitialAllocator::with_status(
            MemoryRegion::new(0, 4 * PAGE_SIZE),
            &mut s,
            AddressSpaceKind::Physical,
            "phys",
            |addr| {
                if addr.as_u64() < PAGE_SIZE {
                    PageStatus::Reserved
                } else {
                    PageStatus::Free
                }
            },
        )
        .unwrap();
        assert_eq!(a.free_pages(), 3);
        let head = a.allocate_pages(3, AllocatePageOptions::new()).unwrap();
        assert!(!chain(&a, head).contains(&0));
    }

    #[test]
    fn region_helpers() {
        let mut s = storage(8);
        let mut a = allocator(&mut s, 8, AddressSpaceKind::Virtual);
        let r = a.allocate_region(4097, AllocatePageOptions::new());
        assert_eq!(r.size(), 2 * PAGE_SIZE);
        assert_eq!(a.free_pages(), 6);
        a.free_addr(r.start());
        assert_eq!(a.free_pages(), 8);
        assert!(a.allocate_region(0, AllocatePageOptions::new()).is_empty());
    }

    #[test]
    #[should_panic(expected = "out of memory")]
    fn exhaustion_is_fatal() {
        let mut s = storage(4);
        let mut a = allocator(&mut s, 4, AddressSpaceKind::Physical);
        a.allocate_pages(5, AllocatePageOptions::new());
    }

    #[test]
    #[should_panic(expected = "no consecutive")]
    fn fragmentation_is_fatal_for_virtual_runs() {
        let mut s = storage(4);
        let mut a = allocator(&mut s, 4, AddressSpaceKind::Virtual);
        let all: Vec<_> = (0..4)
            .map(|_| a.allocate_page(AllocatePageOptions::new()).unwrap())
            .collect();
        a.free(all[0]);
        a.free(all[2]);
        a.allocate_pages(2, AllocatePageOptions::new());
    }

    #[test]
    #[should_panic(expected = "double free")]
    fn double_free_is_fatal() {
        let mut s = storage(4);
        let mut a = allocator(&mut s, 4, AddressSpaceKind::Physical);
        let head = a.allocate_page(AllocatePageOptions::new()).unwrap();
        a.free(head);
        a.free(head);
    }
}
