//! # Bitmap Allocator
//!
//! The simplest variant: the page status is the in-use bit and every request
//! scans the page array first-fit. Scattered allocations link their pages
//! through `next`, ending in [`NONE`]. Consecutive allocations search for a
//! run of free pages instead.

use crate::allocator::{PageFrameAllocator, out_of_memory, reject_empty_request};
use crate::frames::PageFrames;
use crate::options::{AllocatePageOptions, PageFrameAllocatorTraceOptions};
use crate::page::{NONE, Page, PageNumber, PageStatus};
use crate::{SetupError, fatal};
use kernel_memory_addresses::{AddressSpaceKind, MemoryAddress, MemoryRegion};
use log::{debug, trace};

pub struct BitmapAllocator<'a> {
    frames: PageFrames<'a>,
    free_pages: u64,
    requests: u64,
    releases: u64,
    kind: AddressSpaceKind,
    name: &'static str,
    trace: PageFrameAllocatorTraceOptions,
}

impl<'a> BitmapAllocator<'a> {
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
        let free_pages = frames.count_free();
        debug!(target: "alloc::bitmap", "[{name}] {region}: {} pages, {free_pages} free", frames.len());
        Ok(Self {
            frames,
            free_pages,
            requests: 0,
            releases: 0,
            kind,
            name,
            trace: PageFrameAllocatorTraceOptions::DISABLED,
        })
    }

    /// First index of `pages` consecutive free pages.
    fn find_run(&self, pages: u64) -> Option<u32> {
        let mut start = 0;
        let mut len = 0;
        for idx in 0..self.frames.len() {
            if self.frames.get(idx).is_free() {
                if len == 0 {
                    start = idx;
                }
                len += 1;
                if len == pages {
                    return Some(start);
                }
            } else {
                len = 0;
            }
        }
        None
    }

    fn take(&mut self, idx: u32, head: u32, prev: u32, tag: Option<&'static str>) {
        let page = self.frames.get_mut(idx);
        page.take(head, tag);
        page.next = NONE;
        page.prev = prev;
        if prev != NONE {
            self.frames.get_mut(prev).next = idx;
        }
    }
}

impl PageFrameAllocator for BitmapAllocator<'_> {
    fn allocate_pages(&mut self, pages: u64, options: AllocatePageOptions) -> Option<PageNumber> {
        if pages == 0 {
            return reject_empty_request(self.name);
        }
        if pages > self.free_pages {
            out_of_memory(self.name, pages, self.free_pages);
        }

        let tag = options.debug_name;
        let head = if pages > 1 && (options.continuous || self.kind == AddressSpaceKind::Virtual) {
            let Some(start) = self.find_run(pages) else {
                fatal!(
                    "[{}] out of memory: no consecutive run of {pages} pages, {} free",
                    self.name,
                    self.free_pages
                );
            };
            let mut prev = NONE;
            for idx in start..start + u32::try_from(pages).unwrap_or(u32::MAX) {
                self.take(idx, start, prev, tag);
                prev = idx;
            }
            start
        } else {
            let mut head = NONE;
            let mut prev = NONE;
            let mut taken = 0;
            for idx in 0..self.frames.len() {
                if taken == pages {
                    break;
                }
                if !self.frames.get(idx).is_free() {
                    continue;
                }
                if head == NONE {
                    head = idx;
                }
                self.take(idx, head, prev, tag);
                prev = idx;
                taken += 1;
            }
            head
        };

        self.frames
            .get_mut(head)
            .set_pages_used(u32::try_from(pages).unwrap_or(u32::MAX));
        self.free_pages -= pages;
        self.requests += 1;
        let num = self.frames.number_of(head);
        if self.trace.traces(pages) {
            trace!(target: "alloc::bitmap", "[{}] allocated {pages} pages at {num}", self.name);
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
        while cur != NONE && count < expected {
            let p = self.frames.get_mut(cur);
            let next = p.next;
            p.release();
            p.next = NONE;
            p.prev = NONE;
            count += 1;
            cur = next;
        }
        if count != expected || cur != NONE {
            fatal!(
                "[{}] allocation at {head} released {count} pages, {expected} recorded",
                self.name
            );
        }
        self.free_pages += count;
        self.releases += 1;
        if self.trace.traces(count) {
            trace!(target: "alloc::bitmap", "[{}] freed {count} pages at {head}", self.name);
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
        (page.is_used() && page.next != NONE).then(|| self.frames.number_of(page.next))
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
    use kernel_memory_addresses::PAGE_SIZE;

    fn bitmap(storage: &mut [Page], kind: AddressSpaceKind) -> BitmapAllocator<'_> {
        BitmapAllocator::new(MemoryRegion::new(0, 8 * PAGE_SIZE), storage, kind, "bitmap").unwrap()
    }

    fn chain(a: &BitmapAllocator<'_>, head: PageNumber) -> Vec<u64> {
        let mut out = vec![head.as_u64()];
        let mut cur = head;
        while let Some(n) = a.next_compound_page(cur) {
            out.push(n.as_u64());
            cur = n;
        }
        out
    }

    #[test]
    fn scattered_allocation_fills_holes_first_fit() {
        let mut s = vec![Page::default(); 8];
        let mut a = bitmap(&mut s, AddressSpaceKind::Physical);
        let h: Vec<_> = (0..4).map(|_| a.allocate_page(AllocatePageOptions::new()).unwrap()).collect();
        a.free(h[1]);
        a.free(h[3]);
        let head = a.allocate_pages(3, AllocatePageOptions::new()).unwrap();
        assert_eq!(chain(&a, head), vec![1, 3, 4]);
        assert_eq!(a.free_pages(), 3);
        a.free(head);
        assert_eq!(a.free_pages(), 6);
    }

    #[test]
    fn traced_free_is_logged() {
        use kernel_log::{KernelLogger, LogSink};
        use log::LevelFilter;
        use std::sync::Mutex;

        struct Capture(Mutex<String>);

        impl LogSink for Capture {
            fn write_bytes(&self, bytes: &[u8]) {
                self.0.lock().unwrap().push_str(&String::from_utf8_lossy(bytes));
            }
        }

        static LOGGER: KernelLogger<Capture> = KernelLogger::new(Capture(Mutex::new(String::new())), LevelFilter::Off)
            .with_target_level("alloc::bitmap", LevelFilter::Trace);
        LOGGER.install().unwrap();

        let mut s = vec![Page::default(); 8];
        let storage = &mut s[..];
        let mut a = BitmapAllocator::new(MemoryRegion::new(0, 8 * PAGE_SIZE), storage, AddressSpaceKind::Physical, "traced")
            .unwrap();
        a.set_trace_options(PageFrameAllocatorTraceOptions::DISABLED.with_enabled(true).with_min_pages(2));
        let small = a.allocate_page(AllocatePageOptions::new()).unwrap();
        let head = a.allocate_pages(3, AllocatePageOptions::new()).unwrap();
        a.free(small);
        a.free(head);

        let text = LOGGER.sink().0.lock().unwrap().clone();
        assert!(text.contains(&format!("[traced] freed 3 pages at {head}")), "{text}");
        assert!(!text.contains(&format!("[traced] freed 1 pages at {small}")), "{text}");
    }

    #[test]
    fn virtual_allocation_is_a_run() {
        let mut s = vec![Page::default(); 8];
        let mut a = bitmap(&mut s, AddressSpaceKind::Virtual);
        let one = a.allocate_page(AllocatePageOptions::new()).unwrap();
        let _two = a.allocate_page(AllocatePageOptions::new()).unwrap();
        a.free(one);
        let head = a.allocate_pages(3, AllocatePageOptions::new()).unwrap();
        assert_eq!(chain(&a, head), vec![2, 3, 4]);
        assert_eq!(a.page(head).unwrap().pages_used(), 3);
    }

    #[test]
    #[should_panic(expected = "no consecutive run")]
    fn missing_run_is_fatal() {
        let mut s = vec![Page::default(); 8];
        let mut a = bitmap(&mut s, AddressSpaceKind::Physical);
        let h: Vec<_> = (0..8).map(|_| a.allocate_page(AllocatePageOptions::new()).unwrap()).collect();
        for n in h.iter().step_by(2) {
            a.free(*n);
        }
        a.allocate_pages(2, AllocatePageOptions::new().with_continuous(true));
    }

    #[test]
    #[should_panic(expected = "double free")]
    fn double_free_is_fatal() {
        let mut s = vec![Page::default(); 8];
        let mut a = bitmap(&mut s, AddressSpaceKind::Physical);
        let h = a.allocate_pages(2, AllocatePageOptions::new()).unwrap();
        a.free(h);
        a.free(h);
    }
}
