//! # Binary Buddy Allocator
//!
//! Free memory is kept as blocks of `2^order` pages on one list per order,
//! `order < BUDDY_MAX_ORDER`. The buddy of the block at index `i` with order
//! `o` is the block at `i ^ (1 << o)`; two free buddies of the same order
//! always merge into one block of the next order.
//!
//! Page flags carry the block state:
//!
//! | Flag    | Meaning                                                  |
//! |---------|----------------------------------------------------------|
//! | `buddy` | first page of a free block, `order` is the block's order |
//! | `head`  | first page of an allocated block with `order > 0`        |
//! | `tail`  | any other page of such a block, `head` indexes the first |
//!
//! Requests are rounded up to a power of two and consume the whole block.

use crate::allocator::{PageFrameAllocator, out_of_memory, reject_empty_request};
use crate::frames::PageFrames;
use crate::options::{AllocatePageOptions, PageFrameAllocatorTraceOptions};
use crate::page::{NONE, Page, PageFlags, PageNumber, PageStatus};
use crate::{SetupError, fatal};
use kernel_info::memory::BUDDY_MAX_ORDER;
use kernel_memory_addresses::{AddressSpaceKind, MemoryRegion, ceil_to_power_of_two, log2_of_power_of_two};
use log::{debug, trace};

const MAX_ORDER: usize = BUDDY_MAX_ORDER as usize;

#[derive(Copy, Clone, Debug)]
struct FreeArea {
    head: u32,
    nr_free: u64,
}

impl FreeArea {
    const EMPTY: Self = Self {
        head: NONE,
        nr_free: 0,
    };
}

pub struct BuddyAllocator<'a> {
    frames: PageFrames<'a>,
    free_area: [FreeArea; MAX_ORDER],
    requests: u64,
    releases: u64,
    kind: AddressSpaceKind,
    name: &'static str,
    trace: PageFrameAllocatorTraceOptions,
}

impl<'a> BuddyAllocator<'a> {
    /// Largest block, in pages.
    pub const MAX_BLOCK_PAGES: u64 = 1 << (MAX_ORDER - 1);

    /// An allocator over `region`, whose size is rounded down to a power of two.
    ///
    /// # Errors
    /// See [`SetupError`].
    pub fn new(
        region: MemoryRegion,
        storage: &'a mut [Page],
        kind: AddressSpaceKind,
        name: &'static str,
    ) -> Result<Self, SetupError> {
        let region = region.floor_size_to_power_of_two();
        let frames = PageFrames::new(region, storage)?;
        let mut allocator = Self {
            frames,
            free_area: [FreeArea::EMPTY; MAX_ORDER],
            requests: 0,
            releases: 0,
            kind,
            name,
            trace: PageFrameAllocatorTraceOptions::DISABLED,
        };
        for idx in 0..allocator.frames.len() {
            allocator.release_block(idx, 0);
        }
        debug!(
            target: "alloc::buddy",
            "[{name}] {region}: {} pages in {} top-order blocks",
            allocator.frames.len(),
            allocator.free_area[MAX_ORDER - 1].nr_free
        );
        Ok(allocator)
    }

    /// Number of free blocks of `order`.
    #[must_use]
    pub fn free_blocks(&self, order: u8) -> u64 {
        self.free_area.get(usize::from(order)).map_or(0, |a| a.nr_free)
    }

    fn order_for(pages: u64) -> u8 {
        #[allow(clippy::cast_possible_truncation)]
        let order = log2_of_power_of_two(ceil_to_power_of_two(pages)) as u8;
        order
    }

    /// Puts the block at `idx` onto the free lists, merging with free buddies.
    fn release_block(&mut self, mut idx: u32, mut order: u8) {
        while usize::from(order) < MAX_ORDER - 1 {
            let buddy = idx ^ (1 << order);
            if buddy >= self.frames.len() {
                break;
            }
            let flags = self.frames.get(buddy).flags();
            if !flags.buddy() || flags.order() != order {
                break;
            }
            let area = &mut self.free_area[usize::from(order)];
            self.frames.unlink(&mut area.head, buddy);
            area.nr_free -= 1;
            *self.frames.get_mut(buddy).flags_mut() = PageFlags::new();
            idx &= !(1 << order);
            order += 1;
        }
        self.push_free(idx, order);
    }

    fn push_free(&mut self, idx: u32, order: u8) {
        *self.frames.get_mut(idx).flags_mut() = PageFlags::new().with_buddy(true).with_order(order);
        let area = &mut self.free_area[usize::from(order)];
        self.frames.push_front(&mut area.head, idx);
        area.nr_free += 1;
    }

    fn pop_free(&mut self, order: u8) -> u32 {
        let area = &mut self.free_area[usize::from(order)];
        let idx = area.head;
        self.frames.unlink(&mut area.head, idx);
        area.nr_free -= 1;
        *self.frames.get_mut(idx).flags_mut() = PageFlags::new();
        idx
    }

    /// Smallest order `>= order` with a free block.
    fn find_order(&self, order: u8) -> Option<u8> {
        (order..BUDDY_MAX_ORDER).find(|&o| self.free_area[usize::from(o)].nr_free > 0)
    }
}

impl PageFrameAllocator for BuddyAllocator<'_> {
    fn allocate_pages(&mut self, pages: u64, options: AllocatePageOptions) -> Option<PageNumber> {
        if pages == 0 {
            return reject_empty_request(self.name);
        }
        if pages > Self::MAX_BLOCK_PAGES {
            fatal!(
                "[{}] request of {pages} pages exceeds the largest block of {}",
                self.name,
                Self::MAX_BLOCK_PAGES
            );
        }

        let order = Self::order_for(pages);
        let Some(mut current) = self.find_order(order) else {
            out_of_memory(self.name, pages, self.free_pages());
        };

        let idx = self.pop_free(current);
        while current > order {
            current -= 1;
            self.push_free(idx + (1 << current), current);
        }

        let tag = options.debug_name;
        let size: u32 = 1 << order;
        for i in 0..size {
            let page = self.frames.get_mut(idx + i);
            page.take(idx, tag);
            if order > 0 {
                *page.flags_mut() = if i == 0 {
                    PageFlags::new().with_head(true).with_order(order)
                } else {
                    PageFlags::new().with_tail(true)
                };
            }
        }
        self.frames.get_mut(idx).set_pages_used(size);
        self.requests += 1;

        let num = self.frames.number_of(idx);
        if self.trace.traces(pages) {
            trace!(
                target: "alloc::buddy",
                "[{}] {pages} pages as order {order} at {:08X}, {} free",
                self.name,
                num.address().as_u64(),
                self.free_pages()
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
        if page.flags().tail() || page.head != idx {
            fatal!("[{}] page {head} does not head an allocation", self.name);
        }

        let order = if page.flags().head() { page.flags().order() } else { 0 };
        for i in 0..1_u32 << order {
            let p = self.frames.get_mut(idx + i);
            p.release();
            *p.flags_mut() = PageFlags::new();
        }
        self.release_block(idx, order);
        self.releases += 1;

        if self.trace.traces(1 << order) {
            trace!(target: "alloc::buddy", "[{}] freed order {order} at {head}", self.name);
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
        let idx = self.frames.index_of(num)?;
        let page = self.frames.get(idx);
        if !page.is_used() || idx + 1 >= self.frames.len() {
            return None;
        }
        let next = self.frames.get(idx + 1);
        (next.flags().tail() && next.head == page.head).then(|| num.offset(1))
    }

    fn total_pages(&self) -> u64 {
        u64::from(self.frames.len())
    }

    fn free_pages(&self) -> u64 {
        self.free_area
            .iter()
            .enumerate()
            .map(|(order, area)| area.nr_free << order)
            .sum()
    }

    fn requests(&self) -> u64 {
        self.requests
    }

    fn releases(&self) -> u64 {
        self.releases
    }

    fn max_pages_per_allocation(&self) -> u64 {
        Self::MAX_BLOCK_PAGES
    }

    fn can_allocate(&self, pages: u64, _options: AllocatePageOptions) -> bool {
        pages > 0 && pages <= Self::MAX_BLOCK_PAGES && self.find_order(Self::order_for(pages)).is_some()
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
