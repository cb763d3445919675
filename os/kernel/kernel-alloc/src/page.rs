//! # Page Metadata
//!
//! One [`Page`] record per 4 KiB frame. Every allocator owns a contiguous
//! array of them and links records by array index; [`NONE`] marks an absent
//! link. The `next`/`prev` links serve whichever list the owning allocator
//! keeps the page on: the free list, a buddy free area or an allocation chain.

use bitfield_struct::bitfield;
use core::fmt;
use kernel_memory_addresses::{MemoryAddress, PAGE_SIZE, Size4K};

/// Absent array index.
pub(crate) const NONE: u32 = u32::MAX;

/// Global number of a page frame, `address / 4096`.
///
/// Page numbers are the handles the allocators hand out. They stay unique
/// across the sub-allocators of a multi allocator because every allocator
/// covers a disjoint address range.
#[repr(transparent)]
#[derive(Copy, Clone, Default, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct PageNumber(u64);

impl PageNumber {
    #[inline]
    #[must_use]
    pub const fn new(number: u64) -> Self {
        Self(number)
    }

    /// The page containing `addr`.
    #[inline]
    #[must_use]
    pub fn containing(addr: impl Into<MemoryAddress>) -> Self {
        Self(addr.into().page_number::<Size4K>())
    }

    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Base address of the page.
    #[inline]
    #[must_use]
    pub const fn address(self) -> MemoryAddress {
        MemoryAddress::new(self.0 * PAGE_SIZE)
    }

    #[inline]
    #[must_use]
    pub const fn offset(self, pages: u64) -> Self {
        Self(self.0 + pages)
    }
}

impl fmt::Debug for PageNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PageNumber({:#X})", self.0)
    }
}

impl fmt::Display for PageNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[repr(u8)]
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum PageStatus {
    #[default]
    Free = 0,
    Used = 1,
    /// Never handed out: firmware, holes, the identity window.
    Reserved = 2,
}

impl PageStatus {
    /// One-character form used by page dumps.
    #[must_use]
    pub const fn symbol(self) -> u8 {
        match self {
            Self::Free => b'.',
            Self::Used => b'U',
            Self::Reserved => b'R',
        }
    }
}

/// Compound-page markers of the buddy allocator.
#[bitfield(u8)]
#[derive(Eq, PartialEq)]
pub struct PageFlags {
    /// First page of a multi-page block.
    pub head: bool,
    /// Any later page of a multi-page block.
    pub tail: bool,
    /// Free block on a buddy free list; `order` is valid.
    pub buddy: bool,
    #[bits(4)]
    pub order: u8,
    #[bits(1)]
    __: u8,
}

/// Metadata of one page frame.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Page {
    address: u64,
    status: PageStatus,
    flags: PageFlags,
    /// Length of the allocation this page heads, 0 elsewhere.
    pages_used: u32,
    /// Allocation head, or the compound head for buddy tails.
    pub(crate) head: u32,
    pub(crate) next: u32,
    pub(crate) prev: u32,
    debug_tag: Option<&'static str>,
}

impl Page {
    pub(crate) const EMPTY: Self = Self::new(0);

    #[must_use]
    pub(crate) const fn new(address: u64) -> Self {
        Self {
            address,
            status: PageStatus::Free,
            flags: PageFlags::new(),
            pages_used: 0,
            head: NONE,
            next: NONE,
            prev: NONE,
            debug_tag: None,
        }
    }

    #[inline]
    #[must_use]
    pub const fn address(&self) -> MemoryAddress {
        MemoryAddress::new(self.address)
    }

    #[inline]
    #[must_use]
    pub const fn number(&self) -> PageNumber {
        PageNumber::new(self.address / PAGE_SIZE)
    }

    #[inline]
    #[must_use]
    pub const fn status(&self) -> PageStatus {
        self.status
    }

    #[inline]
    #[must_use]
    pub const fn is_free(&self) -> bool {
        matches!(self.status, PageStatus::Free)
    }

    #[inline]
    #[must_use]
    pub const fn is_used(&self) -> bool {
        matches!(self.status, PageStatus::Used)
    }

    #[inline]
    #[must_use]
    pub const fn flags(&self) -> PageFlags {
        self.flags
    }

    /// Number of pages in the allocation headed by this page.
    #[inline]
    #[must_use]
    pub const fn pages_used(&self) -> u32 {
        self.pages_used
    }

    #[inline]
    #[must_use]
    pub const fn debug_tag(&self) -> Option<&'static str> {
        self.debug_tag
    }

    pub(crate) const fn set_status(&mut self, status: PageStatus) {
        self.status = status;
    }

    pub(crate) const fn flags_mut(&mut self) -> &mut PageFlags {
        &mut self.flags
    }

    pub(crate) const fn set_pages_used(&mut self, pages: u32) {
        self.pages_used = pages;
    }

    pub(crate) const fn set_debug_tag(&mut self, tag: Option<&'static str>) {
        self.debug_tag = tag;
    }

    /// Marks the page as part of the allocation headed by `head`.
    pub(crate) const fn take(&mut self, head: u32, tag: Option<&'static str>) {
        self.status = PageStatus::Used;
        self.head = head;
        self.debug_tag = tag;
    }

    /// Returns the page to the free state, keeping its list links.
    pub(crate) const fn release(&mut self) {
        self.status = PageStatus::Free;
        self.pages_used = 0;
        self.head = NONE;
        self.debug_tag = None;
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::EMPTY
    }
}
