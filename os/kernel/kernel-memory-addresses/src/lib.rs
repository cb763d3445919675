//! # Virtual and Physical Memory Address Types
//!
//! Strongly typed wrappers for raw memory addresses, page sizes and address
//! ranges used by the page-frame allocators and the page-table code.
//!
//! ## Overview
//!
//! | Type | Description |
//! |------|-------------|
//! | [`MemoryAddress`] | A raw address, either physical or virtual. |
//! | [`VirtualAddress`] | A page-table translated address. |
//! | [`PhysicalAddress`] | A physical RAM or MMIO address. |
//! | [`MemoryRegion`] | A `(start, size)` range of either kind. |
//! | [`AddressSpaceKind`] | Which address spaces a region is valid in. |
//!
//! All address types are `#[repr(transparent)]` wrappers around `u64` so they
//! cost nothing at runtime, yet a physical frame cannot be passed where a
//! virtual page is expected.
//!
//! ## Page Sizes
//!
//! The 32-bit two-level paging model knows two page sizes, exposed as marker
//! types implementing [`PageSize`]:
//!
//! - [`Size4K`]: 4 KiB pages, the allocation granularity of every allocator
//! - [`Size4M`]: 4 MiB pages, the span of one page table
//!
//! ## Typical Usage
//!
//! ```rust
//! # use kernel_memory_addresses::*;
//! let va = VirtualAddress::new(0x4000_1234);
//! assert_eq!(va.align_down::<Size4K>().as_u64(), 0x4000_1000);
//! assert_eq!(va.page_number::<Size4K>(), 0x40001);
//!
//! let region = MemoryRegion::new(0x4000_0000, 32 * 1024 * 1024);
//! assert!(region.contains(va));
//! assert_eq!(region.pages(), 8192);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(clippy::inline_always)]

mod address_space_kind;
mod memory_address;
mod memory_region;
mod page_math;
mod page_size;
mod physical_address;
mod virtual_address;

pub use address_space_kind::AddressSpaceKind;
pub use memory_address::MemoryAddress;
pub use memory_region::MemoryRegion;
pub use page_math::{ceil_to_power_of_two, div_ceil, floor_to_power_of_two, log2_of_power_of_two, pages_for};
pub use page_size::{PageSize, Size4K, Size4M};
pub use physical_address::PhysicalAddress;
pub use virtual_address::VirtualAddress;

/// Size of a single page frame in bytes.
pub const PAGE_SIZE: u64 = Size4K::SIZE;
