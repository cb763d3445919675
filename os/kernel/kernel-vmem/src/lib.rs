//! # Virtual Memory Support
//!
//! 32-bit x86 paging for the page managers.
//!
//! ## i386 Virtual Address → Physical Address Walk
//!
//! Without PAE each 32-bit virtual address is split into three fields:
//!
//! ```text
//! | 31‒22 | 21‒12 | 11‒0   |
//! |  PD   |  PT   | Offset |
//! ```
//!
//! ```text
//!  CR3 → PD  →  PT  →  Physical Page
//!        │      │
//!        │      └───► PTE (Page Table Entry)     → maps 4 KiB page
//!        └──────────► PDE (Page Directory Entry) → points to a PT
//! ```
//!
//! Both levels hold 1024 entries of 4 bytes, so one table is exactly one
//! 4 KiB frame and one page directory covers the full 4 GiB.
//!
//! ## Layout used here
//!
//! [`TwoLevelPageTable`] expects its directory frame and all 1024 page table
//! frames to be reserved up front (4 KiB + 4 MiB, physically contiguous).
//! Directory entry `i` always links to table frame `i`, so mapping never
//! needs to allocate. Tables are linked and zeroed the first time a mapping
//! lands in their 4 MiB slice.
//!
//! ## Seams
//!
//! - [`PageTable`]: what the page managers need from paging (map, unmap,
//!   translate, flush, protection).
//! - [`PhysMapper`]: turns a physical frame into a usable reference. The
//!   kernel uses the identity window; tests use [`sim::SimulatedPhys`].

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

#[cfg(any(test, feature = "sim"))]
extern crate alloc;

mod entry;
mod error;
mod page_directory;
mod page_table;
mod phys;
#[cfg(any(test, feature = "sim"))]
pub mod sim;
mod table;

pub use entry::PageEntryBits;
pub use error::MapError;
pub use page_directory::TwoLevelPageTable;
pub use page_table::PageTable;
pub use phys::PhysMapper;
pub use table::{ENTRIES_PER_TABLE, EntryTable, TableIndex};

/// Bytes covered by one page directory entry.
pub const DIRECTORY_ENTRY_SPAN: u64 = 4 * 1024 * 1024;

/// Physical memory to reserve for a [`TwoLevelPageTable`]: the directory plus
/// every page table.
pub const PAGE_TABLE_FOOTPRINT: u64 = 4096 * (1 + ENTRIES_PER_TABLE as u64);
