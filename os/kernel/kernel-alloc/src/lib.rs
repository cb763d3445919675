//! # Kernel Page Frame Allocation
//!
//! Page-granular memory management for the kernel: a family of page frame
//! allocators over fixed arrays of [`Page`] records, the physical page
//! manager that owns every installed frame, and the virtual page manager
//! that hands out mapped kernel memory.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │              VirtualPageManager                     │
//! │    • Normal / Identity / Global pools               │
//! │    • maps virtual pages to frames pairwise          │
//! │    • optional guard pages                           │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │              PhysicalPageManager                    │
//! │    • one record per installed frame                 │
//! │    • status seeded from the boot memory map         │
//! └─────────────────┬───────────────────────────────────┘
//!                   │
//! ┌─────────────────▼───────────────────────────────────┐
//! │           PageFrameAllocator variants               │
//! │    • InitialAllocator: free list, chained pages     │
//! │    • BuddyAllocator: power-of-two blocks            │
//! │    • BitmapAllocator: first-fit scan                │
//! │    • MultiAllocator: fast + bulk dispatch           │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! ## Page Records
//!
//! Allocators never allocate their own bookkeeping. Each one is built over a
//! caller-supplied `&mut [Page]` covering its region, one record per 4 KiB
//! page. Records link to each other by index (`u32`, with a sentinel for
//! "none"); a [`PageNumber`] is the global page number `address / 4096` and
//! doubles as the allocation handle.
//!
//! ## Failure Model
//!
//! Requesting zero pages logs a warning and yields `None`. Everything else
//! that goes wrong at runtime (exhaustion, double free, a corrupted chain)
//! is [`fatal!`]: logged at `error` level and passed to the abort hook,
//! which panics unless the kernel installed its own.
//!
//! Construction errors are ordinary [`SetupError`] values.
//!
//! ## Usage
//!
//! ```
//! use kernel_alloc::{AllocatePageOptions, InitialAllocator, Page, PageFrameAllocator, PageFrameAllocatorExt};
//! use kernel_memory_addresses::{AddressSpaceKind, MemoryRegion};
//!
//! let mut storage = vec![Page::default(); 16];
//! let mut alloc = InitialAllocator::new(
//!     MemoryRegion::new(0x10_0000, 16 * 4096),
//!     &mut storage,
//!     AddressSpaceKind::Physical,
//!     "doc",
//! )
//! .unwrap();
//!
//! let head = alloc.allocate_pages(3, AllocatePageOptions::new()).unwrap();
//! assert_eq!(alloc.used_pages(), 3);
//! alloc.free(head);
//! assert_eq!(alloc.free_pages(), 16);
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]

mod allocator;
mod bitmap;
mod buddy;
mod error;
pub mod fatal;
mod frames;
mod initial;
mod multi;
mod options;
mod page;
mod physical;
mod pool;
mod vmm;

pub use allocator::{PageFrameAllocator, PageFrameAllocatorExt};
pub use bitmap::BitmapAllocator;
pub use buddy::BuddyAllocator;
pub use error::SetupError;
pub use initial::InitialAllocator;
pub use multi::MultiAllocator;
pub use options::{AllocatePageOptions, PageAllocationPool, PageFrameAllocatorTraceOptions};
pub use page::{Page, PageFlags, PageNumber, PageStatus};
pub use physical::{PhysicalPageManager, PhysicalPageManagerConfig, SCRATCH_PAGE};
pub use pool::{PoolAllocator, StagedAllocator};
pub use vmm::{VirtualPageManager, VirtualPageManagerConfig, VirtualPoolStorage};
