//! # Kernel Configuration and Boot Interface
//!
//! Compile-time layout constants, scheduling limits and the boot handoff
//! types shared by the memory map manager, the page managers and the
//! scheduler.
//!
//! ## Modules
//!
//! ### Boot Information ([`boot`])
//! * **Installed memory**: total bytes of physical RAM
//! * **Memory map**: typed `(start, size, kind, address space)` entries
//!
//! ### Memory Layout ([`memory`])
//! * **Pool placement**: identity, normal and global virtual pools
//! * **Allocator tuning**: buddy order limit, multi allocator threshold
//! * **Kernel memory map**: size and array capacities
//!
//! ### Scheduling ([`sched`])
//! * **Thread table**: capacity and stack sizes
//!
//! ## Address Space Layout
//!
//! ```text
//! Virtual Address Space Layout (32-bit):
//!
//! 0x0000_0000 ┌─────────────────────────────────┐
//!             │   Kernel image, boot structures │
//!             │   Physical page frame pool      │
//! 0x0C00_0000 ├─────────────────────────────────┤ IDENTITY_MAP_START
//!             │   Identity pool (VA == PA)      │ 60 MiB
//! 0x0FC0_0000 ├─────────────────────────────────┤
//!             │              ...                │
//! 0x2580_0000 ├─────────────────────────────────┤ GLOBAL_POOL_START
//!             │   Global pool                   │ 100 MiB
//! 0x2BC0_0000 ├─────────────────────────────────┤
//!             │              ...                │
//! 0x4000_0000 ├─────────────────────────────────┤ VIRT_MAP_START
//!             │   Normal pool, free-list stage  │ 32 MiB
//! 0x4200_0000 ├─────────────────────────────────┤
//!             │   Normal pool, buddy stage      │ 32 MiB
//! 0x4400_0000 └─────────────────────────────────┘
//! ```
//!
//! Every region is checked for alignment and overlap at compile time.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

pub mod boot;
pub mod memory;
pub mod sched;
