//! # Kernel Memory Map
//!
//! Boot-time bookkeeping of which physical ranges are usable, used, or
//! reserved for the kernel. The [`KernelMemoryMapManager`] is built once from
//! the boot loader's map and afterwards only grows: every page array or
//! other early structure carved out through [`KernelMemoryMapManager::allocate`]
//! is appended to the `Used` list, so later allocators can steer clear of it.
//!
//! ```text
//!   boot map ──► ┌───────────────┐
//!                │ SystemUsable  │  where allocation may happen
//!                ├───────────────┤
//!                │ Used          │  firmware, kernel image, carved regions
//!                ├───────────────┤
//!                │ KernelReserved│  never handed out, may overlap others
//!                └───────────────┘
//! ```

#![cfg_attr(not(any(test, doctest)), no_std)]
#![deny(unsafe_code)]

mod array;
mod error;
mod manager;
mod map;

pub use array::KernelMemoryMapArray;
pub use error::MemoryMapError;
pub use manager::KernelMemoryMapManager;
pub use map::KernelMemoryMap;
