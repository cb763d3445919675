//! # Kernel Context
//!
//! One explicitly constructed value instead of process-wide singletons:
//!
//! ```text
//!   BootInfo ─▶ KernelMemoryMapManager ─▶ PhysicalPageManager
//!                                              │ owned by
//!                                              ▼
//!                         Scheduler ◀── VirtualPageManager
//!                                  owned by
//! ```
//!
//! [`Kernel::boot`] runs the chain once. Nothing is torn down; the context
//! lives as long as the kernel.

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod config;
mod error;
mod kernel;

pub use config::KernelConfig;
pub use error::KernelError;
pub use kernel::{Kernel, KernelMemory, KernelStorage, StoragePages};
