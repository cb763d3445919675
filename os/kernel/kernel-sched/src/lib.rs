//! # Kernel Thread Scheduler
//!
//! Preemptive round-robin scheduling of kernel and user threads on a single
//! CPU, driven by the clock interrupt.
//!
//! ```text
//!   clock interrupt ──▶ Scheduler::clock_interrupt(frame)
//!                         │ save frame of the current thread
//!                         │ pick the next schedulable slot
//!                         ▼
//!                       Scheduler::switch_to_thread(id)
//!                         │ EOI, TSS.ESP0, IF in the saved EFLAGS
//!                         ▼
//!                       Platform::interrupt_return(frame, ds, cr3)
//! ```
//!
//! The scheduler owns the memory its threads live in through
//! [`ThreadMemory`] (implemented by `kernel_alloc::VirtualPageManager`) and
//! talks to the hardware only through [`Platform`]. Both are traits so the
//! whole state machine runs on the host against simulated page tables and a
//! recording platform.
//!
//! Threads reference their [`Process`] through an [`Arc`](alloc::sync::Arc);
//! a process lists its threads by [`ThreadId`].

#![cfg_attr(not(any(test, doctest)), no_std)]

extern crate alloc;

mod error;
pub mod frame;
mod memory;
mod options;
pub mod platform;
mod process;
mod scheduler;
pub mod selectors;
mod thread;

pub use error::SchedulerError;
pub use frame::{InterruptFrame, TaskFrame};
pub use memory::ThreadMemory;
pub use options::{SchedulerConfig, ThreadStartOptions};
pub use platform::Platform;
pub use process::Process;
pub use scheduler::{STACK_MARKER, STACK_MARKER_ABOVE, Scheduler};
pub use thread::{Thread, ThreadId, ThreadStatus};
