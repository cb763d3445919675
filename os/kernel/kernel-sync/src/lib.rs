//! # Kernel synchronization primitives
//!
//! * [`irq`]: interrupt masking ([`Uninterruptible`], [`IrqGuard`]) behind the
//!   [`InterruptControl`] seam
//! * [`SpinMonitor`]: lock that masks interrupts while held, for state the
//!   clock interrupt also touches
//! * [`SyncOnceCell`]: one-time initialization for statics

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

pub mod irq;
mod monitor;
mod sync_once_cell;

pub use irq::{Cpu, InterruptControl, IrqGuard, Uninterruptible};
pub use monitor::{MonitorGuard, SpinMonitor};
pub use sync_once_cell::SyncOnceCell;
