//! # Kernel Logging
//!
//! A [`log`] backend for the memory and scheduling core. Every record is
//! rendered as
//!
//! ```text
//! [LEVEL] target: message
//! ```
//!
//! and pushed byte by byte into a [`LogSink`]. The kernel uses
//! [`DebugPortSink`], which writes to the emulator debug port; tests and
//! hosted tools plug in their own sink.
//!
//! Formatting never allocates: records go through [`core::fmt::Write`]
//! straight into the sink.
//!
//! ## Early output
//!
//! [`debug_trace!`] bypasses the logger entirely and can be used before
//! [`init_debug_port`] ran, e.g. when the memory map is not set up yet.

#![cfg_attr(not(any(test, doctest)), no_std)]
#![allow(unsafe_code)]

mod logger;
mod sink;

pub use logger::{KernelLogger, init_debug_port};
pub use sink::{DebugPortSink, LogSink, SinkWriter};

#[doc(hidden)]
pub fn debug_write(args: core::fmt::Arguments) {
    // Best effort; there is nowhere to report a failed debug write.
    let _ = core::fmt::write(&mut SinkWriter(&DebugPortSink), args);
}

/// Formats straight to the debug port, without going through [`log`].
#[macro_export]
macro_rules! debug_trace {
    ($($arg:tt)*) => {{
        $crate::debug_write(core::format_args!($($arg)*));
    }};
}
