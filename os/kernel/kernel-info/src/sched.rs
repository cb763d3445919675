//! # Scheduling Constants

/// Number of slots in the thread table. Slot 0 is the idle thread.
pub const THREAD_CAPACITY: usize = 256;

/// Stack size of a thread when the start options do not say otherwise.
pub const DEFAULT_STACK_SIZE: u64 = 0x4000;

/// Size of the per-thread kernel stack used on ring transitions.
pub const KERNEL_STACK_SIZE: u64 = 4 * 4096;

/// Bytes left untouched between the stack end and the first frame.
pub const STACK_DEBUG_PADDING: u64 = 8;

/// Whether user threads may use port I/O unless configured otherwise.
pub const ALLOW_USER_IO: bool = true;

const _: () = {
    assert!(THREAD_CAPACITY >= 2);
    assert!(KERNEL_STACK_SIZE.is_multiple_of(4096));
    assert!(DEFAULT_STACK_SIZE.is_multiple_of(4096));
};
