//! Simulated physical memory.

use crate::PhysMapper;
use alloc::boxed::Box;
use alloc::collections::BTreeMap;
use core::cell::UnsafeCell;
use kernel_memory_addresses::PhysicalAddress;

#[repr(C, align(4096))]
struct Frame([u8; 4096]);

/// Sparse physical memory: 4 KiB frames are allocated zeroed on first touch.
///
/// Frames are boxed, so references handed out stay valid while the map grows.
/// Not `Sync`; one instance belongs to one test.
#[derive(Default)]
pub struct SimulatedPhys {
    frames: UnsafeCell<BTreeMap<u64, Box<Frame>>>,
}

impl SimulatedPhys {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of frames touched so far.
    #[must_use]
    pub fn touched_frames(&self) -> usize {
        // SAFETY: no reference into the map itself escapes.
        unsafe { (*self.frames.get()).len() }
    }

    fn frame_ptr(&self, frame_number: u64) -> *mut u8 {
        // SAFETY: single-threaded; the map only hands out boxed frame pointers.
        let frames = unsafe { &mut *self.frames.get() };
        let frame = frames
            .entry(frame_number)
            .or_insert_with(|| Box::new(Frame([0; 4096])));
        frame.0.as_mut_ptr()
    }
}

impl PhysMapper for SimulatedPhys {
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T {
        let offset = pa.as_u64() & 0xFFF;
        debug_assert!(
            offset as usize + size_of::<T>() <= 4096,
            "access crosses a frame boundary"
        );
        let base = self.frame_ptr(pa.as_u64() >> 12);
        // SAFETY: stays inside one boxed, 4 KiB aligned frame.
        unsafe { &mut *base.add(offset as usize).cast::<T>() }
    }
}
