use kernel_memory_addresses::PhysicalAddress;

/// Converts physical addresses into references in the current address space.
///
/// In the kernel this is the identity window; in tests it is
/// [`crate::sim::SimulatedPhys`].
pub trait PhysMapper {
    /// # Safety
    /// - `pa` must be mapped writable for the whole of `T`.
    /// - `T` must match the bytes at `pa` and must not alias a live reference.
    unsafe fn phys_to_mut<'a, T>(&self, pa: PhysicalAddress) -> &'a mut T;

    /// Reads a `u32` at `pa`.
    fn read_u32(&self, pa: PhysicalAddress) -> u32 {
        // SAFETY: short-lived copy out of a mapped frame.
        unsafe { *self.phys_to_mut::<u32>(pa) }
    }

    /// Writes a `u32` at `pa`.
    fn write_u32(&self, pa: PhysicalAddress, value: u32) {
        // SAFETY: short-lived store into a mapped frame.
        unsafe { *self.phys_to_mut::<u32>(pa) = value }
    }

    /// Fills the frame at `pa` with `value`.
    fn fill_frame_u32(&self, pa: PhysicalAddress, value: u32) {
        // SAFETY: one whole 4 KiB frame, reinterpreted as words.
        let words = unsafe { self.phys_to_mut::<[u32; 1024]>(pa) };
        words.fill(value);
    }
}
