use crate::MapError;
use kernel_memory_addresses::{PhysicalAddress, VirtualAddress};

/// Paging operations the page managers rely on.
///
/// `size` arguments are byte counts and are rounded up to whole pages.
/// A `flush` of `false` leaves TLB maintenance to a later [`PageTable::flush`].
pub trait PageTable {
    /// Maps `size` bytes at `virt` to `phys`.
    ///
    /// # Errors
    /// Unaligned addresses or a `virt` outside the table's window.
    fn map(
        &mut self,
        virt: VirtualAddress,
        phys: PhysicalAddress,
        size: u64,
        present: bool,
        flush: bool,
    ) -> Result<(), MapError>;

    /// Clears the mappings of `size` bytes at `virt`.
    ///
    /// # Errors
    /// Unaligned address or a `virt` outside the table's window.
    fn unmap(&mut self, virt: VirtualAddress, size: u64, flush: bool) -> Result<(), MapError>;

    /// Physical address backing `virt`, if it is mapped.
    fn translate(&self, virt: VirtualAddress) -> Option<PhysicalAddress>;

    /// Invalidates cached translations.
    fn flush(&mut self);

    /// Toggles write access for `size` bytes at `virt`.
    ///
    /// # Errors
    /// [`MapError::NotMapped`] if part of the range has no page table.
    fn set_writable(&mut self, virt: VirtualAddress, size: u64, writable: bool) -> Result<(), MapError>;

    /// Toggles execute access. Non-PAE paging has no execute-disable bit,
    /// so the default accepts and ignores the request.
    ///
    /// # Errors
    /// Implementations with NX support may reject unmapped ranges.
    fn set_executable(&mut self, _virt: VirtualAddress, _size: u64, _executable: bool) -> Result<(), MapError> {
        Ok(())
    }

    fn is_mapped(&self, virt: VirtualAddress) -> bool {
        self.translate(virt).is_some()
    }

    /// Reads a `u32` through the mapping of `virt`.
    ///
    /// # Errors
    /// [`MapError::NotMapped`] if `virt` has no present mapping.
    fn read_u32(&self, virt: VirtualAddress) -> Result<u32, MapError>;

    /// Writes a `u32` through the mapping of `virt`.
    ///
    /// # Errors
    /// [`MapError::NotMapped`] if `virt` has no present mapping.
    fn write_u32(&mut self, virt: VirtualAddress, value: u32) -> Result<(), MapError>;

    /// Fills `size` bytes at the page-aligned `virt` with `value`.
    ///
    /// # Errors
    /// [`MapError::NotMapped`] at the first page without a present mapping.
    fn fill_u32(&mut self, virt: VirtualAddress, size: u64, value: u32) -> Result<(), MapError> {
        for offset in (0..size).step_by(4) {
            self.write_u32(virt + offset, value)?;
        }
        Ok(())
    }
}
