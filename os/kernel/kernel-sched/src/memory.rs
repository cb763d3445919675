//! Stack and state memory of threads.

use kernel_alloc::{AllocatePageOptions, VirtualPageManager, fatal};
use kernel_memory_addresses::VirtualAddress;
use kernel_sync::InterruptControl;
use kernel_vmem::PageTable;

/// Mapped kernel memory the scheduler builds stacks and frames in.
///
/// Failures are fatal: a thread whose stack cannot be written has no
/// state to fall back to.
pub trait ThreadMemory {
    /// Allocates `pages` mapped pages tagged with `debug_name`.
    fn allocate_pages(&self, pages: u64, debug_name: &'static str) -> VirtualAddress;

    fn free_addr(&self, addr: VirtualAddress);

    fn set_writable(&self, addr: VirtualAddress, size: u64);

    fn read_u32(&self, addr: VirtualAddress) -> u32;

    fn write_u32(&self, addr: VirtualAddress, value: u32);

    /// Writes `words` to consecutive addresses starting at `addr`.
    fn write_words(&self, addr: VirtualAddress, words: &[u32]) {
        for (i, w) in (0u64..).zip(words) {
            self.write_u32(addr + i * 4, *w);
        }
    }

    fn read_words<const N: usize>(&self, addr: VirtualAddress) -> [u32; N]
    where
        Self: Sized,
    {
        let mut out = [0; N];
        for (i, w) in (0u64..).zip(out.iter_mut()) {
            *w = self.read_u32(addr + i * 4);
        }
        out
    }
}

impl<T: PageTable, I: InterruptControl> ThreadMemory for VirtualPageManager<'_, T, I> {
    fn allocate_pages(&self, pages: u64, debug_name: &'static str) -> VirtualAddress {
        let options = AllocatePageOptions::new().with_debug_name(debug_name);
        match Self::allocate_pages(self, pages, options) {
            Some(va) => va,
            None => fatal!("no memory for {debug_name} ({pages} pages)"),
        }
    }

    fn free_addr(&self, addr: VirtualAddress) {
        Self::free_addr(self, addr);
    }

    fn set_writable(&self, addr: VirtualAddress, size: u64) {
        if let Err(e) = Self::set_writable(self, addr, size, true) {
            fatal!("making {addr} writable: {e}");
        }
    }

    fn read_u32(&self, addr: VirtualAddress) -> u32 {
        match Self::read_u32(self, addr) {
            Ok(v) => v,
            Err(e) => fatal!("reading thread memory: {e}"),
        }
    }

    fn write_u32(&self, addr: VirtualAddress, value: u32) {
        if let Err(e) = Self::write_u32(self, addr, value) {
            fatal!("writing thread memory: {e}");
        }
    }
}
