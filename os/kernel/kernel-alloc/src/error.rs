use kernel_memory_addresses::MemoryRegion;
use kernel_mmap::MemoryMapError;
use kernel_vmem::MapError;

/// Why an allocator or page manager could not be constructed.
#[derive(Debug, thiserror::Error)]
pub enum SetupError {
    #[error("page array holds {provided} records, {needed} needed")]
    StorageTooSmall { needed: u64, provided: u64 },
    #[error("region {0:?} is not page aligned")]
    Unaligned(MemoryRegion),
    #[error("region is empty")]
    EmptyRegion,
    #[error("memory map: {0}")]
    MemoryMap(#[from] MemoryMapError),
    #[error("page table: {0}")]
    Map(#[from] MapError),
}
