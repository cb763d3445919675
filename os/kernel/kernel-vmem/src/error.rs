use kernel_memory_addresses::VirtualAddress;

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum MapError {
    #[error("address {0} is not page aligned")]
    Unaligned(u64),
    #[error("{0} is outside the 32-bit page table window")]
    OutOfRange(VirtualAddress),
    #[error("{0} is not mapped")]
    NotMapped(VirtualAddress),
}
