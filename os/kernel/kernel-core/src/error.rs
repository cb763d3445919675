use kernel_alloc::SetupError;
use kernel_mmap::MemoryMapError;
use kernel_sched::SchedulerError;
use kernel_vmem::MapError;

/// Why the kernel context could not be brought up.
#[derive(Debug, thiserror::Error)]
pub enum KernelError {
    #[error("boot memory map has no page table region")]
    NoPageTableRegion,
    #[error("memory map: {0}")]
    MemoryMap(#[from] MemoryMapError),
    #[error("page table: {0}")]
    Map(#[from] MapError),
    #[error("page managers: {0}")]
    Setup(#[from] SetupError),
    #[error("scheduler: {0}")]
    Scheduler(#[from] SchedulerError),
}
