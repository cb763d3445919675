#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum MemoryMapError {
    #[error("memory map array full (capacity {capacity})")]
    Full { capacity: usize },
    #[error("no free page found after any reserved boot map entry")]
    NoInitialPage,
    #[error("no gap of {size:#X} bytes after any used entry")]
    NoGap { size: u64 },
}
