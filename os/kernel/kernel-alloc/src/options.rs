//! Allocation request options and trace settings.

use utils_accessors_derive::Setters;

/// The virtual pool a request is served from.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum PageAllocationPool {
    /// General kernel virtual memory.
    #[default]
    Normal,
    /// Virtual address equals the physical address.
    Identity,
    /// Valid in every address space.
    Global,
}

/// Options of a single page allocation.
///
/// ```
/// # use kernel_alloc::{AllocatePageOptions, PageAllocationPool};
/// let opts = AllocatePageOptions::new()
///     .with_pool(PageAllocationPool::Identity)
///     .with_continuous(true)
///     .with_debug_name("ThreadStack");
/// assert_eq!(opts.debug_name, Some("ThreadStack"));
/// ```
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Setters)]
pub struct AllocatePageOptions {
    pub pool: PageAllocationPool,
    /// Demand consecutive frames even where the allocator may scatter.
    pub continuous: bool,
    /// Attached to the allocated pages for diagnostics.
    #[setters(strip_option)]
    pub debug_name: Option<&'static str>,
}

impl AllocatePageOptions {
    pub const DEFAULT: Self = Self::new();

    #[must_use]
    pub const fn new() -> Self {
        Self {
            pool: PageAllocationPool::Normal,
            continuous: false,
            debug_name: None,
        }
    }
}

/// Verbose logging of large requests. Has no effect on allocation.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Setters)]
pub struct PageFrameAllocatorTraceOptions {
    pub enabled: bool,
    /// Smallest request that is traced.
    pub min_pages: u64,
}

impl PageFrameAllocatorTraceOptions {
    pub const DISABLED: Self = Self {
        enabled: false,
        min_pages: 0,
    };

    #[inline]
    #[must_use]
    pub const fn traces(&self, pages: u64) -> bool {
        self.enabled && pages >= self.min_pages
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_threshold() {
        let t = PageFrameAllocatorTraceOptions::DISABLED
            .with_enabled(true)
            .with_min_pages(4);
        assert!(!t.traces(3));
        assert!(t.traces(4));
        assert!(!PageFrameAllocatorTraceOptions::DISABLED.traces(100));
    }

    #[test]
    fn default_options_use_normal_pool() {
        let o = AllocatePageOptions::default();
        assert_eq!(o, AllocatePageOptions::DEFAULT);
        assert_eq!(o.pool, PageAllocationPool::Normal);
        assert!(!o.continuous);
    }
}
