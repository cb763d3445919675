use kernel_alloc::{PhysicalPageManagerConfig, VirtualPageManagerConfig};
use kernel_info::memory::MemoryLayout;
use kernel_sched::SchedulerConfig;
use log::LevelFilter;
use utils_accessors_derive::Setters;

/// Everything [`Kernel::boot`](crate::Kernel::boot) can be told.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Setters)]
pub struct KernelConfig {
    pub layout: MemoryLayout,
    pub physical: PhysicalPageManagerConfig,
    pub virtual_memory: VirtualPageManagerConfig,
    pub scheduler: SchedulerConfig,
    /// Installs the debug port logger at this level before anything else.
    #[setters(strip_option)]
    pub log_level: Option<LevelFilter>,
    /// Replace the panicking abort hook with one that halts the CPU.
    pub halt_on_fatal: bool,
}

impl KernelConfig {
    pub const DEFAULT: Self = Self {
        layout: MemoryLayout::DEFAULT,
        physical: PhysicalPageManagerConfig::DEFAULT,
        virtual_memory: VirtualPageManagerConfig::DEFAULT,
        scheduler: SchedulerConfig::DEFAULT,
        log_level: Some(LevelFilter::Info),
        halt_on_fatal: cfg!(target_os = "none"),
    };
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hosted_default_keeps_the_panicking_hook() {
        let c = KernelConfig::default();
        assert!(!c.halt_on_fatal);
        assert_eq!(c.log_level, Some(LevelFilter::Info));
        assert!(c.physical.self_test);
    }

    #[test]
    fn setters_chain() {
        let c = KernelConfig::DEFAULT
            .with_log_level(LevelFilter::Trace)
            .with_scheduler(SchedulerConfig::DEFAULT.with_allow_user_io(false));
        assert_eq!(c.log_level, Some(LevelFilter::Trace));
        assert!(!c.scheduler.allow_user_io);
    }
}
