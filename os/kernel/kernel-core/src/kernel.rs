use crate::{KernelConfig, KernelError};
use alloc::sync::Arc;
use core::fmt;
use kernel_alloc::{Page, PhysicalPageManager, VirtualPageManager, VirtualPoolStorage, fatal};
use kernel_info::boot::{BootInfo, BootMemoryType};
use kernel_info::memory::MemoryLayout;
use kernel_memory_addresses::PhysicalAddress;
use kernel_mmap::KernelMemoryMapManager;
use kernel_registers::PageDirectoryBase;
use kernel_sched::{Platform, Process, Scheduler, SchedulerError, ThreadId, ThreadStartOptions};
use kernel_sync::{Cpu, InterruptControl};
use kernel_vmem::{PhysMapper, TwoLevelPageTable};
use log::{debug, info};

const MIB: u64 = 1024 * 1024;

/// Kernel virtual memory on the two-level page table.
pub type KernelMemory<'a, M, I = Cpu> = VirtualPageManager<'a, TwoLevelPageTable<M>, I>;

/// Page record arrays the page managers are built over.
///
/// Their sizes depend on the installed memory and the layout only; see
/// [`KernelStorage::pages`].
pub struct KernelStorage<'a> {
    pub physical: &'a mut [Page],
    pub pools: VirtualPoolStorage<'a>,
}

/// Record counts a [`KernelStorage`] must provide.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct StoragePages {
    pub physical: u64,
    /// Normal initial stage, normal buddy stage, identity, global.
    pub pools: [u64; 4],
}

impl KernelStorage<'_> {
    #[must_use]
    pub fn pages(installed_memory: u64, layout: &MemoryLayout) -> StoragePages {
        StoragePages {
            physical: <PhysicalPageManager>::storage_pages(installed_memory),
            pools: VirtualPoolStorage::pages(layout),
        }
    }
}

/// The kernel's memory and scheduling state, built in dependency order by
/// [`Kernel::boot`] and passed around by reference from then on.
pub struct Kernel<'a, M: PhysMapper, P: Platform, I: InterruptControl = Cpu> {
    memory_map: KernelMemoryMapManager,
    scheduler: Scheduler<KernelMemory<'a, M, I>, P, I>,
    page_directory: PageDirectoryBase,
    idle_process: Arc<Process>,
    system_process: Arc<Process>,
}

impl<'a, M: PhysMapper, P: Platform, I: InterruptControl> Kernel<'a, M, P, I> {
    /// Brings up the memory map, the physical and virtual page managers and
    /// the scheduler, in that order.
    ///
    /// The page directory goes into the boot map's page table region. The
    /// scheduler comes back set up with the idle thread and the kernel main
    /// thread at `followup_entry`, but not started.
    ///
    /// # Errors
    ///
    /// Whatever the first failing stage reports, converted to [`KernelError`].
    pub fn boot(
        boot_info: &BootInfo<'_>,
        mapper: M,
        storage: KernelStorage<'a>,
        platform: P,
        followup_entry: u32,
        config: KernelConfig,
    ) -> Result<Self, KernelError> {
        if let Some(level) = config.log_level
            && kernel_log::init_debug_port(level).is_err()
        {
            debug!(target: "kernel", "logger was installed before");
        }
        if config.halt_on_fatal {
            fatal::set_abort_hook(halt);
        }

        let installed = boot_info.installed_memory;
        info!(target: "kernel", "booting with {} MiB installed", installed / MIB);

        let table_region = boot_info
            .memory_map
            .iter()
            .find(|r| r.kind == BootMemoryType::PageTable)
            .ok_or(KernelError::NoPageTableRegion)?;

        let mut memory_map = KernelMemoryMapManager::setup(boot_info)?;
        memory_map.print();

        let mut table = TwoLevelPageTable::new(mapper, PhysicalAddress::new(table_region.start))?;
        let physical: PhysicalPageManager<'a, I> = PhysicalPageManager::setup(
            &mut memory_map,
            installed,
            &config.layout,
            storage.physical,
            &mut table,
            config.physical,
        )?;
        let memory = VirtualPageManager::setup(
            physical,
            table,
            &config.layout,
            storage.pools,
            config.virtual_memory,
        )?;

        let page_directory = memory.with_table(|t| t.directory_base());
        let idle_process = Arc::new(Process::kernel(0, "idle", page_directory));
        let system_process = Arc::new(Process::kernel(1, "system", page_directory));

        let scheduler = Scheduler::new(memory, platform, config.scheduler);
        scheduler.setup(&idle_process, &system_process, followup_entry)?;

        info!(target: "kernel", "kernel context ready");
        Ok(Self {
            memory_map,
            scheduler,
            page_directory,
            idle_process,
            system_process,
        })
    }

    /// Hands the CPU to the scheduler.
    ///
    /// Does not return on hardware.
    pub fn start(&self) {
        self.scheduler.start();
    }

    #[must_use]
    pub const fn scheduler(&self) -> &Scheduler<KernelMemory<'a, M, I>, P, I> {
        &self.scheduler
    }

    #[must_use]
    pub const fn memory(&self) -> &KernelMemory<'a, M, I> {
        self.scheduler.memory()
    }

    #[must_use]
    pub const fn memory_map(&self) -> &KernelMemoryMapManager {
        &self.memory_map
    }

    /// CR3 value of the kernel page table.
    #[must_use]
    pub const fn page_directory(&self) -> PageDirectoryBase {
        self.page_directory
    }

    #[must_use]
    pub const fn idle_process(&self) -> &Arc<Process> {
        &self.idle_process
    }

    #[must_use]
    pub const fn system_process(&self) -> &Arc<Process> {
        &self.system_process
    }

    /// A ring 3 process on its own page directory.
    #[must_use]
    pub fn user_process(&self, id: u32, path: &'static str, page_directory: PageDirectoryBase) -> Arc<Process> {
        Arc::new(Process::user(id, path, page_directory, self.page_directory))
    }

    /// Creates and starts a thread of `process`.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::NoFreeSlot`] if the table is full before the
    /// scheduler runs.
    pub fn spawn(&self, process: &Arc<Process>, options: ThreadStartOptions) -> Result<ThreadId, SchedulerError> {
        let id = self.scheduler.create_thread(process, options)?;
        self.scheduler.start_thread(id)?;
        Ok(id)
    }

    /// Creates and starts a thread of the system process.
    ///
    /// # Errors
    ///
    /// See [`spawn`](Self::spawn).
    pub fn spawn_kernel_thread(&self, options: ThreadStartOptions) -> Result<ThreadId, SchedulerError> {
        self.spawn(&self.system_process, options)
    }

    pub fn dump_stats(&self) {
        self.memory().physical().dump_stats();
        self.memory().dump_stats();
        self.scheduler.dump_stats();
    }
}

/// Abort hook for bare metal: stop taking interrupts and spin.
fn halt(_message: &fmt::Arguments<'_>) -> ! {
    loop {
        Cpu::disable();
        core::hint::spin_loop();
    }
}
