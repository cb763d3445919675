use crate::ThreadId;
use alloc::vec::Vec;
use kernel_registers::PageDirectoryBase;
use kernel_sync::SpinMonitor;

/// Owner of an address space and the threads running in it.
///
/// The thread list holds ids only; the scheduler's table owns the threads.
pub struct Process {
    id: u32,
    path: &'static str,
    user: bool,
    page_directory: PageDirectoryBase,
    kernel_table: bool,
    threads: SpinMonitor<Vec<ThreadId>>,
}

impl Process {
    /// A process running in ring 0 on the kernel page table.
    #[must_use]
    pub const fn kernel(id: u32, path: &'static str, kernel_directory: PageDirectoryBase) -> Self {
        Self {
            id,
            path,
            user: false,
            page_directory: kernel_directory,
            kernel_table: true,
            threads: SpinMonitor::new(Vec::new()),
        }
    }

    /// A ring 3 process. It shares the kernel table if `page_directory`
    /// equals `kernel_directory`.
    #[must_use]
    pub fn user(
        id: u32,
        path: &'static str,
        page_directory: PageDirectoryBase,
        kernel_directory: PageDirectoryBase,
    ) -> Self {
        Self {
            id,
            path,
            user: true,
            page_directory,
            kernel_table: page_directory.into_bits() == kernel_directory.into_bits(),
            threads: SpinMonitor::new(Vec::new()),
        }
    }

    #[must_use]
    pub const fn id(&self) -> u32 {
        self.id
    }

    #[must_use]
    pub const fn path(&self) -> &'static str {
        self.path
    }

    #[must_use]
    pub const fn is_user(&self) -> bool {
        self.user
    }

    #[must_use]
    pub const fn page_directory(&self) -> PageDirectoryBase {
        self.page_directory
    }

    /// Runs on the kernel page table.
    #[must_use]
    pub const fn is_kernel_process(&self) -> bool {
        self.kernel_table
    }

    /// Snapshot of the thread list.
    #[must_use]
    pub fn threads(&self) -> Vec<ThreadId> {
        self.threads.enter().clone()
    }

    pub(crate) fn add_thread(&self, id: ThreadId) {
        self.threads.enter().push(id);
    }

    pub(crate) fn remove_thread(&self, id: ThreadId) {
        let mut threads = self.threads.enter();
        if let Some(pos) = threads.iter().position(|t| *t == id) {
            threads.remove(pos);
        }
    }
}
