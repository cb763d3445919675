//! The hardware the scheduler drives.
//!
//! Everything architecture specific goes through [`Platform`]: the interrupt
//! controller, the task state segment, the gate table and the final
//! return-from-interrupt.

use crate::selectors::{DataSel, Rpl, SegmentSelector};
use kernel_memory_addresses::VirtualAddress;
use kernel_registers::PageDirectoryBase;

/// Vector of the timer interrupt.
pub const CLOCK_TIMER_VECTOR: u8 = 0x20;

/// Vector raised when a kernel thread returns from its entry point.
pub const TERMINATE_THREAD_VECTOR: u8 = 0xFE;

pub trait Platform {
    /// Acknowledges `vector` at the interrupt controller.
    fn end_of_interrupt(&self, vector: u8);

    /// Sets the stack the CPU switches to on a ring 3 → ring 0 transition
    /// (`TSS.ESP0`).
    fn set_kernel_stack(&self, top: VirtualAddress);

    /// Loads the task register with the task state segment.
    fn load_task_register(&self);

    /// Lowest privilege level allowed to raise `vector` with `int`.
    fn set_gate_privilege(&self, vector: u8, dpl: Rpl);

    /// Raises the clock interrupt in software.
    ///
    /// Does not return on hardware once the scheduler is enabled.
    fn trigger_scheduler(&self);

    /// Switches to `page_directory`, loads `data_selector` and resumes the
    /// frame at `state`.
    ///
    /// Does not return on hardware.
    fn interrupt_return(&self, state: VirtualAddress, data_selector: SegmentSelector<DataSel>, page_directory: PageDirectoryBase);

    /// Entry point of the idle thread.
    fn idle_entry(&self) -> u32;

    /// Return address pushed below a new thread's first frame. Raises
    /// [`TERMINATE_THREAD_VECTOR`] when the entry point returns.
    fn termination_trampoline(&self) -> u32;
}
