use crate::Process;
use crate::selectors::{DataSel, KERNEL_DATA, SegmentSelector};
use alloc::sync::Arc;
use core::fmt;
use kernel_memory_addresses::VirtualAddress;

/// Index into the thread table.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Default)]
pub struct ThreadId(usize);

impl ThreadId {
    /// Slot of the idle thread.
    pub const IDLE: Self = Self(0);

    #[must_use]
    pub const fn new(id: usize) -> Self {
        Self(id)
    }

    #[must_use]
    pub const fn as_usize(self) -> usize {
        self.0
    }
}

impl fmt::Debug for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ThreadId({})", self.0)
    }
}

impl fmt::Display for ThreadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ```text
/// Empty → Creating → ScheduleForStart → Running ⇄ Waiting
///                                          ↓
///                          Empty ← Terminated
/// ```
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub enum ThreadStatus {
    #[default]
    Empty,
    Creating,
    ScheduleForStart,
    Running,
    /// Blocked on a child thread.
    Waiting,
    Terminated,
}

impl ThreadStatus {
    #[must_use]
    pub const fn can_schedule(self) -> bool {
        matches!(self, Self::ScheduleForStart | Self::Running)
    }
}

/// One slot of the thread table.
///
/// Stacks grow down: `stack_top` is the lowest address of the stack
/// allocation, `stack_bottom` the highest usable one.
#[derive(Clone)]
pub struct Thread {
    pub(crate) id: ThreadId,
    pub(crate) status: ThreadStatus,
    pub(crate) stack_top: VirtualAddress,
    pub(crate) stack_bottom: VirtualAddress,
    /// Saved frame. For kernel threads this points into the thread's own
    /// stack and is cleared on switch-in.
    pub(crate) stack_state: Option<VirtualAddress>,
    /// Page holding the saved frame of a user thread.
    pub(crate) state_page: Option<VirtualAddress>,
    pub(crate) kernel_stack: VirtualAddress,
    pub(crate) kernel_stack_bottom: VirtualAddress,
    pub(crate) kernel_stack_size: u64,
    pub(crate) ticks: u32,
    pub(crate) user: bool,
    pub(crate) process: Option<Arc<Process>>,
    pub(crate) data_selector: SegmentSelector<DataSel>,
    pub(crate) debug: bool,
    pub(crate) debug_name: Option<&'static str>,
    pub(crate) argument_buffer_size: u32,
    pub(crate) priority: i32,
    pub(crate) priority_interrupts: i32,
    pub(crate) child: Option<ThreadId>,
    pub(crate) parent: Option<ThreadId>,
}

impl Thread {
    pub(crate) const fn empty(id: ThreadId) -> Self {
        Self {
            id,
            status: ThreadStatus::Empty,
            stack_top: VirtualAddress::zero(),
            stack_bottom: VirtualAddress::zero(),
            stack_state: None,
            state_page: None,
            kernel_stack: VirtualAddress::zero(),
            kernel_stack_bottom: VirtualAddress::zero(),
            kernel_stack_size: 0,
            ticks: 0,
            user: false,
            process: None,
            data_selector: KERNEL_DATA,
            debug: false,
            debug_name: None,
            argument_buffer_size: 0,
            priority: 0,
            priority_interrupts: 0,
            child: None,
            parent: None,
        }
    }

    #[must_use]
    pub const fn id(&self) -> ThreadId {
        self.id
    }

    #[must_use]
    pub const fn status(&self) -> ThreadStatus {
        self.status
    }

    #[must_use]
    pub const fn can_schedule(&self) -> bool {
        self.status.can_schedule()
    }

    #[must_use]
    pub const fn stack_top(&self) -> VirtualAddress {
        self.stack_top
    }

    #[must_use]
    pub const fn stack_bottom(&self) -> VirtualAddress {
        self.stack_bottom
    }

    #[must_use]
    pub const fn stack_state(&self) -> Option<VirtualAddress> {
        self.stack_state
    }

    #[must_use]
    pub const fn state_page(&self) -> Option<VirtualAddress> {
        self.state_page
    }

    #[must_use]
    pub const fn kernel_stack(&self) -> VirtualAddress {
        self.kernel_stack
    }

    #[must_use]
    pub const fn kernel_stack_bottom(&self) -> VirtualAddress {
        self.kernel_stack_bottom
    }

    #[must_use]
    pub const fn kernel_stack_size(&self) -> u64 {
        self.kernel_stack_size
    }

    /// Times this thread was switched to.
    #[must_use]
    pub const fn ticks(&self) -> u32 {
        self.ticks
    }

    #[must_use]
    pub const fn is_user(&self) -> bool {
        self.user
    }

    #[must_use]
    pub const fn process(&self) -> Option<&Arc<Process>> {
        self.process.as_ref()
    }

    #[must_use]
    pub const fn data_selector(&self) -> SegmentSelector<DataSel> {
        self.data_selector
    }

    #[must_use]
    pub const fn debug(&self) -> bool {
        self.debug
    }

    #[must_use]
    pub const fn debug_name(&self) -> Option<&'static str> {
        self.debug_name
    }

    #[must_use]
    pub const fn argument_buffer_size(&self) -> u32 {
        self.argument_buffer_size
    }

    #[must_use]
    pub const fn priority(&self) -> i32 {
        self.priority
    }

    /// The thread this one waits for.
    #[must_use]
    pub const fn child(&self) -> Option<ThreadId> {
        self.child
    }

    /// The thread waiting for this one.
    #[must_use]
    pub const fn parent(&self) -> Option<ThreadId> {
        self.parent
    }

    /// Where argument `offset` of the entry point lives.
    #[must_use]
    pub fn argument_addr(&self, offset: u32) -> VirtualAddress {
        self.stack_bottom - u64::from(self.argument_buffer_size) + u64::from(offset) - 4
    }
}

impl fmt::Debug for Thread {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread")
            .field("id", &self.id)
            .field("status", &self.status)
            .field("user", &self.user)
            .field("debug_name", &self.debug_name)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_started_and_running_threads_schedule() {
        use ThreadStatus::*;
        let runnable: Vec<_> = [Empty, Creating, ScheduleForStart, Running, Waiting, Terminated]
            .into_iter()
            .filter(|s| s.can_schedule())
            .collect();
        assert_eq!(runnable, [ScheduleForStart, Running]);
    }

    #[test]
    fn argument_slots_sit_below_the_stack_bottom() {
        let mut t = Thread::empty(ThreadId::new(3));
        t.stack_bottom = VirtualAddress::new(0x4000_3FF8);
        t.argument_buffer_size = 8;
        assert_eq!(t.argument_addr(0), VirtualAddress::new(0x4000_3FEC));
        assert_eq!(t.argument_addr(4), VirtualAddress::new(0x4000_3FF0));
    }
}
