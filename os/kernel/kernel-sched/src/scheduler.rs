//! # Round-robin scheduler
//!
//! A fixed table of [`THREAD_CAPACITY`] slots, slot 0 being the idle thread.
//! Every clock tick saves the interrupted frame of the current thread and
//! resumes the next schedulable slot after it, wrapping over `1..CAPACITY`.
//! If nothing else can run the idle thread is picked.
//!
//! Priorities are a throttle, not a queue:
//!
//! * `P > 0`: the thread keeps the CPU for `P` extra ticks.
//! * `P < 0`: the thread is passed over `|P|` times before it is picked.
//!
//! ## New threads
//!
//! A thread starts by "returning" from an interrupt it never took. Creation
//! writes a frame as the clock interrupt would have saved it, and the first
//! switch pops it with `iret`. The stack of a fresh thread, highest address
//! first:
//!
//! ```text
//!   stack_bottom + 4   0x0FF00001
//!   stack_bottom       0x0FF00002
//!   stack_bottom - 4   stack_bottom
//!   ...                argument buffer
//!   esp / ebp  ─────▶  termination trampoline
//!   ...                interrupt frame (kernel threads)
//! ```
//!
//! User threads keep their frame in a separate page since the CPU switches
//! to the kernel stack on interrupt entry.

use crate::frame::{InterruptFrame, TaskFrame};
use crate::memory::ThreadMemory;
use crate::platform::{CLOCK_TIMER_VECTOR, Platform, TERMINATE_THREAD_VECTOR};
use crate::selectors::{DataSel, KERNEL_CODE, KERNEL_DATA, Rpl, SegmentSelector, USER_CODE, USER_DATA};
use crate::{Process, SchedulerConfig, SchedulerError, Thread, ThreadId, ThreadStartOptions, ThreadStatus};
use alloc::boxed::Box;
use alloc::sync::Arc;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use kernel_alloc::fatal;
use kernel_info::sched::{STACK_DEBUG_PADDING, THREAD_CAPACITY};
use kernel_memory_addresses::{PAGE_SIZE, VirtualAddress, pages_for};
use kernel_registers::{Eflags, PageDirectoryBase};
use kernel_sync::{Cpu, InterruptControl, SpinMonitor};
use log::{debug, info, trace};

/// Written above the stack bottom.
pub const STACK_MARKER_ABOVE: u32 = 0x0FF0_0001;

/// Written at the stack bottom.
pub const STACK_MARKER: u32 = 0x0FF0_0002;

struct ThreadTable {
    threads: Box<[Thread]>,
    allocated: u32,
    max_allocated: u32,
}

impl ThreadTable {
    fn new() -> Self {
        Self {
            threads: (0..THREAD_CAPACITY).map(|i| Thread::empty(ThreadId::new(i))).collect(),
            allocated: 0,
            max_allocated: 0,
        }
    }

    fn get_mut(&mut self, id: ThreadId) -> Result<&mut Thread, SchedulerError> {
        self.threads
            .get_mut(id.as_usize())
            .ok_or(SchedulerError::InvalidThread(id))
    }

    fn find_empty(&self) -> Option<ThreadId> {
        self.threads
            .iter()
            .find(|t| t.status == ThreadStatus::Empty)
            .map(Thread::id)
    }
}

/// What [`Scheduler::switch_to_thread`] hands the platform.
struct SwitchTarget {
    state: VirtualAddress,
    data_selector: SegmentSelector<DataSel>,
    page_directory: PageDirectoryBase,
    kernel_stack_bottom: VirtualAddress,
}

pub struct Scheduler<M: ThreadMemory, P: Platform, I: InterruptControl = Cpu> {
    memory: M,
    platform: P,
    config: SchedulerConfig,
    table: SpinMonitor<ThreadTable, I>,
    enabled: AtomicBool,
    current: AtomicUsize,
    clock_ticks: AtomicU32,
}

impl<M: ThreadMemory, P: Platform, I: InterruptControl> Scheduler<M, P, I> {
    /// A disabled scheduler with an empty thread table.
    #[must_use]
    pub fn new(memory: M, platform: P, config: SchedulerConfig) -> Self {
        Self {
            memory,
            platform,
            config,
            table: SpinMonitor::new(ThreadTable::new()),
            enabled: AtomicBool::new(false),
            current: AtomicUsize::new(0),
            clock_ticks: AtomicU32::new(0),
        }
    }

    #[must_use]
    pub const fn memory(&self) -> &M {
        &self.memory
    }

    #[must_use]
    pub const fn platform(&self) -> &P {
        &self.platform
    }

    #[must_use]
    pub const fn config(&self) -> SchedulerConfig {
        self.config
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// Clears the table and creates the idle thread in slot 0 and the kernel
    /// main thread running `followup_entry`. Both are started but nothing
    /// runs before [`start`](Self::start).
    ///
    /// # Errors
    ///
    /// [`SchedulerError::NoFreeSlot`] if the table cannot hold both threads.
    pub fn setup(
        &self,
        idle_process: &Arc<Process>,
        system_process: &Arc<Process>,
        followup_entry: u32,
    ) -> Result<(), SchedulerError> {
        self.enabled.store(false, Ordering::Release);
        self.current.store(0, Ordering::Release);
        *self.table.enter() = ThreadTable::new();

        let idle = self.create_thread(
            idle_process,
            ThreadStartOptions::new(self.platform.idle_entry()).with_debug_name("Idle"),
        )?;
        let main = self.create_thread(
            system_process,
            ThreadStartOptions::new(followup_entry).with_debug_name("KernelMain"),
        )?;
        debug_assert_eq!(idle, ThreadId::IDLE);

        self.start_thread(idle)?;
        self.start_thread(main)?;
        info!(target: "sched", "scheduler ready: idle={idle} main={main}");
        Ok(())
    }

    /// Enables scheduling and raises the first clock interrupt.
    ///
    /// Does not return on hardware.
    pub fn start(&self) {
        self.current.store(0, Ordering::Release);
        self.enabled.store(true, Ordering::Release);

        self.platform.set_gate_privilege(TERMINATE_THREAD_VECTOR, Rpl::Ring3);
        let idle_stack = self.table.with(|t| t.threads[0].kernel_stack_bottom);
        self.platform.set_kernel_stack(idle_stack);
        self.platform.load_task_register();

        info!(target: "sched", "scheduler enabled");
        self.platform.trigger_scheduler();
    }

    /// Timer handler. `stack_state` is the frame the interrupt stub pushed.
    pub fn clock_interrupt(&self, stack_state: VirtualAddress) {
        self.clock_ticks.fetch_add(1, Ordering::Relaxed);

        if !self.is_enabled() {
            return;
        }

        let current = self.current.load(Ordering::Acquire);
        let keep_running = self.table.with(|t| {
            let th = &mut t.threads[current];
            if th.priority > 0 {
                th.priority_interrupts += 1;
                if th.priority_interrupts <= th.priority {
                    return true;
                }
            }
            th.priority_interrupts = 0;
            false
        });
        if keep_running {
            return;
        }

        self.save_thread_state(ThreadId::new(current), stack_state);
        self.schedule_next_thread();
    }

    /// Records the frame of a running thread. User frames are copied into
    /// the thread's state page, kernel frames stay where they are.
    fn save_thread_state(&self, id: ThreadId, stack_state: VirtualAddress) {
        let mut table = self.table.enter();
        let Ok(thread) = table.get_mut(id) else {
            return;
        };
        if thread.status != ThreadStatus::Running {
            return;
        }

        if thread.user {
            let Some(dst) = thread.stack_state else {
                fatal!("user thread {id} has no state page");
            };
            let words = self.memory.read_words::<{ TaskFrame::WORDS }>(stack_state);
            self.memory.write_words(dst, &words);
        } else {
            thread.stack_state = Some(stack_state);
        }

        trace!(target: "sched", "thread {id}: saved state from {stack_state}");
    }

    /// Switches from the current thread to the next schedulable one.
    pub fn schedule_next_thread(&self) {
        let next = self.next_thread();
        self.switch_to_thread(next);
    }

    /// The thread the next switch would resume.
    ///
    /// Updates the skip counters of negative-priority threads it passes.
    pub fn next_thread(&self) -> ThreadId {
        self.next_thread_after(self.current.load(Ordering::Acquire))
    }

    fn next_thread_after(&self, start: usize) -> ThreadId {
        let mut table = self.table.enter();
        let mut id = start;
        for _ in 1..THREAD_CAPACITY {
            id += 1;
            if id >= THREAD_CAPACITY {
                id = 1;
            }

            let th = &mut table.threads[id];
            if th.child.is_some() || !th.can_schedule() {
                continue;
            }
            if th.priority < 0 {
                th.priority_interrupts -= 1;
                if th.priority_interrupts >= th.priority {
                    continue;
                }
                th.priority_interrupts = 0;
            }
            return th.id;
        }
        ThreadId::IDLE
    }

    /// Resumes thread `id`.
    ///
    /// Does not return on hardware.
    pub fn switch_to_thread(&self, id: ThreadId) {
        let target = self.table.with(|t| {
            let Ok(thread) = t.get_mut(id) else {
                return Err(None);
            };
            thread.ticks = thread.ticks.wrapping_add(1);
            self.current.store(id.as_usize(), Ordering::Release);
            self.platform.end_of_interrupt(CLOCK_TIMER_VECTOR);
            thread.status = ThreadStatus::Running;

            let Some(state) = thread.stack_state else {
                return Err(Some(id));
            };
            let Some(process) = thread.process.as_ref() else {
                return Err(Some(id));
            };
            let page_directory = process.page_directory();
            if !thread.user {
                thread.stack_state = None;
            }
            Ok(SwitchTarget {
                state,
                data_selector: thread.data_selector,
                page_directory,
                kernel_stack_bottom: thread.kernel_stack_bottom,
            })
        });

        let target = match target {
            Ok(target) => target,
            Err(None) => fatal!("switch to invalid thread {id}"),
            Err(Some(id)) => {
                self.dump_stats();
                fatal!("thread {id} has no saved state to resume");
            }
        };

        let eflags_addr = target.state + InterruptFrame::EFLAGS_OFFSET;
        let eflags = Eflags::from_bits(self.memory.read_u32(eflags_addr)).with_if_interrupt_enable(true);
        self.memory.write_u32(eflags_addr, eflags.into_bits());

        trace!(target: "sched", "switching to thread {id}, state at {}", target.state);
        self.platform.set_kernel_stack(target.kernel_stack_bottom);
        self.platform
            .interrupt_return(target.state, target.data_selector, target.page_directory);
    }

    /// Allocates a slot, stacks and the initial frame of a new thread.
    ///
    /// The thread stays [`ThreadStatus::Creating`] until
    /// [`start_thread`](Self::start_thread). If the table is full, terminated
    /// threads are reclaimed first. A full table is fatal once the scheduler
    /// runs and an error before.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::NoFreeSlot`] while the scheduler is disabled.
    pub fn create_thread(
        &self,
        process: &Arc<Process>,
        options: ThreadStartOptions,
    ) -> Result<ThreadId, SchedulerError> {
        let id = match self.claim_slot(process, &options) {
            Some(id) => id,
            None => {
                self.reset_terminated_threads();
                match self.claim_slot(process, &options) {
                    Some(id) => id,
                    None if self.is_enabled() => fatal!("thread table full"),
                    None => return Err(SchedulerError::NoFreeSlot),
                }
            }
        };

        let user = process.is_user();
        let requested = if options.stack_size == 0 {
            self.config.default_stack_size
        } else {
            options.stack_size
        };
        let stack_size = requested.max(min_stack_size(options.argument_buffer_size));
        if stack_size != requested {
            debug!(target: "sched", "stack of 0x{requested:X} bytes raised to 0x{stack_size:X}");
        }
        let stack_pages = pages_for(stack_size);
        let stack_top = self.memory.allocate_pages(stack_pages, "ThreadStack");
        self.memory.set_writable(stack_top, stack_pages * PAGE_SIZE);
        let stack_bottom = stack_top + stack_size - STACK_DEBUG_PADDING;

        let kernel_stack_size = self.config.kernel_stack_size;
        let kernel_stack = self
            .memory
            .allocate_pages(pages_for(kernel_stack_size), "ThreadKernelStack");
        let kernel_stack_bottom = kernel_stack + kernel_stack_size;

        let state_offset = STACK_DEBUG_PADDING + u64::from(options.argument_buffer_size);
        let entry_esp = stack_bottom - state_offset;

        self.memory.write_u32(stack_bottom + 4, STACK_MARKER_ABOVE);
        self.memory.write_u32(stack_bottom, STACK_MARKER);
        self.memory.write_u32(stack_bottom - 4, low_word(stack_bottom));
        self.memory
            .write_u32(entry_esp, self.platform.termination_trampoline());

        let mut eflags = Eflags::new();
        if user && options.allow_user_io && self.config.allow_user_io {
            eflags.set_iopl(Eflags::USER_IOPL);
        }
        let code = if user { USER_CODE } else { KERNEL_CODE };
        let frame = InterruptFrame {
            ebp: low_word(entry_esp),
            eip: options.entry,
            cs: u32::from(code.encode()),
            eflags,
            ..InterruptFrame::default()
        };

        let (stack_state, state_page) = if user {
            let page = self.memory.allocate_pages(1, "ThreadStackState");
            let task = TaskFrame {
                frame,
                task_esp: low_word(entry_esp),
                task_ss: u32::from(USER_DATA.encode()),
            };
            self.memory.write_words(page, &task.to_words());
            (page, Some(page))
        } else {
            let state = entry_esp - InterruptFrame::SIZE;
            self.memory.write_words(state, &frame.to_words());
            (state, None)
        };

        {
            let mut table = self.table.enter();
            let thread = &mut table.threads[id.as_usize()];
            thread.stack_top = stack_top;
            thread.stack_bottom = stack_bottom;
            thread.stack_state = Some(stack_state);
            thread.state_page = state_page;
            thread.kernel_stack = kernel_stack;
            thread.kernel_stack_bottom = kernel_stack_bottom;
            thread.kernel_stack_size = kernel_stack_size;
            thread.data_selector = if user { USER_DATA } else { KERNEL_DATA };
            table.allocated += 1;
            table.max_allocated = table.max_allocated.max(table.allocated);
        }
        process.add_thread(id);

        debug!(
            target: "sched",
            "created thread {id} ({}) in process {}: entry=0x{:08X} stack={stack_top}+0x{stack_size:X} user={user}",
            options.debug_name.unwrap_or("-"),
            process.id(),
            options.entry,
        );
        Ok(id)
    }

    fn claim_slot(&self, process: &Arc<Process>, options: &ThreadStartOptions) -> Option<ThreadId> {
        let mut table = self.table.enter();
        let id = table.find_empty()?;
        let thread = &mut table.threads[id.as_usize()];
        *thread = Thread::empty(id);
        thread.status = ThreadStatus::Creating;
        thread.user = process.is_user();
        thread.process = Some(Arc::clone(process));
        thread.debug = options.debug;
        thread.debug_name = options.debug_name;
        thread.argument_buffer_size = options.argument_buffer_size;
        thread.priority = options.priority;
        Some(id)
    }

    /// Makes a thread under construction schedulable.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::NotCreating`] if the thread was started before or
    /// its slot is empty.
    pub fn start_thread(&self, id: ThreadId) -> Result<(), SchedulerError> {
        self.table.with(|t| {
            let thread = t.get_mut(id)?;
            if thread.status != ThreadStatus::Creating {
                return Err(SchedulerError::NotCreating(id));
            }
            thread.status = ThreadStatus::ScheduleForStart;
            Ok(())
        })
    }

    /// Starts every thread of `process` that is still being created.
    pub fn start_process(&self, process: &Process) {
        for id in process.threads() {
            if self.start_thread(id).is_ok() {
                trace!(target: "sched", "process {}: started thread {id}", process.id());
            }
        }
    }

    /// Writes an entry point argument. Only valid before the thread starts.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::NotCreating`] once the thread was started.
    pub fn set_argument(&self, id: ThreadId, offset: u32, value: u32) -> Result<(), SchedulerError> {
        let addr = self.table.with(|t| {
            let thread = t.get_mut(id)?;
            if thread.status != ThreadStatus::Creating {
                return Err(SchedulerError::NotCreating(id));
            }
            Ok(thread.argument_addr(offset))
        })?;
        self.memory.write_u32(addr, value);
        Ok(())
    }

    /// # Errors
    ///
    /// [`SchedulerError::InvalidThread`] if `id` is outside the table.
    pub fn argument_addr(&self, id: ThreadId, offset: u32) -> Result<VirtualAddress, SchedulerError> {
        self.table.with(|t| Ok(t.get_mut(id)?.argument_addr(offset)))
    }

    /// Ends the current thread unless it is the idle thread.
    pub fn terminate_current_thread(&self) {
        let id = self.current_thread_id();
        info!(target: "sched", "terminating thread {id}");
        if id != ThreadId::IDLE {
            self.terminate_thread(id);
        }
    }

    /// Marks a running thread terminated and switches away from it. Its
    /// memory is released by the next [`reset_terminated_threads`](Self::reset_terminated_threads).
    pub fn terminate_thread(&self, id: ThreadId) {
        self.table.with(|t| {
            if let Ok(thread) = t.get_mut(id)
                && thread.status == ThreadStatus::Running
            {
                thread.status = ThreadStatus::Terminated;
            }
        });
        let next = self.next_thread_after(id.as_usize());
        self.switch_to_thread(next);
    }

    /// Terminates `id` and the chain of children it waits for. A parent
    /// waiting for `id` is released.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::InvalidThread`] if a thread of the chain is outside
    /// the table.
    pub fn terminate(&self, id: ThreadId) -> Result<(), SchedulerError> {
        let mut table = self.table.enter();
        let parent = table.get_mut(id)?.parent;
        if let Some(parent) = parent {
            release_parent(&mut table, parent, id);
        }

        let mut next = Some(id);
        while let Some(tid) = next {
            let thread = table.get_mut(tid)?;
            thread.status = ThreadStatus::Terminated;
            thread.parent = None;
            next = thread.child.take();
        }
        Ok(())
    }

    /// Makes `parent` wait for `child`. The parent is not scheduled until
    /// the child detaches or terminates.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::InvalidThread`] if either id is outside the table.
    pub fn attach_child(&self, parent: ThreadId, child: ThreadId) -> Result<(), SchedulerError> {
        let mut table = self.table.enter();
        table.get_mut(child)?.parent = Some(parent);
        let p = table.get_mut(parent)?;
        p.child = Some(child);
        p.status = ThreadStatus::Waiting;
        Ok(())
    }

    /// Ends the wait of the thread `child` belongs to. Returns that thread.
    ///
    /// # Errors
    ///
    /// [`SchedulerError::InvalidThread`] if `child` is outside the table.
    pub fn detach_child(&self, child: ThreadId) -> Result<Option<ThreadId>, SchedulerError> {
        let mut table = self.table.enter();
        let parent = table.get_mut(child)?.parent.take();
        if let Some(parent) = parent {
            release_parent(&mut table, parent, child);
        }
        Ok(parent)
    }

    /// Frees the memory of every terminated thread and empties its slot.
    /// Returns the number of slots reclaimed.
    pub fn reset_terminated_threads(&self) -> usize {
        let mut table = self.table.enter();
        let mut reclaimed = 0;
        for i in 0..THREAD_CAPACITY {
            if table.threads[i].status != ThreadStatus::Terminated {
                continue;
            }

            let thread = core::mem::replace(&mut table.threads[i], Thread::empty(ThreadId::new(i)));
            if let Some(process) = &thread.process {
                process.remove_thread(thread.id);
            }
            self.memory.free_addr(thread.stack_top);
            if let Some(page) = thread.state_page {
                self.memory.free_addr(page);
            }
            self.memory.free_addr(thread.kernel_stack);

            table.allocated = table.allocated.saturating_sub(1);
            reclaimed += 1;
            trace!(target: "sched", "reclaimed thread {}", thread.id);
        }
        reclaimed
    }

    /// Sets the priority of the current thread.
    pub fn set_thread_priority(&self, priority: i32) {
        let current = self.current.load(Ordering::Acquire);
        self.table.with(|t| t.threads[current].priority = priority);
    }

    /// Yields to the next thread. A kernel thread yields through the clock
    /// interrupt so its frame is saved on the way.
    pub fn sleep(&self, _time: u32) {
        let Some(thread) = self.current_thread() else {
            fatal!("sleep without a running scheduler");
        };
        let Some(process) = thread.process() else {
            fatal!("thread {} has no process", thread.id());
        };
        if process.is_kernel_process() {
            self.platform.trigger_scheduler();
        } else {
            self.schedule_next_thread();
        }
    }

    #[must_use]
    pub fn current_thread_id(&self) -> ThreadId {
        ThreadId::new(self.current.load(Ordering::Acquire))
    }

    /// Snapshot of the current thread, `None` while disabled.
    #[must_use]
    pub fn current_thread(&self) -> Option<Thread> {
        if !self.is_enabled() {
            return None;
        }
        let current = self.current.load(Ordering::Acquire);
        Some(self.table.with(|t| t.threads[current].clone()))
    }

    /// Snapshot of slot `id`.
    #[must_use]
    pub fn thread(&self, id: ThreadId) -> Option<Thread> {
        self.table.with(|t| t.threads.get(id.as_usize()).cloned())
    }

    #[must_use]
    pub fn active_thread_count(&self) -> usize {
        self.table.with(|t| t.threads.iter().filter(|t| t.can_schedule()).count())
    }

    #[must_use]
    pub fn threads_allocated(&self) -> u32 {
        self.table.with(|t| t.allocated)
    }

    #[must_use]
    pub fn threads_max_allocated(&self) -> u32 {
        self.table.with(|t| t.max_allocated)
    }

    #[must_use]
    pub fn clock_ticks(&self) -> u32 {
        self.clock_ticks.load(Ordering::Relaxed)
    }

    pub fn dump_stats(&self) {
        let table = self.table.enter();
        info!(
            target: "sched",
            "threads: allocated={} max={} ticks={}",
            table.allocated,
            table.max_allocated,
            self.clock_ticks()
        );
        for (label, schedulable) in [("schedulable", true), ("other", false)] {
            for th in table.threads.iter().filter(|t| t.status != ThreadStatus::Empty) {
                if th.can_schedule() != schedulable {
                    continue;
                }
                info!(
                    target: "sched",
                    "{label}: thread {} {:?} {} user={} prio={} ticks={}",
                    th.id,
                    th.status,
                    th.debug_name.unwrap_or("-"),
                    th.user,
                    th.priority,
                    th.ticks
                );
            }
        }
    }
}

fn release_parent(table: &mut ThreadTable, parent: ThreadId, child: ThreadId) {
    if let Ok(p) = table.get_mut(parent)
        && p.child == Some(child)
    {
        p.child = None;
        if p.status == ThreadStatus::Waiting {
            p.status = ThreadStatus::Running;
        }
    }
}

/// Smallest stack that fits everything written below its end at creation,
/// down to the initial ring 0 frame.
fn min_stack_size(argument_buffer_size: u32) -> u64 {
    2 * STACK_DEBUG_PADDING + u64::from(argument_buffer_size) + InterruptFrame::SIZE
}

/// Thread addresses live in the 32-bit window.
#[allow(clippy::cast_possible_truncation)]
const fn low_word(addr: VirtualAddress) -> u32 {
    addr.as_u64() as u32
}
