use kernel_alloc::{
    AllocatePageOptions, Page, PageAllocationPool, PhysicalPageManager, PhysicalPageManagerConfig, VirtualPageManager,
    VirtualPageManagerConfig, VirtualPoolStorage,
};
use kernel_info::boot::{BootInfo, BootMemoryRegion, BootMemoryType};
use kernel_info::memory::MemoryLayout;
use kernel_memory_addresses::{AddressSpaceKind, PhysicalAddress, VirtualAddress};
use kernel_mmap::KernelMemoryMapManager;
use kernel_registers::PageDirectoryBase;
use kernel_sched::selectors::{DataSel, Rpl, SegmentSelector};
use kernel_sched::{
    InterruptFrame, Platform, Process, STACK_MARKER, STACK_MARKER_ABOVE, Scheduler, SchedulerConfig, SchedulerError,
    TaskFrame, ThreadId, ThreadStartOptions, ThreadStatus,
};
use kernel_vmem::TwoLevelPageTable;
use kernel_vmem::sim::SimulatedPhys;
use std::sync::{Arc, Mutex};

const MIB: u64 = 1024 * 1024;
const INSTALLED: u64 = 256 * MIB;
const IDLE_ENTRY: u32 = 0x0010_1000;
const MAIN_ENTRY: u32 = 0x0010_2000;
const TRAMPOLINE: u32 = 0x0010_3000;
const WORKER_ENTRY: u32 = 0x0010_4000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Event {
    EndOfInterrupt(u8),
    KernelStack(VirtualAddress),
    LoadTaskRegister,
    GatePrivilege(u8, Rpl),
    TriggerScheduler,
    InterruptReturn { state: VirtualAddress, data_selector: u16, cr3: u32 },
}

#[derive(Default)]
struct RecordingPlatform {
    events: Mutex<Vec<Event>>,
}

impl RecordingPlatform {
    fn record(&self, e: Event) {
        self.events.lock().unwrap().push(e);
    }

    fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    fn last_return(&self) -> Option<(VirtualAddress, u16, u32)> {
        self.events().into_iter().rev().find_map(|e| match e {
            Event::InterruptReturn {
                state,
                data_selector,
                cr3,
            } => Some((state, data_selector, cr3)),
            _ => None,
        })
    }

    fn count(&self, e: Event) -> usize {
        self.events().into_iter().filter(|x| *x == e).count()
    }
}

impl Platform for RecordingPlatform {
    fn end_of_interrupt(&self, vector: u8) {
        self.record(Event::EndOfInterrupt(vector));
    }

    fn set_kernel_stack(&self, top: VirtualAddress) {
        self.record(Event::KernelStack(top));
    }

    fn load_task_register(&self) {
        self.record(Event::LoadTaskRegister);
    }

    fn set_gate_privilege(&self, vector: u8, dpl: Rpl) {
        self.record(Event::GatePrivilege(vector, dpl));
    }

    fn trigger_scheduler(&self) {
        self.record(Event::TriggerScheduler);
    }

    fn interrupt_return(&self, state: VirtualAddress, data_selector: SegmentSelector<DataSel>, page_directory: PageDirectoryBase) {
        self.record(Event::InterruptReturn {
            state,
            data_selector: data_selector.encode(),
            cr3: page_directory.into_bits(),
        });
    }

    fn idle_entry(&self) -> u32 {
        IDLE_ENTRY
    }

    fn termination_trampoline(&self) -> u32 {
        TRAMPOLINE
    }
}

type Manager<'a> = VirtualPageManager<'a, TwoLevelPageTable<SimulatedPhys>>;
type Sched<'a> = Scheduler<Manager<'a>, RecordingPlatform>;

struct Machine {
    phys: Vec<Page>,
    pools: [Vec<Page>; 4],
}

impl Machine {
    fn new() -> Self {
        let pages = |n: u64| vec![Page::default(); usize::try_from(n).unwrap()];
        Self {
            phys: pages(<PhysicalPageManager>::storage_pages(INSTALLED)),
            pools: VirtualPoolStorage::pages(&MemoryLayout::DEFAULT).map(pages),
        }
    }

    fn scheduler(&mut self) -> Sched<'_> {
        let map = [
            BootMemoryRegion::new(0, MIB, BootMemoryType::Reserved, AddressSpaceKind::Both),
            BootMemoryRegion::new(MIB, 4 * MIB, BootMemoryType::KernelElf, AddressSpaceKind::Both),
            BootMemoryRegion::new(5 * MIB, 0x40_2000, BootMemoryType::PageTable, AddressSpaceKind::Both),
            BootMemoryRegion::new(0, INSTALLED, BootMemoryType::SystemUsable, AddressSpaceKind::Both),
        ];
        let mut mmap = KernelMemoryMapManager::setup(&BootInfo::new(INSTALLED, &map)).unwrap();
        let mut table = TwoLevelPageTable::new(SimulatedPhys::new(), PhysicalAddress::new(5 * MIB)).unwrap();
        let physical = PhysicalPageManager::setup(
            &mut mmap,
            INSTALLED,
            &MemoryLayout::DEFAULT,
            &mut self.phys,
            &mut table,
            PhysicalPageManagerConfig::DEFAULT.with_self_test(false),
        )
        .unwrap();
        let [normal_initial, normal_buddy, identity, global] = &mut self.pools;
        let vm = VirtualPageManager::setup(
            physical,
            table,
            &MemoryLayout::DEFAULT,
            VirtualPoolStorage {
                normal_initial,
                normal_buddy,
                identity,
                global,
            },
            VirtualPageManagerConfig::DEFAULT
                .with_self_test(false)
                .with_protected_regions(false),
        )
        .unwrap();
        Scheduler::new(vm, RecordingPlatform::default(), SchedulerConfig::DEFAULT)
    }
}

struct Booted {
    system: Arc<Process>,
    frame: VirtualAddress,
}

fn kernel_directory(s: &Sched<'_>) -> PageDirectoryBase {
    s.memory().with_table(|t| t.directory_base())
}

/// Sets up idle and kernel main, plus a page the tests pass as the frame
/// the interrupt stub pushed.
fn boot(s: &Sched<'_>) -> Booted {
    let dir = kernel_directory(s);
    let idle = Arc::new(Process::kernel(0, "idle", dir));
    let system = Arc::new(Process::kernel(1, "system", dir));
    s.setup(&idle, &system, MAIN_ENTRY).unwrap();
    let frame = s
        .memory()
        .allocate_page(AllocatePageOptions::new().with_debug_name("InterruptStub"))
        .unwrap();
    Booted { system, frame }
}

fn spawn(s: &Sched<'_>, process: &Arc<Process>, options: ThreadStartOptions) -> ThreadId {
    let id = s.create_thread(process, options).unwrap();
    s.start_thread(id).unwrap();
    id
}

fn words<const N: usize>(s: &Sched<'_>, addr: VirtualAddress) -> [u32; N] {
    std::array::from_fn(|i| s.memory().read_u32(addr + 4 * i as u64).unwrap())
}

fn tick_ids(s: &Sched<'_>, frame: VirtualAddress, n: usize) -> Vec<usize> {
    (0..n)
        .map(|_| {
            s.clock_interrupt(frame);
            s.current_thread_id().as_usize()
        })
        .collect()
}

#[test]
fn setup_creates_idle_and_kernel_main() {
    let mut m = Machine::new();
    let s = m.scheduler();
    boot(&s);

    let idle = s.thread(ThreadId::IDLE).unwrap();
    let main = s.thread(ThreadId::new(1)).unwrap();
    assert_eq!(idle.debug_name(), Some("Idle"));
    assert_eq!(main.debug_name(), Some("KernelMain"));
    assert_eq!(idle.status(), ThreadStatus::ScheduleForStart);
    assert_eq!(main.status(), ThreadStatus::ScheduleForStart);
    assert_eq!(s.threads_allocated(), 2);
    assert_eq!(s.active_thread_count(), 2);
    assert!(s.current_thread().is_none());
}

#[test]
fn kernel_thread_stack_is_laid_out_for_its_first_iret() {
    let mut m = Machine::new();
    let s = m.scheduler();
    boot(&s);

    let main = s.thread(ThreadId::new(1)).unwrap();
    let sb = main.stack_bottom();
    assert_eq!(sb, main.stack_top() + 0x4000 - 8);
    assert_eq!(s.memory().read_u32(sb + 4).unwrap(), STACK_MARKER_ABOVE);
    assert_eq!(s.memory().read_u32(sb).unwrap(), STACK_MARKER);
    assert_eq!(u64::from(s.memory().read_u32(sb - 4).unwrap()), sb.as_u64());
    assert_eq!(s.memory().read_u32(sb - 8).unwrap(), TRAMPOLINE);

    let state = main.stack_state().unwrap();
    assert_eq!(state, sb - 8 - InterruptFrame::SIZE);
    let frame = InterruptFrame::from_words(&words(&s, state));
    assert_eq!(frame.eip, MAIN_ENTRY);
    assert_eq!(frame.cs, 0x08);
    assert_eq!(u64::from(frame.ebp), (sb - 8).as_u64());
    assert_eq!(frame.eflags.into_bits(), 0x2);

    assert_eq!(main.kernel_stack_bottom(), main.kernel_stack() + 4 * 4096);
    assert_eq!(main.data_selector().encode(), 0x10);
}

#[test]
fn start_then_first_tick_resumes_kernel_main() {
    let mut m = Machine::new();
    let s = m.scheduler();
    let b = boot(&s);
    let main = s.thread(ThreadId::new(1)).unwrap();
    let idle = s.thread(ThreadId::IDLE).unwrap();

    s.start();
    let events = s.platform().events();
    assert!(events.contains(&Event::GatePrivilege(0xFE, Rpl::Ring3)));
    assert!(events.contains(&Event::KernelStack(idle.kernel_stack_bottom())));
    assert!(events.contains(&Event::LoadTaskRegister));
    assert_eq!(events.last(), Some(&Event::TriggerScheduler));
    assert_eq!(s.current_thread().unwrap().id(), ThreadId::IDLE);

    s.clock_interrupt(b.frame);

    let initial_state = main.stack_state().unwrap();
    let (state, ds, cr3) = s.platform().last_return().unwrap();
    assert_eq!(state, initial_state);
    assert_eq!(ds, 0x10);
    assert_eq!(cr3, kernel_directory(&s).into_bits());
    assert_eq!(s.platform().count(Event::EndOfInterrupt(0x20)), 1);
    assert!(s.platform().events().contains(&Event::KernelStack(main.kernel_stack_bottom())));

    let eflags = s.memory().read_u32(initial_state + 0x30).unwrap();
    assert_eq!(eflags & 0x200, 0x200);

    let now = s.thread(ThreadId::new(1)).unwrap();
    assert_eq!(now.status(), ThreadStatus::Running);
    assert_eq!(now.ticks(), 1);
    assert!(now.stack_state().is_none());
    assert_eq!(s.clock_ticks(), 1);
}

#[test]
fn clock_ticks_count_while_disabled() {
    let mut m = Machine::new();
    let s = m.scheduler();
    let b = boot(&s);

    s.clock_interrupt(b.frame);
    s.clock_interrupt(b.frame);
    assert_eq!(s.clock_ticks(), 2);
    assert!(s.platform().last_return().is_none());
}

#[test]
fn equal_priority_threads_take_turns() {
    let mut m = Machine::new();
    let s = m.scheduler();
    let b = boot(&s);
    for _ in 0..3 {
        spawn(&s, &b.system, ThreadStartOptions::new(WORKER_ENTRY));
    }
    s.start();

    let order = tick_ids(&s, b.frame, 12);
    assert_eq!(order, [1, 2, 3, 4].repeat(3));
}

#[test]
fn preempted_kernel_thread_resumes_from_its_saved_frame() {
    let mut m = Machine::new();
    let s = m.scheduler();
    let b = boot(&s);
    spawn(&s, &b.system, ThreadStartOptions::new(WORKER_ENTRY));
    s.start();

    s.clock_interrupt(b.frame);
    assert_eq!(s.current_thread_id(), ThreadId::new(1));
    s.clock_interrupt(b.frame);
    assert_eq!(s.current_thread_id(), ThreadId::new(2));
    assert_eq!(s.thread(ThreadId::new(1)).unwrap().stack_state(), Some(b.frame));

    s.clock_interrupt(b.frame);
    assert_eq!(s.current_thread_id(), ThreadId::new(1));
    assert_eq!(s.platform().last_return().unwrap().0, b.frame);
}

#[test]
fn positive_priority_keeps_the_cpu_for_extra_ticks() {
    let mut m = Machine::new();
    let s = m.scheduler();
    let b = boot(&s);
    spawn(&s, &b.system, ThreadStartOptions::new(WORKER_ENTRY).with_priority(2));
    s.start();

    let order = tick_ids(&s, b.frame, 9);
    assert_eq!(order, [1, 2, 2, 2, 1, 2, 2, 2, 1]);
}

#[test]
fn negative_priority_is_passed_over() {
    let mut m = Machine::new();
    let s = m.scheduler();
    let b = boot(&s);
    spawn(&s, &b.system, ThreadStartOptions::new(WORKER_ENTRY).with_priority(-2));
    s.start();

    let order = tick_ids(&s, b.frame, 8);
    assert_eq!(order, [1, 1, 1, 2, 1, 1, 1, 2]);
}

#[test]
fn set_thread_priority_applies_to_the_current_thread() {
    let mut m = Machine::new();
    let s = m.scheduler();
    let b = boot(&s);
    spawn(&s, &b.system, ThreadStartOptions::new(WORKER_ENTRY));
    s.start();
    s.clock_interrupt(b.frame);

    s.set_thread_priority(1);
    assert_eq!(s.current_thread().unwrap().priority(), 1);
    assert_eq!(tick_ids(&s, b.frame, 3), [1, 2, 1]);
}

#[test]
fn nothing_runnable_falls_back_to_idle() {
    let mut m = Machine::new();
    let s = m.scheduler();
    let b = boot(&s);
    s.start();
    s.clock_interrupt(b.frame);
    assert_eq!(s.current_thread_id(), ThreadId::new(1));

    s.terminate_current_thread();
    assert_eq!(s.thread(ThreadId::new(1)).unwrap().status(), ThreadStatus::Terminated);
    assert_eq!(s.current_thread_id(), ThreadId::IDLE);
    assert_eq!(s.next_thread(), ThreadId::IDLE);
}

#[test]
fn waiting_parent_is_skipped_until_its_child_detaches() {
    let mut m = Machine::new();
    let s = m.scheduler();
    let b = boot(&s);
    let parent = spawn(&s, &b.system, ThreadStartOptions::new(WORKER_ENTRY));
    let child = spawn(&s, &b.system, ThreadStartOptions::new(WORKER_ENTRY));
    s.start();

    s.attach_child(parent, child).unwrap();
    assert_eq!(s.thread(parent).unwrap().status(), ThreadStatus::Waiting);
    assert_eq!(s.thread(child).unwrap().parent(), Some(parent));
    assert_eq!(tick_ids(&s, b.frame, 4), [1, 3, 1, 3]);

    assert_eq!(s.detach_child(child).unwrap(), Some(parent));
    let p = s.thread(parent).unwrap();
    assert_eq!(p.child(), None);
    assert!(p.can_schedule());
    assert_eq!(tick_ids(&s, b.frame, 3), [1, 2, 3]);
}

#[test]
fn terminate_cascades_to_children() {
    let mut m = Machine::new();
    let s = m.scheduler();
    let b = boot(&s);
    let caller = spawn(&s, &b.system, ThreadStartOptions::new(WORKER_ENTRY));
    let service = spawn(&s, &b.system, ThreadStartOptions::new(WORKER_ENTRY));
    let nested = spawn(&s, &b.system, ThreadStartOptions::new(WORKER_ENTRY));
    s.attach_child(caller, service).unwrap();
    s.attach_child(service, nested).unwrap();

    s.terminate(service).unwrap();

    for id in [service, nested] {
        let t = s.thread(id).unwrap();
        assert_eq!(t.status(), ThreadStatus::Terminated);
        assert_eq!(t.child(), None);
        assert_eq!(t.parent(), None);
    }
    let c = s.thread(caller).unwrap();
    assert_eq!(c.child(), None);
    assert!(c.can_schedule());
}

#[test]
fn terminated_thread_keeps_its_memory_until_reclaimed() {
    let mut m = Machine::new();
    let s = m.scheduler();
    let b = boot(&s);
    let free_before = s.memory().free_pages(PageAllocationPool::Normal);

    let worker = spawn(&s, &b.system, ThreadStartOptions::new(WORKER_ENTRY).with_debug_name("Worker"));
    let t = s.thread(worker).unwrap();
    let stack = t.stack_top();
    assert!(b.system.threads().contains(&worker));
    assert_eq!(s.threads_allocated(), 3);

    s.start();
    assert_eq!(tick_ids(&s, b.frame, 2), [1, 2]);
    s.terminate_current_thread();
    assert_eq!(s.thread(worker).unwrap().status(), ThreadStatus::Terminated);
    assert_eq!(s.current_thread_id(), ThreadId::new(1));
    assert!(s.memory().translate(stack).is_some());
    assert!(s.memory().free_pages(PageAllocationPool::Normal) < free_before);

    assert_eq!(s.reset_terminated_threads(), 1);
    assert_eq!(s.thread(worker).unwrap().status(), ThreadStatus::Empty);
    assert!(s.memory().translate(stack).is_none());
    assert_eq!(s.memory().free_pages(PageAllocationPool::Normal), free_before);
    assert!(!b.system.threads().contains(&worker));
    assert_eq!(s.threads_allocated(), 2);
    assert_eq!(s.threads_max_allocated(), 3);

    let again = spawn(&s, &b.system, ThreadStartOptions::new(WORKER_ENTRY));
    assert_eq!(again, worker);
}

#[test]
fn live_threads_never_share_stacks() {
    let mut m = Machine::new();
    let s = m.scheduler();
    let b = boot(&s);
    let ids: Vec<_> = (0..8)
        .map(|_| spawn(&s, &b.system, ThreadStartOptions::new(WORKER_ENTRY)))
        .collect();

    let mut ranges: Vec<(u64, u64)> = ids
        .iter()
        .flat_map(|id| {
            let t = s.thread(*id).unwrap();
            [
                (t.stack_top().as_u64(), t.stack_bottom().as_u64()),
                (t.kernel_stack().as_u64(), t.kernel_stack_bottom().as_u64()),
            ]
        })
        .collect();
    ranges.sort_unstable();
    for w in ranges.windows(2) {
        assert!(w[0].1 <= w[1].0, "{:X?} overlaps {:X?}", w[0], w[1]);
    }
}

#[test]
fn arguments_are_written_below_the_stack_bottom_before_start() {
    let mut m = Machine::new();
    let s = m.scheduler();
    let b = boot(&s);
    let id = s
        .create_thread(&b.system, ThreadStartOptions::new(WORKER_ENTRY).with_argument_buffer_size(8))
        .unwrap();

    s.set_argument(id, 0, 11).unwrap();
    s.set_argument(id, 4, 22).unwrap();

    let t = s.thread(id).unwrap();
    let sb = t.stack_bottom();
    assert_eq!(s.argument_addr(id, 0).unwrap(), sb - 12);
    assert_eq!(s.memory().read_u32(sb - 12).unwrap(), 11);
    assert_eq!(s.memory().read_u32(sb - 8).unwrap(), 22);
    // Return address sits right below the arguments.
    assert_eq!(s.memory().read_u32(sb - 16).unwrap(), TRAMPOLINE);
    assert_eq!(t.stack_state().unwrap(), sb - 16 - InterruptFrame::SIZE);

    s.start_thread(id).unwrap();
    assert_eq!(s.set_argument(id, 0, 33), Err(SchedulerError::NotCreating(id)));
    assert_eq!(s.start_thread(id), Err(SchedulerError::NotCreating(id)));
}

#[test]
fn undersized_stack_is_raised_to_fit_the_initial_frame() {
    let mut m = Machine::new();
    let s = m.scheduler();
    let b = boot(&s);
    let id = s
        .create_thread(
            &b.system,
            ThreadStartOptions::new(WORKER_ENTRY)
                .with_stack_size(16)
                .with_argument_buffer_size(64),
        )
        .unwrap();

    let t = s.thread(id).unwrap();
    let state = t.stack_state().unwrap();
    assert!(state >= t.stack_top());
    assert_eq!(state, t.stack_top());
    let sb = t.stack_bottom();
    assert_eq!(s.memory().read_u32(sb + 4).unwrap(), STACK_MARKER_ABOVE);
    assert_eq!(s.memory().read_u32(sb - 72).unwrap(), TRAMPOLINE);
    assert_eq!(InterruptFrame::from_words(&words(&s, state)).eip, WORKER_ENTRY);
}

#[test]
fn user_thread_gets_a_task_frame_page() {
    let mut m = Machine::new();
    let s = m.scheduler();
    let b = boot(&s);
    let user_dir = PageDirectoryBase::from_directory_phys(PhysicalAddress::new(0x0080_0000));
    let app = Arc::new(Process::user(7, "/bin/app", user_dir, kernel_directory(&s)));
    assert!(!app.is_kernel_process());

    let id = s
        .create_thread(&app, ThreadStartOptions::new(0x0040_1000).with_argument_buffer_size(4))
        .unwrap();
    s.start_process(&app);
    assert_eq!(s.thread(id).unwrap().status(), ThreadStatus::ScheduleForStart);

    let t = s.thread(id).unwrap();
    assert!(t.is_user());
    let page = t.state_page().unwrap();
    assert_eq!(t.stack_state(), Some(page));
    assert_eq!(t.data_selector().encode(), 0x23);

    let task = TaskFrame::from_words(&words(&s, page));
    assert_eq!(task.frame.eip, 0x0040_1000);
    assert_eq!(task.frame.cs, 0x1B);
    assert_eq!(task.task_ss, 0x23);
    assert_eq!(u64::from(task.task_esp), (t.stack_bottom() - 12).as_u64());
    assert_eq!(task.frame.eflags.iopl(), 3);

    s.start();
    assert_eq!(tick_ids(&s, b.frame, 2), [1, 2]);
    let (state, ds, cr3) = s.platform().last_return().unwrap();
    assert_eq!(state, page);
    assert_eq!(ds, 0x23);
    assert_eq!(cr3, user_dir.into_bits());
    assert_eq!(s.thread(id).unwrap().stack_state(), Some(page));
}

#[test]
fn user_thread_frame_is_copied_on_preemption() {
    let mut m = Machine::new();
    let s = m.scheduler();
    let b = boot(&s);
    let dir = kernel_directory(&s);
    let app = Arc::new(Process::user(7, "/bin/app", dir, dir));
    let id = spawn(&s, &app, ThreadStartOptions::new(0x0040_1000));
    s.start();
    assert_eq!(tick_ids(&s, b.frame, 2), [1, 2]);

    let interrupted = TaskFrame {
        frame: InterruptFrame {
            eip: 0x0040_2222,
            eax: 42,
            ..InterruptFrame::default()
        },
        task_esp: 0x0050_0000,
        task_ss: 0x23,
    };
    for (i, w) in interrupted.to_words().into_iter().enumerate() {
        s.memory().write_u32(b.frame + 4 * i as u64, w).unwrap();
    }
    s.clock_interrupt(b.frame);

    let page = s.thread(id).unwrap().state_page().unwrap();
    let saved = TaskFrame::from_words(&words(&s, page));
    assert_eq!(saved.frame.eip, 0x0040_2222);
    assert_eq!(saved.frame.eax, 42);
    assert_eq!(saved.task_esp, 0x0050_0000);
}

#[test]
fn sleeping_kernel_thread_yields_through_the_clock_interrupt() {
    let mut m = Machine::new();
    let s = m.scheduler();
    let b = boot(&s);
    s.start();
    s.clock_interrupt(b.frame);
    let triggers = s.platform().count(Event::TriggerScheduler);

    s.sleep(0);
    assert_eq!(s.platform().count(Event::TriggerScheduler), triggers + 1);
}

#[test]
fn full_table_is_an_error_before_start() {
    let mut m = Machine::new();
    let s = m.scheduler();
    let b = boot(&s);
    let small = || ThreadStartOptions::new(WORKER_ENTRY).with_stack_size(4096);

    let mut last = ThreadId::IDLE;
    for _ in 2..256 {
        last = spawn(&s, &b.system, small());
    }
    assert_eq!(last, ThreadId::new(255));
    assert_eq!(s.create_thread(&b.system, small()), Err(SchedulerError::NoFreeSlot));

    s.terminate(last).unwrap();
    assert_eq!(s.create_thread(&b.system, small()), Ok(last));
    assert_eq!(s.threads_max_allocated(), 256);
}

#[test]
#[should_panic(expected = "thread table full")]
fn full_table_is_fatal_once_running() {
    let mut m = Machine::new();
    let s = m.scheduler();
    let b = boot(&s);
    let small = || ThreadStartOptions::new(WORKER_ENTRY).with_stack_size(4096);
    for _ in 2..256 {
        spawn(&s, &b.system, small());
    }
    s.start();
    let _ = s.create_thread(&b.system, small());
}

#[test]
fn stats_list_every_thread() {
    let mut m = Machine::new();
    let s = m.scheduler();
    let b = boot(&s);
    let id = s
        .create_thread(&b.system, ThreadStartOptions::new(WORKER_ENTRY))
        .unwrap();
    assert_eq!(s.active_thread_count(), 2);
    s.start_thread(id).unwrap();
    assert_eq!(s.active_thread_count(), 3);
    s.dump_stats();
}
