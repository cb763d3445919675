use kernel_info::sched::{ALLOW_USER_IO, DEFAULT_STACK_SIZE, KERNEL_STACK_SIZE};
use utils_accessors_derive::Setters;

/// How a new thread is set up.
///
/// ```
/// # use kernel_sched::ThreadStartOptions;
/// let opts = ThreadStartOptions::new(0x0040_1000)
///     .with_stack_size(0x8000)
///     .with_argument_buffer_size(8)
///     .with_debug_name("Worker");
/// assert_eq!(opts.priority, 0);
/// ```
#[derive(Copy, Clone, Debug, Eq, PartialEq, Setters)]
pub struct ThreadStartOptions {
    /// First instruction of the thread.
    pub entry: u32,
    /// Rounded up to whole pages and raised to fit the initial frame. `0`
    /// takes the scheduler's default.
    pub stack_size: u64,
    /// Bytes reserved at the stack bottom for entry point arguments.
    pub argument_buffer_size: u32,
    /// `0` runs every tick, `P > 0` keeps the CPU for `P` extra ticks,
    /// `P < 0` is passed over `|P|` times per selection.
    pub priority: i32,
    /// Grant ring 3 port I/O (`IOPL = 3`).
    pub allow_user_io: bool,
    pub debug: bool,
    #[setters(strip_option)]
    pub debug_name: Option<&'static str>,
}

impl ThreadStartOptions {
    #[must_use]
    pub const fn new(entry: u32) -> Self {
        Self {
            entry,
            stack_size: DEFAULT_STACK_SIZE,
            argument_buffer_size: 0,
            priority: 0,
            allow_user_io: ALLOW_USER_IO,
            debug: false,
            debug_name: None,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Setters)]
pub struct SchedulerConfig {
    /// Used when the start options ask for a zero-sized stack.
    pub default_stack_size: u64,
    pub kernel_stack_size: u64,
    /// Global switch for [`ThreadStartOptions::allow_user_io`].
    pub allow_user_io: bool,
}

impl SchedulerConfig {
    pub const DEFAULT: Self = Self {
        default_stack_size: DEFAULT_STACK_SIZE,
        kernel_stack_size: KERNEL_STACK_SIZE,
        allow_user_io: ALLOW_USER_IO,
    };
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self::DEFAULT
    }
}
