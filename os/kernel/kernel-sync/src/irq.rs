//! Interrupt masking.
//!
//! Everything that must not be preempted by the clock interrupt goes through
//! [`InterruptControl`]. [`Cpu`] is the processor itself; on hosted builds it
//! is replaced by a simulated interrupt flag so the same code paths run in
//! unit tests.

use core::marker::PhantomData;

/// Access to the processor's interrupt flag.
pub trait InterruptControl {
    /// Whether maskable interrupts are currently delivered.
    fn interrupts_enabled() -> bool;

    /// Masks interrupts (`cli`).
    fn disable();

    /// Unmasks interrupts (`sti`).
    fn enable();
}

/// The executing processor.
///
/// On bare-metal x86 this issues `cli`/`sti` and reads `EFLAGS.IF`.
/// Elsewhere it toggles a process-wide simulated flag that starts enabled.
#[derive(Debug, Copy, Clone, Default)]
pub struct Cpu;

#[cfg(all(target_os = "none", any(target_arch = "x86", target_arch = "x86_64")))]
impl InterruptControl for Cpu {
    #[inline]
    fn interrupts_enabled() -> bool {
        use kernel_registers::{Eflags, LoadRegister};
        Eflags::load().if_interrupt_enable()
    }

    #[inline]
    fn disable() {
        unsafe { core::arch::asm!("cli", options(nomem, nostack, preserves_flags)) }
    }

    #[inline]
    fn enable() {
        unsafe { core::arch::asm!("sti", options(nomem, nostack, preserves_flags)) }
    }
}

#[cfg(not(all(target_os = "none", any(target_arch = "x86", target_arch = "x86_64"))))]
mod simulated {
    use core::sync::atomic::{AtomicBool, Ordering};

    pub static INTERRUPT_FLAG: AtomicBool = AtomicBool::new(true);

    impl super::InterruptControl for super::Cpu {
        fn interrupts_enabled() -> bool {
            INTERRUPT_FLAG.load(Ordering::SeqCst)
        }

        fn disable() {
            INTERRUPT_FLAG.store(false, Ordering::SeqCst);
        }

        fn enable() {
            INTERRUPT_FLAG.store(true, Ordering::SeqCst);
        }
    }
}

/// Scoped "no interrupts" sections.
///
/// [`Uninterruptible::enter`] only reports `true` if it was the one that
/// turned interrupts off, so nested sections leave the outermost one in
/// charge of turning them back on.
pub struct Uninterruptible<I = Cpu>(PhantomData<fn() -> I>);

impl<I: InterruptControl> Uninterruptible<I> {
    /// Masks interrupts. Returns whether they were enabled before.
    #[inline]
    #[must_use]
    pub fn enter() -> bool {
        let was_enabled = I::interrupts_enabled();
        if was_enabled {
            I::disable();
        }
        was_enabled
    }

    /// Unmasks interrupts if `enter_status` is `true`.
    #[inline]
    pub fn exit(enter_status: bool) {
        if enter_status {
            I::enable();
        }
    }

    /// Runs `f` with interrupts masked and restores the previous state afterwards.
    #[inline]
    pub fn execute<R>(f: impl FnOnce() -> R) -> R {
        let _guard = IrqGuard::<I>::new();
        f()
    }
}

/// RAII form of [`Uninterruptible`]: masks interrupts on creation and
/// unmasks them on drop only if they were enabled to begin with.
///
/// ```
/// use kernel_sync::irq::{Cpu, InterruptControl, IrqGuard};
///
/// {
///     let _g = IrqGuard::<Cpu>::new();
///     assert!(!Cpu::interrupts_enabled());
/// }
/// ```
pub struct IrqGuard<I: InterruptControl = Cpu> {
    were_enabled: bool,
    _irq: PhantomData<fn() -> I>,
}

impl<I: InterruptControl> Default for IrqGuard<I> {
    fn default() -> Self {
        Self::new()
    }
}

impl<I: InterruptControl> IrqGuard<I> {
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            were_enabled: Uninterruptible::<I>::enter(),
            _irq: PhantomData,
        }
    }

    /// Whether interrupts were enabled when the guard was created.
    #[inline]
    #[must_use]
    pub const fn were_enabled(&self) -> bool {
        self.were_enabled
    }
}

impl<I: InterruptControl> Drop for IrqGuard<I> {
    fn drop(&mut self) {
        Uninterruptible::<I>::exit(self.were_enabled);
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::InterruptControl;
    use std::cell::Cell;

    thread_local! {
        static FLAG: Cell<bool> = const { Cell::new(true) };
        static DISABLE_CALLS: Cell<usize> = const { Cell::new(0) };
    }

    /// Per-thread interrupt flag so parallel tests do not observe each other.
    pub struct LocalIrq;

    impl LocalIrq {
        pub fn reset(enabled: bool) {
            FLAG.with(|f| f.set(enabled));
            DISABLE_CALLS.with(|c| c.set(0));
        }

        pub fn disable_calls() -> usize {
            DISABLE_CALLS.with(Cell::get)
        }
    }

    impl InterruptControl for LocalIrq {
        fn interrupts_enabled() -> bool {
            FLAG.with(Cell::get)
        }

        fn disable() {
            DISABLE_CALLS.with(|c| c.set(c.get() + 1));
            FLAG.with(|f| f.set(false));
        }

        fn enable() {
            FLAG.with(|f| f.set(true));
        }
    }
}
