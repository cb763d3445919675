//! Spin monitor for state shared with the clock interrupt.
//!
//! A [`SpinMonitor`] masks interrupts before it starts spinning, so the
//! holder can never be preempted by the scheduler while it holds the lock.
//! The lock word remembers whether this particular entry was the one that
//! masked interrupts; leaving the monitor unmasks them only in that case.

use crate::irq::{Cpu, InterruptControl, Uninterruptible};
use core::cell::UnsafeCell;
use core::hint::spin_loop;
use core::marker::PhantomData;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicU8, Ordering};

const FREE: u8 = 0;
/// Held; interrupts were already masked on entry.
const HELD: u8 = 1;
/// Held; entering masked interrupts and leaving must unmask them.
const HELD_UNMASK_ON_EXIT: u8 = 2;

pub struct SpinMonitor<T, I: InterruptControl = Cpu> {
    state: AtomicU8,
    cell: UnsafeCell<T>,
    _irq: PhantomData<fn() -> I>,
}

unsafe impl<T: Send, I: InterruptControl> Sync for SpinMonitor<T, I> {}
unsafe impl<T: Send, I: InterruptControl> Send for SpinMonitor<T, I> {}

impl<T: Default, I: InterruptControl> Default for SpinMonitor<T, I> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T, I: InterruptControl> SpinMonitor<T, I> {
    pub const fn new(value: T) -> Self {
        Self {
            state: AtomicU8::new(FREE),
            cell: UnsafeCell::new(value),
            _irq: PhantomData,
        }
    }

    /// Masks interrupts and spins until the monitor is free.
    pub fn enter(&self) -> MonitorGuard<'_, T, I> {
        let tag = Self::mask();
        while self
            .state
            .compare_exchange_weak(FREE, tag, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            while self.state.load(Ordering::Relaxed) != FREE {
                spin_loop();
            }
        }
        MonitorGuard { m: self }
    }

    /// Single attempt. On failure the interrupt state is left as it was.
    pub fn try_enter(&self) -> Option<MonitorGuard<'_, T, I>> {
        let tag = Self::mask();
        if self
            .state
            .compare_exchange(FREE, tag, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Some(MonitorGuard { m: self })
        } else {
            Uninterruptible::<I>::exit(tag == HELD_UNMASK_ON_EXIT);
            None
        }
    }

    /// Runs `f` inside the monitor.
    #[inline]
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut g = self.enter();
        f(&mut g)
    }

    #[inline]
    pub fn is_held(&self) -> bool {
        self.state.load(Ordering::Relaxed) != FREE
    }

    #[inline]
    pub const fn get_mut(&mut self) -> &mut T {
        self.cell.get_mut()
    }

    pub fn into_inner(self) -> T {
        self.cell.into_inner()
    }

    fn mask() -> u8 {
        if Uninterruptible::<I>::enter() {
            HELD_UNMASK_ON_EXIT
        } else {
            HELD
        }
    }
}

pub struct MonitorGuard<'a, T, I: InterruptControl> {
    m: &'a SpinMonitor<T, I>,
}

impl<T, I: InterruptControl> Deref for MonitorGuard<'_, T, I> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.m.cell.get() }
    }
}

impl<T, I: InterruptControl> DerefMut for MonitorGuard<'_, T, I> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.m.cell.get() }
    }
}

impl<T, I: InterruptControl> Drop for MonitorGuard<'_, T, I> {
    fn drop(&mut self) {
        let tag = self.m.state.swap(FREE, Ordering::Release);
        Uninterruptible::<I>::exit(tag == HELD_UNMASK_ON_EXIT);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::irq::test_support::LocalIrq;

    #[test]
    fn exit_unmasks_only_when_entry_masked() {
        LocalIrq::reset(true);
        let m = SpinMonitor::<u32, LocalIrq>::new(0);
        {
            let _g = m.enter();
            assert!(!LocalIrq::interrupts_enabled());
            assert!(m.is_held());
        }
        assert!(LocalIrq::interrupts_enabled());

        LocalIrq::reset(false);
        m.with(|v| *v += 1);
        assert!(!LocalIrq::interrupts_enabled());
    }

    #[test]
    fn failed_try_enter_restores_interrupts() {
        LocalIrq::reset(false);
        let m = SpinMonitor::<u32, LocalIrq>::new(0);
        let held = m.enter();

        LocalIrq::enable();
        assert!(m.try_enter().is_none());
        assert!(LocalIrq::interrupts_enabled());

        drop(held);
        assert!(m.try_enter().is_some());
    }
}
