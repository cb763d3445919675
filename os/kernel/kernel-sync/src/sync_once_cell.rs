use core::cell::UnsafeCell;
use core::hint::spin_loop;
use core::mem::MaybeUninit;
use core::sync::atomic::{AtomicU8, Ordering};

#[derive(Copy, Clone, Eq, PartialEq)]
#[repr(u8)]
enum Stage {
    Empty = 0,
    Writing = 1,
    Ready = 2,
}

/// Write-once slot for `static` items such as the installed logger.
///
/// No heap, no lock word beyond the stage byte; the first caller of
/// [`get_or_init`](Self::get_or_init) runs the initializer while later ones
/// spin until the value is published.
pub struct SyncOnceCell<T> {
    stage: AtomicU8,
    slot: UnsafeCell<MaybeUninit<T>>,
}

// Shared only after the single writer published the value.
unsafe impl<T: Sync + Send> Sync for SyncOnceCell<T> {}
unsafe impl<T: Send> Send for SyncOnceCell<T> {}

impl<T> Default for SyncOnceCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> SyncOnceCell<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            stage: AtomicU8::new(Stage::Empty as u8),
            slot: UnsafeCell::new(MaybeUninit::uninit()),
        }
    }

    #[inline]
    pub fn get(&self) -> Option<&T> {
        self.is_ready().then(|| unsafe { self.read() })
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.stage.load(Ordering::Acquire) == Stage::Ready as u8
    }

    /// Stores `value` if the cell is still empty; otherwise hands it back.
    ///
    /// # Errors
    /// `Err(value)` if another value was stored first.
    pub fn set(&self, value: T) -> Result<&T, T> {
        if self.claim() {
            Ok(unsafe { self.publish(value) })
        } else {
            Err(value)
        }
    }

    pub fn get_or_init(&self, init: impl FnOnce() -> T) -> &T {
        if let Some(v) = self.get() {
            return v;
        }
        if self.claim() {
            return unsafe { self.publish(init()) };
        }
        while !self.is_ready() {
            spin_loop();
        }
        unsafe { self.read() }
    }

    /// Moves the cell from empty to writing. `false` if someone else did.
    fn claim(&self) -> bool {
        self.stage
            .compare_exchange(
                Stage::Empty as u8,
                Stage::Writing as u8,
                Ordering::Acquire,
                Ordering::Relaxed,
            )
            .is_ok()
    }

    /// Caller must hold the claim from [`claim`](Self::claim).
    unsafe fn publish(&self, value: T) -> &T {
        unsafe { (*self.slot.get()).write(value) };
        self.stage.store(Stage::Ready as u8, Ordering::Release);
        unsafe { self.read() }
    }

    /// Caller must have observed the ready stage.
    unsafe fn read(&self) -> &T {
        unsafe { (*self.slot.get()).assume_init_ref() }
    }
}

impl<T> Drop for SyncOnceCell<T> {
    fn drop(&mut self) {
        if *self.stage.get_mut() == Stage::Ready as u8 {
            unsafe { self.slot.get_mut().assume_init_drop() };
        }
    }
}
