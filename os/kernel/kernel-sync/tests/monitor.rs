use kernel_sync::SpinMonitor;
use kernel_sync::irq::{Cpu, InterruptControl};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::{panic, thread};

/// Interrupt controller that never changes anything, for contention tests.
struct NoIrq;

impl InterruptControl for NoIrq {
    fn interrupts_enabled() -> bool {
        false
    }
    fn disable() {}
    fn enable() {}
}

#[test]
fn enter_and_raii() {
    let m = SpinMonitor::<u32, NoIrq>::new(0);
    {
        let mut g = m.enter();
        *g = 41;
    }
    {
        let mut g = m.enter();
        *g += 1;
        assert_eq!(*g, 42);
    }
    assert!(!m.is_held());
}

#[test]
fn try_enter_fails_while_held() {
    let m = SpinMonitor::<u8, NoIrq>::new(1);
    let g1 = m.try_enter();
    assert!(g1.is_some());
    assert!(m.try_enter().is_none());
    drop(g1);
    assert!(m.try_enter().is_some());
}

#[test]
fn contended_increments_are_exact_and_exclusive() {
    let threads = 8;
    let iters = 5_000;

    let monitor = Arc::new(SpinMonitor::<usize, NoIrq>::new(0));
    let in_cs = Arc::new(AtomicUsize::new(0));
    let start = Arc::new(Barrier::new(threads));

    let mut handles = Vec::with_capacity(threads);
    for _ in 0..threads {
        let monitor = Arc::clone(&monitor);
        let in_cs = Arc::clone(&in_cs);
        let start = Arc::clone(&start);
        handles.push(thread::spawn(move || {
            start.wait();
            for _ in 0..iters {
                monitor.with(|v| {
                    let prev = in_cs.fetch_add(1, Ordering::SeqCst);
                    assert_eq!(prev, 0, "mutual exclusion violated");
                    *v += 1;
                    in_cs.fetch_sub(1, Ordering::SeqCst);
                });
                thread::yield_now();
            }
        }));
    }

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(monitor.with(|v| *v), threads * iters);
}

#[test]
fn monitor_is_released_on_panic() {
    let m = SpinMonitor::<u32, NoIrq>::new(0);
    let res = panic::catch_unwind(panic::AssertUnwindSafe(|| {
        m.with(|v| {
            *v = 123;
            panic!("boom");
        });
    }));
    assert!(res.is_err());
    assert_eq!(m.with(|v| *v), 123);
}

#[test]
fn simulated_cpu_flag_round_trips() {
    // The only test in this binary touching the process-wide flag.
    let m = SpinMonitor::<u8, Cpu>::new(0);
    assert!(Cpu::interrupts_enabled());
    {
        let _g = m.enter();
        assert!(!Cpu::interrupts_enabled());
    }
    assert!(Cpu::interrupts_enabled());
}

#[test]
fn monitor_is_sync_for_send_t() {
    fn takes_sync<S: Sync>(_s: &S) {}
    let m = SpinMonitor::<u8>::new(0);
    takes_sync(&m);
}
