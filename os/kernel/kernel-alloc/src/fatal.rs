//! # Fatal Stop
//!
//! Exhausted allocators, double frees and corrupted bookkeeping have no
//! caller that could recover, so they end here: the message is logged at
//! `error` level and handed to the abort hook, which never returns.
//!
//! The default hook panics with the message. A bare-metal kernel installs a
//! hook that halts the CPU; host tests keep the panic and assert it with
//! `#[should_panic(expected = "...")]`.

use core::fmt;
use kernel_sync::SpinMonitor;

/// Called with the formatted message of a fatal condition.
pub type AbortHook = fn(&fmt::Arguments<'_>) -> !;

static ABORT_HOOK: SpinMonitor<AbortHook> = SpinMonitor::new(panic_hook);

fn panic_hook(message: &fmt::Arguments<'_>) -> ! {
    panic!("{message}")
}

/// Replaces the abort hook, returning the previous one.
pub fn set_abort_hook(hook: AbortHook) -> AbortHook {
    ABORT_HOOK.with(|current| core::mem::replace(current, hook))
}

/// Logs `message` and stops through the abort hook.
#[cold]
pub fn fatal(message: fmt::Arguments<'_>) -> ! {
    log::error!(target: "fatal", "{message}");
    let hook = ABORT_HOOK.with(|current| *current);
    hook(&message)
}

/// `format!`-style front end of [`fatal()`].
#[macro_export]
macro_rules! fatal {
    ($($arg:tt)*) => {
        $crate::fatal::fatal(::core::format_args!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    #[test]
    #[should_panic(expected = "out of pages: 3")]
    fn default_hook_panics_with_message() {
        crate::fatal!("out of pages: {}", 3);
    }
}
