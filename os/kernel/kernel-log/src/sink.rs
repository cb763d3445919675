use core::fmt;

/// Byte destination for log output.
///
/// Sinks are shared by a `'static` logger, so writes take `&self`.
pub trait LogSink: Send + Sync {
    fn write_bytes(&self, bytes: &[u8]);
}

/// The emulator debug console at I/O port `0x402`.
///
/// Writes are dropped when the `debug-port` feature is off or when not
/// running on bare-metal x86.
#[derive(Debug, Copy, Clone, Default)]
pub struct DebugPortSink;

impl DebugPortSink {
    pub const PORT: u16 = 0x402;
}

impl LogSink for DebugPortSink {
    #[inline]
    fn write_bytes(&self, bytes: &[u8]) {
        #[cfg(all(
            feature = "debug-port",
            target_os = "none",
            any(target_arch = "x86", target_arch = "x86_64")
        ))]
        for &b in bytes {
            unsafe {
                core::arch::asm!(
                    "out dx, al",
                    in("dx") Self::PORT,
                    in("al") b,
                    options(nomem, nostack, preserves_flags)
                );
            }
        }

        #[cfg(not(all(
            feature = "debug-port",
            target_os = "none",
            any(target_arch = "x86", target_arch = "x86_64")
        )))]
        let _ = bytes;
    }
}

/// Adapts a [`LogSink`] to [`fmt::Write`].
pub struct SinkWriter<'a, S: LogSink + ?Sized>(pub &'a S);

impl<S: LogSink + ?Sized> fmt::Write for SinkWriter<'_, S> {
    #[inline]
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.0.write_bytes(s.as_bytes());
        Ok(())
    }
}
