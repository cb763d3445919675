use crate::sink::{DebugPortSink, LogSink, SinkWriter};
use core::fmt::Write;
use kernel_sync::SyncOnceCell;
use log::{LevelFilter, Log, Metadata, Record, SetLoggerError};

/// Number of per-target level overrides a logger can hold.
pub const MAX_TARGET_LEVELS: usize = 8;

pub struct KernelLogger<S: LogSink> {
    max_level: LevelFilter,
    targets: [Option<(&'static str, LevelFilter)>; MAX_TARGET_LEVELS],
    sink: S,
}

impl<S: LogSink> KernelLogger<S> {
    #[must_use]
    pub const fn new(sink: S, max_level: LevelFilter) -> Self {
        Self {
            max_level,
            targets: [None; MAX_TARGET_LEVELS],
            sink,
        }
    }

    /// Overrides the level for every target starting with `prefix`.
    ///
    /// The first matching override wins. Overrides beyond
    /// [`MAX_TARGET_LEVELS`] are ignored.
    #[must_use]
    pub const fn with_target_level(mut self, prefix: &'static str, level: LevelFilter) -> Self {
        let mut i = 0;
        while i < MAX_TARGET_LEVELS {
            if self.targets[i].is_none() {
                self.targets[i] = Some((prefix, level));
                break;
            }
            i += 1;
        }
        self
    }

    fn level_for(&self, target: &str) -> LevelFilter {
        self.targets
            .iter()
            .flatten()
            .find(|(prefix, _)| target.starts_with(prefix))
            .map_or(self.max_level, |&(_, level)| level)
    }

    /// The most verbose level any target is allowed.
    fn global_max(&self) -> LevelFilter {
        self.targets
            .iter()
            .flatten()
            .map(|&(_, l)| l)
            .fold(self.max_level, core::cmp::max)
    }

    #[must_use]
    pub const fn sink(&self) -> &S {
        &self.sink
    }

    /// Installs this logger as the global [`log`] backend.
    ///
    /// # Errors
    /// Fails if a logger was installed before.
    pub fn install(&'static self) -> Result<(), SetLoggerError> {
        log::set_logger(self)?;
        log::set_max_level(self.global_max());
        Ok(())
    }
}

impl<S: LogSink> Log for KernelLogger<S> {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level_for(metadata.target())
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let _ = writeln!(
            SinkWriter(&self.sink),
            "[{}] {}: {}",
            record.level(),
            record.target(),
            record.args()
        );
    }

    fn flush(&self) {}
}

/// Installs a [`KernelLogger`] over the [`DebugPortSink`]. Call once during early init.
///
/// # Errors
/// Fails if a logger was installed before.
pub fn init_debug_port(max_level: LevelFilter) -> Result<(), SetLoggerError> {
    static LOGGER: SyncOnceCell<KernelLogger<DebugPortSink>> = SyncOnceCell::new();
    LOGGER
        .get_or_init(|| KernelLogger::new(DebugPortSink, max_level))
        .install()
}
