//! Logging backend writing timestamped lines to stderr. The crate logs
//! through the `log` facade everywhere; [`init`] installs this backend for
//! demos and tests, while an embedding host is free to install its own.

use std::io::Write;

use chrono::Local;
use log::{Level, LevelFilter, Metadata, Record};
use once_cell::sync::OnceCell;

pub struct Logger;

impl Logger {
    fn commit(&self, record: &Record) {
        let level_name = match record.level() {
            Level::Error => "error",
            Level::Warn => "warning",
            Level::Info => "info",
            Level::Debug | Level::Trace => "debug",
        };

        let module = record
            .module_path()
            .and_then(|path| path.split("::").last())
            .unwrap_or("unknown");

        //      [date time] [module] [level] Text
        let mut err = std::io::stderr().lock();
        let _ = writeln!(
            err,
            "[{}] [{}] [{}] {}",
            Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            module,
            level_name,
            record.args()
        );
    }
}

impl log::Log for Logger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        cfg!(feature = "debug") || metadata.level() <= Level::Info
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            self.commit(record);
        }
    }

    fn flush(&self) {}
}

static INSTALLED: OnceCell<()> = OnceCell::new();

/// Install the stderr logger. Only the first call does anything, so library
/// consumers and tests may both call it freely.
pub fn init() {
    INSTALLED.get_or_init(|| {
        static LOGGER: Logger = Logger;
        if log::set_logger(&LOGGER).is_ok() {
            log::set_max_level(if cfg!(feature = "debug") {
                LevelFilter::Trace
            } else {
                LevelFilter::Info
            });
        }
    });
}
