//! Logging infrastructure for sdmem
//!
//! The driver logs through the `log` crate. This module provides an optional
//! backend that writes timestamped, level-tagged lines to a sink supplied by the
//! board, usually a debug UART. Integrators with their own `log` backend can
//! ignore it.

use core::fmt::{self, Write};
use log::{Level, LevelFilter, Metadata, Record, SetLoggerError};
use spin::Mutex;

/// Destination of log lines
pub type Sink = &'static mut (dyn Write + Send);

/// Source of line timestamps (any monotonic unit, e.g. microseconds)
pub type TimestampFn = fn() -> u64;

struct Output {
    sink: Option<Sink>,
    timestamp: Option<TimestampFn>,
}

/// Logger writing to the board's sink
struct SinkLogger {
    output: Mutex<Output>,
}

fn level_str(level: Level) -> &'static str {
    match level {
        Level::Error => "ERROR",
        Level::Warn => "WARN ",
        Level::Info => "INFO ",
        Level::Debug => "DEBUG",
        Level::Trace => "TRACE",
    }
}

/// Format one log line
fn write_line(
    out: &mut dyn Write,
    timestamp: u64,
    level: Level,
    args: &fmt::Arguments,
) -> fmt::Result {
    writeln!(out, "[{:>10}] [{}] {}", timestamp, level_str(level), args)
}

impl log::Log for SinkLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // Records from the interrupt handler are dropped while the
        // foreground holds the sink
        let Some(mut output) = self.output.try_lock() else {
            return;
        };
        let ts = output.timestamp.map_or(0, |now| now());
        if let Some(sink) = output.sink.as_mut() {
            let _ = write_line(&mut **sink, ts, record.level(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: SinkLogger = SinkLogger {
    output: Mutex::new(Output {
        sink: None,
        timestamp: None,
    }),
};

/// Initialize the logging subsystem
///
/// Installs the sink logger as the global `log` backend. Fails if another
/// backend is already installed.
pub fn init(
    sink: Sink,
    level: LevelFilter,
    timestamp: Option<TimestampFn>,
) -> Result<(), SetLoggerError> {
    {
        let mut output = LOGGER.output.lock();
        output.sink = Some(sink);
        output.timestamp = timestamp;
    }

    log::set_logger(&LOGGER)?;
    log::set_max_level(level);
    Ok(())
}

/// Set the maximum log level
pub fn set_level(level: LevelFilter) {
    log::set_max_level(level);
}
