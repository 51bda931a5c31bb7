//! Logging setup for shells embedding the core
//!
//! The core itself only emits `tracing` events; a shell that wants them on
//! disk calls [`init`] once at startup. The returned guard must stay alive
//! for the lifetime of the process or buffered lines are lost.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;

/// Route tracing output to a log file next to the state directory
pub fn init(directory: impl AsRef<Path>, file_name: &str) -> WorkerGuard {
    let file_appender = tracing_appender::rolling::never(directory, file_name.to_string());
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();
    guard
}
