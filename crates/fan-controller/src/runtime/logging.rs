use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const LOG_FILE_NAME: &str = "fan-controller.log";

/// Initialize the tracing subscriber with optional JSON output and an
/// optional daily rolling log file. Keep the returned guard alive until
/// exit or buffered file lines are lost.
pub fn init_tracing(json_output: bool, debug: bool, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let default_filter = if debug {
        "info,fan_controller=debug,fan_core=debug,fan_io=debug"
    } else {
        "info"
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let registry = tracing_subscriber::registry().with(filter).with(file_layer);
    if json_output {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().pretty()).init();
    }
    guard
}
