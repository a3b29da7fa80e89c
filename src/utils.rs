//! Logging activation (C13), in the same shape as the source this was
//! distilled from: one call at the top of `main` wires `env_logger` to the
//! CLI's verbosity flag, after which every module logs through the `log`
//! facade.

use log::LevelFilter;

/// Initializes `env_logger` at `level`, formatting with module path and
/// timestamp the way the CLI binary expects to see in its output.
pub fn activate_logging(level: LevelFilter) {
    env_logger::Builder::new()
        .filter_level(level)
        .format_timestamp_millis()
        .init();
}

/// Logs `Err` results at error level before unwrapping, so a fatal CLI
/// failure leaves a structured log line rather than just a panic message.
pub trait LogOnErrUnwrap<T> {
    fn log_on_err_unwrap(self) -> T;
}

impl<T, E: std::fmt::Display> LogOnErrUnwrap<T> for Result<T, E> {
    fn log_on_err_unwrap(self) -> T {
        match self {
            Ok(value) => value,
            Err(err) => {
                log::error!("{err}");
                panic!("{err}");
            }
        }
    }
}
