use std::fmt;
use std::sync::{Mutex, OnceLock, PoisonError};

pub const LOG_TARGET: &str = "jk_extract";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
        };
        write!(f, "{}", label)
    }
}

impl From<LogLevel> for log::Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => log::Level::Error,
            LogLevel::Warn => log::Level::Warn,
            LogLevel::Info => log::Level::Info,
            LogLevel::Debug => log::Level::Debug,
        }
    }
}

type Sink = Box<dyn Fn(LogLevel, &str) + Send + Sync + 'static>;

/// Hands records to whatever `log` backend the host installed.
fn forward_to_log(level: LogLevel, message: &str) {
    log::log!(target: LOG_TARGET, log::Level::from(level), "{}", message);
}

fn sink_cell() -> &'static Mutex<Sink> {
    static SINK: OnceLock<Mutex<Sink>> = OnceLock::new();
    SINK.get_or_init(|| Mutex::new(Box::new(forward_to_log)))
}

pub fn set_logger(logger: impl Fn(LogLevel, &str) + Send + Sync + 'static) {
    let mut guard = sink_cell().lock().unwrap_or_else(PoisonError::into_inner);
    *guard = Box::new(logger);
}

pub fn reset_logger() {
    set_logger(forward_to_log);
}

pub fn log(level: LogLevel, message: impl AsRef<str>) {
    let guard = sink_cell().lock().unwrap_or_else(PoisonError::into_inner);
    (guard)(level, message.as_ref());
}

pub fn error(message: impl AsRef<str>) {
    log(LogLevel::Error, message);
}

pub fn warn(message: impl AsRef<str>) {
    log(LogLevel::Warn, message);
}

pub fn info(message: impl AsRef<str>) {
    log(LogLevel::Info, message);
}

pub fn debug(message: impl AsRef<str>) {
    log(LogLevel::Debug, message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn custom_sink_receives_records() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        set_logger(move |level, message| {
            if message.starts_with("sink-test") {
                sink.lock().expect("sink lock").push((level, message.to_string()));
            }
        });
        warn("sink-test: skipped model");
        debug(String::from("sink-test: cache miss"));
        reset_logger();
        info("sink-test: after reset");

        let seen = seen.lock().expect("seen lock");
        assert_eq!(
            *seen,
            vec![
                (LogLevel::Warn, "sink-test: skipped model".to_string()),
                (LogLevel::Debug, "sink-test: cache miss".to_string()),
            ]
        );
    }

    #[test]
    fn levels_map_onto_log_crate() {
        assert_eq!(log::Level::from(LogLevel::Warn), log::Level::Warn);
        assert_eq!(LogLevel::Debug.to_string(), "debug");
    }
}
