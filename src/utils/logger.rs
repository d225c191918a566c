//! Logging utilities using the tracing framework

use std::fmt::Display;
use tracing_subscriber::EnvFilter;

/// Logging configuration built once by the binary and handed to [`init`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Number of `-v` flags given on the command line
    pub verbosity: u8,
    /// `--debug` forces debug level regardless of verbosity
    pub debug: bool,
}

impl LoggingConfig {
    pub fn new(verbosity: u8, debug: bool) -> Self {
        Self { verbosity, debug }
    }

    /// Filter directive for this configuration
    /// Default: info, -v / --debug: debug, -vv: trace
    pub fn level(&self) -> &'static str {
        match (self.debug, self.verbosity) {
            (_, v) if v >= 2 => "trace",
            (true, _) | (false, 1) => "debug",
            (false, _) => "info",
        }
    }

    /// Debug or trace output is on; spinners would garble it
    pub fn is_verbose(&self) -> bool {
        self.level() != "info"
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self::new(0, false)
    }
}

/// Install the global subscriber. RUST_LOG, when set, wins over the computed level.
pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("armada={}", config.level())));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// Log an informational message (wrapper around tracing::info)
pub fn log_info<T: Display>(msg: T) {
    tracing::info!("{}", msg);
}

/// Log a debug message (wrapper around tracing::debug)
pub fn log_debug<T: Display>(msg: T) {
    tracing::debug!("{}", msg);
}

/// Log a warning message (wrapper around tracing::warn)
pub fn log_warn<T: Display>(msg: T) {
    tracing::warn!("{}", msg);
}

/// Log an error message (wrapper around tracing::error)
pub fn log_error<T: Display>(msg: T) {
    tracing::error!("{}", msg);
}

/// Macro for convenient info logging
#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::utils::logger::log_info(format!($($arg)*))
    };
}

/// Macro for convenient debug logging
#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => {
        $crate::utils::logger::log_debug(format!($($arg)*))
    };
}

/// Macro for convenient warning logging
#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::utils::logger::log_warn(format!($($arg)*))
    };
}

/// Macro for convenient error logging
#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => {
        $crate::utils::logger::log_error(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_functions() {
        // These should not panic
        log_info("Test info message");
        log_debug("Test debug message");
        log_warn("Test warning message");
        log_error("Test error message");
    }

    #[test]
    fn test_level_selection() {
        assert_eq!(LoggingConfig::default().level(), "info");
        assert_eq!(LoggingConfig::new(0, true).level(), "debug");
        assert_eq!(LoggingConfig::new(1, false).level(), "debug");
        assert_eq!(LoggingConfig::new(2, false).level(), "trace");
        assert_eq!(LoggingConfig::new(3, true).level(), "trace");
    }

    #[test]
    fn test_init_twice_is_harmless() {
        init(&LoggingConfig::default());
        init(&LoggingConfig::new(1, false));
    }
}
