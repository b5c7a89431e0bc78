//! Logging setup for modular-injector
//!
//! The runtime emits `tracing` events under the `modular_injector` target:
//! module loads and eager instantiation at `info`/`debug`, resolution and
//! cache hits at `trace`, failing release callbacks and dry-run failures
//! at `warn`. This module installs a subscriber for them.
//!
//! # Features
//!
//! - `logging` - emit events (default)
//! - `logging-json` - JSON subscriber output (production)
//! - `logging-pretty` - human-readable subscriber output (development)
//!
//! # Example
//!
//! ```rust,ignore
//! use modular_injector::logging;
//!
//! // JSON if logging-json is enabled, pretty otherwise
//! logging::init();
//!
//! // Or configure explicitly
//! logging::builder()
//!     .with_level(tracing::Level::TRACE)
//!     .injector_only()
//!     .compact()
//!     .init();
//! ```
//!
//! `RUST_LOG`, when set, takes precedence over the builder's level and
//! target filter.

use tracing::Level;

/// Target used by every event the runtime emits
pub const TARGET: &str = "modular_injector";

/// Subscriber output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// One JSON object per event
    #[default]
    Json,
    /// Multi-line human-readable output
    Pretty,
    /// Single-line output
    Compact,
}

/// Subscriber configuration.
///
/// Target filters accumulate: `with_target_filter("a").with_target_filter("b")`
/// shows events from both targets at the configured level.
#[derive(Debug, Clone)]
pub struct LoggingBuilder {
    level: Level,
    format: LogFormat,
    targets: Vec<&'static str>,
    location: bool,
    thread_ids: bool,
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            format: LogFormat::default(),
            targets: Vec::new(),
            location: false,
            thread_ids: false,
        }
    }
}

impl LoggingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Minimum level
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn with_format(mut self, format: LogFormat) -> Self {
        self.format = format;
        self
    }

    pub fn json(self) -> Self {
        self.with_format(LogFormat::Json)
    }

    pub fn pretty(self) -> Self {
        self.with_format(LogFormat::Pretty)
    }

    pub fn compact(self) -> Self {
        self.with_format(LogFormat::Compact)
    }

    /// Show events from `target` (repeatable; without any, every target is shown)
    pub fn with_target_filter(mut self, target: &'static str) -> Self {
        if !self.targets.contains(&target) {
            self.targets.push(target);
        }
        self
    }

    /// Only show this crate's events
    pub fn injector_only(self) -> Self {
        self.with_target_filter(TARGET)
    }

    /// Include source file and line
    pub fn with_location(mut self) -> Self {
        self.location = true;
        self
    }

    /// Include thread ids (useful when debugging concurrent first resolutions)
    pub fn with_thread_ids(mut self) -> Self {
        self.thread_ids = true;
        self
    }

    /// Env-filter directives, e.g. `modular_injector=debug`
    pub fn directive(&self) -> String {
        let level = self.level.as_str().to_ascii_lowercase();
        if self.targets.is_empty() {
            return level;
        }
        self.targets
            .iter()
            .map(|target| format!("{target}={level}"))
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Install the subscriber globally.
    ///
    /// Does nothing when a global subscriber is already set.
    #[cfg(any(feature = "logging-json", feature = "logging-pretty"))]
    pub fn init(self) {
        use tracing_subscriber::EnvFilter;

        let filter =
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(self.directive()));

        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_file(self.location)
            .with_line_number(self.location)
            .with_thread_ids(self.thread_ids);

        // A subscriber installed earlier (by the host or a previous init) stays
        let _ = match self.format {
            #[cfg(feature = "logging-json")]
            LogFormat::Json => subscriber.json().try_init(),
            #[cfg(not(feature = "logging-json"))]
            LogFormat::Json => subscriber.pretty().try_init(),
            LogFormat::Pretty => subscriber.pretty().try_init(),
            LogFormat::Compact => subscriber.compact().try_init(),
        };
    }

    /// No-op without a subscriber feature
    #[cfg(not(any(feature = "logging-json", feature = "logging-pretty")))]
    pub fn init(self) {}
}

pub fn builder() -> LoggingBuilder {
    LoggingBuilder::new()
}

/// JSON if `logging-json` is enabled, otherwise pretty
pub fn init() {
    let format = if cfg!(feature = "logging-json") {
        LogFormat::Json
    } else {
        LogFormat::Pretty
    };
    builder().with_format(format).init();
}

/// JSON output at debug level
pub fn init_json() {
    builder().json().init();
}

/// Pretty output at debug level
pub fn init_pretty() {
    builder().pretty().init();
}

/// This crate's events only, at debug level
pub fn init_injector_only() {
    builder().injector_only().init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive_has_no_target() {
        let builder = builder();
        assert_eq!(builder.format, LogFormat::Json);
        assert!(!builder.location);
        assert_eq!(builder.directive(), "debug");
    }

    #[test]
    fn test_target_filters_accumulate() {
        let builder = LoggingBuilder::new()
            .with_level(Level::TRACE)
            .injector_only()
            .with_target_filter("my_app")
            .injector_only();

        assert_eq!(builder.directive(), "modular_injector=trace,my_app=trace");
    }

    #[test]
    fn test_format_and_toggles() {
        let builder = LoggingBuilder::new().compact().with_location().with_thread_ids();
        assert_eq!(builder.format, LogFormat::Compact);
        assert!(builder.location && builder.thread_ids);
        assert_eq!(builder.pretty().format, LogFormat::Pretty);
    }
}
