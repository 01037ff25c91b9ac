//! Centralized logging for the RTC bridge applications
//!
//! Provides a custom formatter for tracing that:
//! - Formats thread IDs as #N instead of ThreadId(N), which matters here because
//!   the bridge mixes caller threads, engine callback threads and the delivery thread
//! - Extracts `method` and `event` fields to display as `call::joinChannel` or
//!   `event::onUserJoined`
//! - Strips common prefixes from targets for cleaner output
//! - Filters external dependency logs based on `RTC_LOGDEPS` environment variable
//!
//! Logs go to stderr so stdout stays free for hosts that speak on it.
//!
//! # Environment Variables
//!
//! - `RTC_LOGDEPS`: Set to `1` to enable logging from external dependencies (tokio, etc.).
//!   Default is `0` which only shows logs from the bridge crates.
//!
//! # Usage
//!
//! ```rust,ignore
//! use rtc_log::{init_logging, LogConfig};
//! use tracing::Level;
//!
//! let config = LogConfig::new("rtc_host::");
//! init_logging(config)?;
//!
//! let file = std::fs::File::create("rtc_host.log")?;
//! let config = LogConfig::new("rtc_host::")
//!     .with_log_file(file)
//!     .with_level(Level::DEBUG);
//! init_logging(config)?;
//! ```

use std::fmt as std_fmt;
use std::io::Write;
use tracing::Level;
use tracing::field::Field;
use tracing_subscriber::field::Visit;
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::fmt::{self, FmtContext, FormatEvent, FormatFields, format::Writer};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

/// Crates whose logs are shown when dependency logging is off
const OWN_CRATES: &[&str] = &["rtc_host", "rtc_bridge", "rtc_protocol", "rtc_log"];

/// Field extractor for the `method`, `event` and `message` fields
///
/// Used by the custom formatter to tag channel traffic as
/// `call::<method>: message` or `event::<name>: message`.
#[derive(Default)]
pub struct FieldExtractor {
    pub method: Option<String>,
    pub event: Option<String>,
    pub message: Option<String>,
}

impl FieldExtractor {
    fn store(&mut self, field: &Field, value: String) {
        match field.name() {
            "method" => self.method = Some(value),
            "event" => self.event = Some(value),
            "message" => self.message = Some(value),
            _ => {}
        }
    }

    /// The `call::x` / `event::x` tag, if the record carries one
    pub fn channel_tag(&self) -> Option<String> {
        match (&self.method, &self.event) {
            (Some(method), _) => Some(format!("call::{}", method)),
            (None, Some(event)) => Some(format!("event::{}", event)),
            (None, None) => None,
        }
    }
}

impl Visit for FieldExtractor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.store(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std_fmt::Debug) {
        self.store(field, format!("{:?}", value).trim_matches('"').to_string());
    }
}

/// Custom event formatter for the bridge applications
///
/// Features:
/// - Thread IDs displayed as #N instead of ThreadId(N)
/// - Channel logs formatted as `call::method: message`
/// - Configurable ANSI color support
/// - Configurable target prefix stripping
#[derive(Clone)]
pub struct CustomFormatter<T> {
    timer: T,
    ansi: bool,
    /// Prefix to strip from log targets (e.g., "rtc_host::")
    strip_prefix: Option<String>,
}

impl<T> CustomFormatter<T> {
    /// Create a new CustomFormatter
    pub fn new(timer: T, ansi: bool) -> Self {
        Self {
            timer,
            ansi,
            strip_prefix: None,
        }
    }

    /// Set the prefix to strip from log targets
    pub fn with_strip_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.strip_prefix = Some(prefix.into());
        self
    }

    fn display_target<'a>(&self, target: &'a str) -> Option<&'a str> {
        let Some(prefix) = &self.strip_prefix else {
            return Some(target);
        };
        let app_name = prefix.trim_end_matches("::");
        if target == app_name {
            return None;
        }
        Some(target.strip_prefix(prefix.as_str()).unwrap_or(target))
    }
}

impl<S, N, T> FormatEvent<S, N> for CustomFormatter<T>
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
    T: fmt::time::FormatTime,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &tracing::Event<'_>,
    ) -> std_fmt::Result {
        let metadata = event.metadata();

        let (dim_start, dim_end) = if self.ansi {
            ("\x1b[2m", "\x1b[0m")
        } else {
            ("", "")
        };
        let (level_color, level_str) = match *metadata.level() {
            Level::ERROR => (if self.ansi { "\x1b[31m" } else { "" }, "ERROR"),
            Level::WARN => (if self.ansi { "\x1b[33m" } else { "" }, " WARN"),
            Level::INFO => (if self.ansi { "\x1b[32m" } else { "" }, " INFO"),
            Level::DEBUG => (if self.ansi { "\x1b[34m" } else { "" }, "DEBUG"),
            Level::TRACE => (if self.ansi { "\x1b[35m" } else { "" }, "TRACE"),
        };
        let color_end = if self.ansi { "\x1b[0m" } else { "" };

        write!(writer, "{}", dim_start)?;
        self.timer.format_time(&mut writer)?;
        write!(writer, "{} ", dim_end)?;

        write!(writer, "{}{}{} ", level_color, level_str, color_end)?;

        let thread = std::thread::current();
        let thread_id = format!("{:?}", thread.id());
        if let Some(num) = thread_id
            .strip_prefix("ThreadId(")
            .and_then(|s| s.strip_suffix(")"))
            .and_then(|s| s.parse::<u64>().ok())
        {
            match thread.name() {
                Some(name) if name != "main" => write!(writer, "#{:03}/{} ", num, name)?,
                _ => write!(writer, "#{:03} ", num)?,
            }
        }

        let mut extractor = FieldExtractor::default();
        event.record(&mut extractor);

        if let Some(tag) = extractor.channel_tag() {
            write!(writer, "{}{}{}: ", dim_start, tag, dim_end)?;
            if let Some(msg) = &extractor.message {
                write!(writer, "{}", msg)?;
            }
        } else {
            if let Some(target) = self.display_target(metadata.target()) {
                if !target.is_empty() {
                    write!(writer, "{}{}{}: ", dim_start, target, dim_end)?;
                }
            }
            ctx.field_format().format_fields(writer.by_ref(), event)?;
        }

        writeln!(writer)
    }
}

/// Create a timer with custom format
///
/// Uses format: `[year]/[month]/[day] [hour]:[minute]:[second].[subsecond digits:4]`
pub fn create_custom_timer()
-> OffsetTime<&'static [time::format_description::BorrowedFormatItem<'static>]> {
    use time::macros::format_description;

    let format =
        format_description!("[year]/[month]/[day] [hour]:[minute]:[second].[subsecond digits:4]");
    let offset = time::UtcOffset::current_local_offset().unwrap_or(time::UtcOffset::UTC);
    OffsetTime::new(offset, format)
}

/// Check if dependency logging is enabled via RTC_LOGDEPS environment variable
pub fn is_dependency_logging_enabled() -> bool {
    std::env::var("RTC_LOGDEPS")
        .map(|v| v == "1")
        .unwrap_or(false)
}

/// Lowercase directive name for a level
pub fn level_name(level: Level) -> &'static str {
    match level {
        Level::TRACE => "trace",
        Level::DEBUG => "debug",
        Level::INFO => "info",
        Level::WARN => "warn",
        Level::ERROR => "error",
    }
}

/// Parse a level name as found in config files (case-insensitive)
pub fn parse_level(name: &str) -> Option<Level> {
    match name.to_ascii_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

/// Build the filter directive for dependency logging
///
/// Without dependency logging everything except the bridge crates is turned off.
pub fn build_filter_directives(level: Level, log_deps: bool) -> String {
    let level_str = level_name(level);

    if log_deps {
        return level_str.to_string();
    }

    let mut directives = String::from("off");
    for krate in OWN_CRATES {
        directives.push_str(&format!(",{}={}", krate, level_str));
    }
    directives
}

/// Detect if ANSI colors should be used based on environment
///
/// Disables ANSI colors if:
/// - stderr is not a TTY (piped/redirected)
/// - NO_COLOR env var is set (https://no-color.org/)
/// - TERM=dumb
pub fn should_use_ansi() -> bool {
    atty::is(atty::Stream::Stderr)
        && std::env::var("NO_COLOR").is_err()
        && std::env::var("TERM").map(|t| t != "dumb").unwrap_or(true)
}

/// Logging configuration
pub struct LogConfig<W: Write + Send + 'static = std::fs::File> {
    /// Prefix to strip from log targets (e.g., "rtc_host::")
    pub strip_prefix: String,
    /// Whether to use ANSI color codes (auto-detected if None)
    pub use_ansi: Option<bool>,
    /// Minimum log level
    pub level: Level,
    /// Optional file to write logs to
    pub log_file: Option<W>,
}

impl<W: Write + Send + 'static> LogConfig<W> {
    /// Create a new LogConfig with the given strip prefix
    pub fn new(strip_prefix: impl Into<String>) -> Self {
        Self {
            strip_prefix: strip_prefix.into(),
            use_ansi: None,
            level: Level::INFO,
            log_file: None,
        }
    }

    /// Set whether to use ANSI colors (default: auto-detect)
    pub fn with_ansi(mut self, use_ansi: bool) -> Self {
        self.use_ansi = Some(use_ansi);
        self
    }

    /// Set the minimum log level
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Set the log file
    pub fn with_log_file(mut self, file: W) -> Self {
        self.log_file = Some(file);
        self
    }
}

/// Initialize logging with the given configuration
///
/// `RUST_LOG` overrides the directives derived from the configured level.
pub fn init_logging<W: Write + Send + 'static>(
    config: LogConfig<W>,
) -> Result<(), Box<dyn std::error::Error>> {
    use tracing_subscriber::EnvFilter;

    let timer = create_custom_timer();
    let use_ansi = config.use_ansi.unwrap_or_else(should_use_ansi);
    let filter_directives = build_filter_directives(config.level, is_dependency_logging_enabled());

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&filter_directives));

    let formatter_stderr =
        CustomFormatter::new(timer.clone(), use_ansi).with_strip_prefix(&config.strip_prefix);
    let stderr_layer = tracing_subscriber::fmt::layer()
        .event_format(formatter_stderr)
        .with_ansi(use_ansi)
        .with_writer(std::io::stderr);

    let file_layer = config.log_file.map(|file| {
        let formatter_file =
            CustomFormatter::new(timer, false).with_strip_prefix(&config.strip_prefix);
        tracing_subscriber::fmt::layer()
            .event_format(formatter_file)
            .with_ansi(false)
            .with_writer(std::sync::Mutex::new(file))
    });

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .with(env_filter)
        .try_init()?;

    Ok(())
}

/// Initialize logging without a log file
pub fn init_logging_simple(
    strip_prefix: impl Into<String>,
    level: Level,
) -> Result<(), Box<dyn std::error::Error>> {
    let config: LogConfig<std::fs::File> = LogConfig::new(strip_prefix).with_level(level);
    init_logging(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_filter_directives_without_deps() {
        let directives = build_filter_directives(Level::DEBUG, false);
        assert!(directives.starts_with("off,"));
        assert!(directives.contains("rtc_bridge=debug"));
        assert!(directives.contains("rtc_host=debug"));
    }

    #[test]
    fn test_filter_directives_with_deps() {
        assert_eq!(build_filter_directives(Level::WARN, true), "warn");
    }

    #[test]
    fn test_parse_level() {
        assert_eq!(parse_level("DEBUG"), Some(Level::DEBUG));
        assert_eq!(parse_level("warn"), Some(Level::WARN));
        assert_eq!(parse_level("verbose"), None);
    }

    #[test]
    fn test_channel_tag_prefers_method() {
        let extractor = FieldExtractor {
            method: Some("joinChannel".into()),
            event: Some("onUserJoined".into()),
            message: None,
        };
        assert_eq!(extractor.channel_tag().as_deref(), Some("call::joinChannel"));

        let extractor = FieldExtractor {
            event: Some("onUserJoined".into()),
            ..Default::default()
        };
        assert_eq!(extractor.channel_tag().as_deref(), Some("event::onUserJoined"));
    }

    #[test]
    fn test_display_target_strips_prefix() {
        let formatter = CustomFormatter::new((), false).with_strip_prefix("rtc_host::");
        assert_eq!(formatter.display_target("rtc_host::server"), Some("server"));
        assert_eq!(formatter.display_target("rtc_host"), None);
        assert_eq!(formatter.display_target("tokio::net"), Some("tokio::net"));
    }
}
