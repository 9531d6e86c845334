//! Logging setup and PDU trace helpers.
//!
//! Logging goes through the `tracing` crate. Binaries and tests install a
//! `tracing-subscriber` formatter once; library code only emits events.

use std::fmt;

use tracing::Level;
use tracing_subscriber::{fmt::format::FmtSpan, EnvFilter};

/// Log level configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    /// Trace level - per-IE codec steps
    Trace,
    /// Debug level - message traces
    Debug,
    /// Info level (default) - procedure lifecycle
    #[default]
    Info,
    /// Warn level
    Warn,
    /// Error level
    Error,
}

impl From<LogLevel> for Level {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Trace => Level::TRACE,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Info => Level::INFO,
            LogLevel::Warn => Level::WARN,
            LogLevel::Error => Level::ERROR,
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Trace => write!(f, "trace"),
            LogLevel::Debug => write!(f, "debug"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Warn => write!(f, "warn"),
            LogLevel::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(LogLevel::Trace),
            "debug" => Ok(LogLevel::Debug),
            "info" => Ok(LogLevel::Info),
            "warn" | "warning" => Ok(LogLevel::Warn),
            "error" => Ok(LogLevel::Error),
            _ => Err(format!("unknown log level: {s}")),
        }
    }
}

/// Installs a global formatter at the given level.
///
/// `RUST_LOG` takes precedence when set. Returns false if a global
/// subscriber was already installed.
///
/// # Example
///
/// ```
/// use pscore_common::logging::{init_logging, LogLevel};
///
/// init_logging(LogLevel::Debug);
/// ```
pub fn init_logging(level: LogLevel) -> bool {
    init_logging_with_filter(&level.to_string())
}

/// Installs a global formatter with a directive string such as
/// `"info,pscore_l3=trace"`.
pub fn init_logging_with_filter(filter: &str) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_span_events(FmtSpan::NONE)
        .try_init()
        .is_ok()
}

/// Link direction of a layer-3 message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Terminal to network
    Uplink,
    /// Network to terminal
    Downlink,
}

impl Direction {
    /// Returns the opposite direction.
    pub fn reverse(self) -> Self {
        match self {
            Direction::Uplink => Direction::Downlink,
            Direction::Downlink => Direction::Uplink,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Uplink => write!(f, "UL"),
            Direction::Downlink => write!(f, "DL"),
        }
    }
}

/// Logs an encoded layer-3 PDU at debug level, with the payload at trace level.
///
/// # Arguments
///
/// * `session` - Session the PDU belongs to
/// * `direction` - Link direction
/// * `msg_type` - Message name
/// * `data` - Encoded octets
pub fn log_l3_message(session: impl fmt::Display, direction: Direction, msg_type: &str, data: &[u8]) {
    tracing::debug!(
        session = %session,
        direction = %direction,
        msg_type = msg_type,
        len = data.len(),
        "{} {}",
        direction,
        msg_type
    );
    tracing::trace!(hex = %HexDump(data), "{} payload", msg_type);
}

/// Wrapper for hex formatting in log fields
pub struct HexDump<'a>(pub &'a [u8]);

impl fmt::Display for HexDump<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Formats bytes as a compact hex string with optional grouping.
///
/// # Example
///
/// ```
/// use pscore_common::logging::format_hex_compact;
///
/// let data = [0x08, 0x01, 0x02, 0x03];
/// assert_eq!(format_hex_compact(&data, 0), "08010203");
/// assert_eq!(format_hex_compact(&data, 2), "0801 0203");
/// ```
pub fn format_hex_compact(data: &[u8], group_size: usize) -> String {
    if group_size == 0 {
        return hex::encode(data);
    }

    data.chunks(group_size)
        .map(hex::encode)
        .collect::<Vec<_>>()
        .join(" ")
}
