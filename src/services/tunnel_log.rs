//! Tunnel binary log interpretation
//!
//! The tunnel process exposes no health endpoint; the only connectivity
//! signal is its own log output. The substrings below are a versioned
//! contract with cloudflared's log format and are expected to break on major
//! upgrades of the binary, which is why they live in one place behind the
//! `TunnelSignalParser` trait.

use crate::traits::TunnelSignalParser;
use crate::types::LogLevel;

/// Lines containing any of these mark a registered tunnel connection.
const CONNECTION_REGISTERED_MARKERS: &[&str] =
    &["Registered tunnel connection", "Connection registered"];

/// cloudflared routes informational logging to stderr; these prefixes mark
/// lines that are not warnings despite the stream they arrive on.
const BENIGN_STDERR_MARKERS: &[&str] = &[
    "INF ",
    "Starting tunnel",
    "Version ",
    "GOOS:",
    "Settings:",
    "Environment saved",
    "cloudflared will not automatically update",
];

const ERROR_MARKERS: &[&str] = &["ERR ", "error", "failed to"];

/// Default parser for cloudflared-style output.
pub struct CloudflaredSignals;

impl TunnelSignalParser for CloudflaredSignals {
    fn is_connection_registered(&self, line: &str) -> bool {
        CONNECTION_REGISTERED_MARKERS
            .iter()
            .any(|marker| line.contains(marker))
    }

    fn classify_stderr(&self, line: &str) -> LogLevel {
        if ERROR_MARKERS.iter().any(|marker| line.contains(marker)) {
            return LogLevel::Error;
        }
        if BENIGN_STDERR_MARKERS.iter().any(|marker| line.contains(marker)) {
            return LogLevel::Info;
        }
        LogLevel::Warn
    }
}
