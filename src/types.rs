//! Core status model shared between the supervisor and its UI consumers
//!
//! Everything here is serde-serializable so a UI bridge (tray menu, settings
//! window, websocket) can ship snapshots and log entries as JSON without any
//! translation layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which external binary a managed process wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessKind {
    WebServer,
    Tunnel,
}

impl fmt::Display for ProcessKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessKind::WebServer => write!(f, "web-server"),
            ProcessKind::Tunnel => write!(f, "tunnel"),
        }
    }
}

/// Lifecycle state of a managed process.
///
/// `Crashed` means the process exited unexpectedly with a non-zero code while
/// it was supposed to be running. A crashed process may still be waiting on an
/// automatic restart; once the restart budget is exhausted it stays `Crashed`
/// until an explicit start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    Stopped,
    Starting,
    Running,
    Stopping,
    Crashed,
}

impl fmt::Display for ProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProcessState::Stopped => "stopped",
            ProcessState::Starting => "starting",
            ProcessState::Running => "running",
            ProcessState::Stopping => "stopping",
            ProcessState::Crashed => "crashed",
        };
        write!(f, "{s}")
    }
}

/// Severity of a captured log line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

/// Origin of a log line: the supervisor itself or one of its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogSource {
    Supervisor,
    Process(ProcessKind),
}

impl fmt::Display for LogSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogSource::Supervisor => write!(f, "supervisor"),
            LogSource::Process(kind) => write!(f, "{kind}"),
        }
    }
}

/// One timestamped, leveled log line. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub time: DateTime<Utc>,
    pub source: LogSource,
    pub level: LogLevel,
    pub message: String,
}

/// Tunnel connectivity as inferred from the tunnel binary's own log output.
///
/// `NotConfigured` is reported when no tunnel URL is set and is deliberately
/// distinct from `Disconnected` so the UI can hide the indicator entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TunnelConnectivity {
    NotConfigured,
    Disconnected,
    Connected,
}

/// Connectivity flags maintained by the health monitor and by tunnel log
/// parsing. All fields are last-observation-wins with no smoothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthStatus {
    /// True only after a successful probe of the local `/health` endpoint,
    /// never merely because the process spawned.
    pub web_server_running: bool,
    pub tunnel: TunnelConnectivity,
    pub upstream_connected: bool,
    /// Display name reported by the upstream `/version` endpoint; cleared on
    /// any probe failure.
    pub upstream_version: Option<String>,
}

impl HealthStatus {
    pub fn new(tunnel_configured: bool) -> Self {
        Self {
            web_server_running: false,
            tunnel: if tunnel_configured {
                TunnelConnectivity::Disconnected
            } else {
                TunnelConnectivity::NotConfigured
            },
            upstream_connected: false,
            upstream_version: None,
        }
    }
}

/// Per-process slice of a status snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessReport {
    pub state: ProcessState,
    pub restart_attempts: u32,
    pub last_exit_code: Option<i32>,
    pub pid: Option<u32>,
}

/// Point-in-time aggregation of everything the supervisor tracks.
///
/// Always recomputed on demand, never cached across notification cycles.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub web_server: ProcessReport,
    pub tunnel: ProcessReport,
    pub health: HealthStatus,
    pub recent_logs: Vec<LogEntry>,
}

/// Event pushed to the UI layer over the notification channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum UiEvent {
    Status(StatusSnapshot),
    Log(LogEntry),
}

/// Which standard stream a captured output line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// One newline-tokenized, trimmed line of child process output.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputLine {
    pub stream: OutputStream,
    pub text: String,
}

/// Exit observation for a child process. `code` is `None` when the process
/// was terminated by a signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitInfo {
    pub code: Option<i32>,
}

impl ExitInfo {
    /// An exit counts as clean only for an explicit zero code. Signal deaths
    /// and non-zero codes are crashes unless we asked the process to stop.
    pub fn is_clean(&self) -> bool {
        self.code == Some(0)
    }
}

/// Control request sent to a spawned process driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlSignal {
    /// Polite termination request (SIGTERM on unix).
    Terminate,
    /// Unconditional kill.
    Kill,
}
