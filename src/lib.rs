//! Supervisor core for the stagelink presentation bridge
//!
//! Owns the lifecycle of two independently-failing child processes (the local
//! web server and the outbound tunnel), periodically probes the upstream
//! presentation-control API, and reconciles everything into one status
//! snapshot pushed to a UI layer over a lossy notification channel.

pub mod config;
pub mod error;
pub mod logging;
pub mod services;
pub mod supervisor;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use config::{BridgeConfig, ConfigUpdate, LaunchSpec};
pub use error::{SupervisorError, SupervisorResult};
pub use supervisor::{Supervisor, MAX_RESTART_ATTEMPTS, STOP_GRACE_PERIOD, WEB_PROBE_DELAY};
pub use traits::{Notifier, ProbeOutcome, ProcessSpawner, Prober, SpawnedProcess, TunnelSignalParser};
pub use types::{
    HealthStatus, LogEntry, LogLevel, ProcessKind, ProcessState, StatusSnapshot, TunnelConnectivity,
    UiEvent,
};
