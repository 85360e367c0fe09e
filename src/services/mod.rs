//! Service implementations for the supervisor
//!
//! Real implementations of the injected traits plus the leaf components they
//! rely on. Tests substitute mocks or scripted fakes for the traits.

pub mod health_monitor;
pub mod log_buffer;
pub mod notifier;
pub mod probe;
pub mod process_spawner;
pub mod tunnel_log;

pub use health_monitor::{ProbeResults, ProbeTargets, HEALTH_INTERVAL};
pub use log_buffer::{LogBuffer, LOG_CAPACITY};
pub use notifier::BroadcastNotifier;
pub use probe::{HttpProber, PROBE_TIMEOUT};
pub use process_spawner::RealProcessSpawner;
pub use tunnel_log::CloudflaredSignals;
