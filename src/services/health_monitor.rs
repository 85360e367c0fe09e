//! Periodic health probing
//!
//! The supervisor drives a 5-second tick; each tick issues the two probes
//! concurrently via `run_probes` and folds the outcomes into `HealthStatus`
//! via `apply_results`. The two probes are fully independent: one failing
//! never blocks or invalidates the other, and results overwrite the
//! corresponding fields unconditionally (last-probe-wins, no hysteresis).

use std::time::Duration;

use crate::traits::{ProbeOutcome, Prober};
use crate::types::HealthStatus;

/// Interval between health monitor ticks.
pub const HEALTH_INTERVAL: Duration = Duration::from_secs(5);

/// URLs probed on every tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeTargets {
    pub health_url: String,
    pub version_url: String,
}

/// Outcomes of one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResults {
    pub web: ProbeOutcome,
    pub upstream: ProbeOutcome,
}

/// Issue both probes concurrently.
pub async fn run_probes<P: Prober + ?Sized>(prober: &P, targets: &ProbeTargets) -> ProbeResults {
    let (web, upstream) = tokio::join!(
        prober.probe(&targets.health_url),
        prober.probe(&targets.version_url),
    );
    ProbeResults { web, upstream }
}

/// Fold probe results into the health status. Returns true when anything
/// changed, so the caller knows whether to push a status notification.
///
/// Tunnel connectivity is deliberately untouched here: it is inferred from
/// the tunnel process's log output, not from probes.
pub fn apply_results(health: &mut HealthStatus, results: &ProbeResults) -> bool {
    let before = health.clone();

    health.web_server_running = results.web.is_reachable();

    match &results.upstream {
        ProbeOutcome::Reachable { version } => {
            health.upstream_connected = true;
            health.upstream_version = version.clone();
        }
        ProbeOutcome::Unreachable => {
            health.upstream_connected = false;
            health.upstream_version = None;
        }
    }

    *health != before
}
