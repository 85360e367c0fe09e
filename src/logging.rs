//! Tracing setup for the supervisor binary

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize the tracing subscriber with a crate-scoped filter.
///
/// HTTP client internals are pinned to `warn` so probe churn does not drown
/// out supervisor events at `debug`.
pub fn init_tracing(log_level: &str) {
    let filter = format!("stagelink={log_level},reqwest=warn,hyper=warn");

    fmt()
        .with_env_filter(EnvFilter::new(&filter))
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}
