//! HTTP health probe implementation
//!
//! A probe is a single timeout-bounded GET. Anything other than a 2xx inside
//! the timeout is `Unreachable`; a malformed JSON body on a 2xx still counts
//! as reachable, just without version metadata.

use std::time::Duration;

use crate::traits::{ProbeOutcome, Prober};

/// Per-request timeout for both local and upstream probes.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Real prober backed by a shared reqwest client.
pub struct HttpProber {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpProber {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout: PROBE_TIMEOUT,
        }
    }

    /// Override the request timeout (fluent API)
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for HttpProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Prober for HttpProber {
    async fn probe(&self, url: &str) -> ProbeOutcome {
        let response = match self.client.get(url).timeout(self.timeout).send().await {
            Ok(response) => response,
            Err(_) => return ProbeOutcome::Unreachable,
        };

        if !response.status().is_success() {
            return ProbeOutcome::Unreachable;
        }

        // Version metadata is optional; the upstream /version endpoint
        // returns a JSON object with a human-readable "name" field.
        let version = response
            .json::<serde_json::Value>()
            .await
            .ok()
            .and_then(|body| body.get("name").and_then(|v| v.as_str()).map(String::from));

        ProbeOutcome::Reachable { version }
    }
}
