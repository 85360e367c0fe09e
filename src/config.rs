//! Bridge configuration and partial-update handling
//!
//! The supervisor keeps one immutable-per-spawn view of this configuration:
//! a `LaunchSpec` is captured at start time, so editing the config never
//! affects an already-running child until it is restarted.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::types::ProcessKind;

/// Launch parameters for one child process, captured at start time.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

/// Full configuration for the bridge supervisor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BridgeConfig {
    /// Host the local web server binds to.
    pub server_host: String,
    /// Port the local web server binds to.
    pub server_port: u16,
    /// Bearer token handed to the web server; absent means unauthenticated.
    pub auth_token: Option<String>,
    /// Tunnel URL for the outbound tunnel binary. When unset the tunnel is
    /// never started and connectivity reports `NotConfigured`.
    pub tunnel_url: Option<String>,
    /// Host of the upstream presentation-control application.
    pub upstream_host: String,
    /// Port of the upstream presentation-control API.
    pub upstream_port: u16,
    /// Path to the web server executable.
    pub web_server_bin: PathBuf,
    /// Path to the tunnel executable.
    pub tunnel_bin: PathBuf,
}

impl BridgeConfig {
    /// Health endpoint of the managed web server.
    pub fn health_url(&self) -> String {
        format!("http://{}:{}/health", self.server_host, self.server_port)
    }

    /// Version endpoint of the upstream presentation API.
    pub fn upstream_version_url(&self) -> String {
        format!("http://{}:{}/version", self.upstream_host, self.upstream_port)
    }

    /// Build the launch snapshot for the given process kind.
    ///
    /// Returns `None` for `Tunnel` when no tunnel URL is configured.
    pub fn launch_spec(&self, kind: ProcessKind) -> Option<LaunchSpec> {
        match kind {
            ProcessKind::WebServer => {
                let mut env = vec![
                    ("STAGELINK_HOST".to_string(), self.server_host.clone()),
                    ("STAGELINK_PORT".to_string(), self.server_port.to_string()),
                    (
                        "STAGELINK_UPSTREAM".to_string(),
                        format!("{}:{}", self.upstream_host, self.upstream_port),
                    ),
                ];
                if let Some(token) = &self.auth_token {
                    env.push(("STAGELINK_TOKEN".to_string(), token.clone()));
                }
                Some(LaunchSpec {
                    program: self.web_server_bin.clone(),
                    args: vec![],
                    env,
                })
            }
            ProcessKind::Tunnel => {
                let url = self.tunnel_url.as_ref()?;
                Some(LaunchSpec {
                    program: self.tunnel_bin.clone(),
                    args: vec![
                        "tunnel".to_string(),
                        "--no-autoupdate".to_string(),
                        "run".to_string(),
                        "--url".to_string(),
                        url.clone(),
                    ],
                    env: vec![],
                })
            }
        }
    }

    /// Apply a partial update and report which process kinds are affected.
    ///
    /// Fields that do not influence a running process (upstream address) are
    /// stored without side effects.
    pub fn apply(&mut self, update: ConfigUpdate) -> ConfigChanges {
        let mut changes = ConfigChanges::default();

        if let Some(host) = update.server_host {
            if host != self.server_host {
                self.server_host = host;
                changes.web_server = true;
            }
        }
        if let Some(port) = update.server_port {
            if port != self.server_port {
                self.server_port = port;
                changes.web_server = true;
            }
        }
        if let Some(token) = update.auth_token {
            // Empty string clears the token.
            let token = if token.is_empty() { None } else { Some(token) };
            if token != self.auth_token {
                self.auth_token = token;
                changes.web_server = true;
            }
        }
        if let Some(url) = update.tunnel_url {
            let url = if url.is_empty() { None } else { Some(url) };
            if url != self.tunnel_url {
                self.tunnel_url = url;
                changes.tunnel = true;
            }
        }
        if let Some(host) = update.upstream_host {
            self.upstream_host = host;
        }
        if let Some(port) = update.upstream_port {
            self.upstream_port = port;
        }

        changes
    }
}

/// Partial configuration update, typically deserialized from a settings UI.
///
/// `Some("")` on `auth_token` or `tunnel_url` clears the stored value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConfigUpdate {
    pub server_host: Option<String>,
    pub server_port: Option<u16>,
    pub auth_token: Option<String>,
    pub tunnel_url: Option<String>,
    pub upstream_host: Option<String>,
    pub upstream_port: Option<u16>,
}

/// Which process kinds an applied update invalidated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigChanges {
    pub web_server: bool,
    pub tunnel: bool,
}
