//! Supervisor-specific error types

use crate::types::ProcessKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("failed to spawn {kind} process: {source}")]
    SpawnFailed {
        kind: ProcessKind,
        #[source]
        source: std::io::Error,
    },
}

impl SupervisorError {
    pub fn spawn(kind: ProcessKind, source: std::io::Error) -> Self {
        Self::SpawnFailed { kind, source }
    }
}

pub type SupervisorResult<T> = Result<T, SupervisorError>;
