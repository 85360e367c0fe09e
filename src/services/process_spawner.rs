//! Real process spawner implementation
//!
//! Owns the OS child inside a driver task and exposes only channels to the
//! supervisor: an output-line stream, an exit notification, and a control
//! sender for terminate/kill requests. This keeps the `Child` handle
//! exclusively owned in one place.

use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{mpsc, watch};
use tracing::debug;

use crate::config::LaunchSpec;
use crate::error::{SupervisorError, SupervisorResult};
use crate::traits::{ProcessSpawner, SpawnedProcess};
use crate::types::{ControlSignal, ExitInfo, OutputLine, OutputStream, ProcessKind};

const OUTPUT_CHANNEL_CAPACITY: usize = 256;
const CONTROL_CHANNEL_CAPACITY: usize = 4;

pub struct RealProcessSpawner;

impl RealProcessSpawner {
    pub fn new() -> Self {
        Self
    }

    /// Forward newline-tokenized, trimmed lines from one child stream.
    fn forward_lines<R>(reader: R, stream: OutputStream, tx: mpsc::Sender<OutputLine>)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        tokio::spawn(async move {
            let mut lines = BufReader::new(reader).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                let text = line.trim().to_string();
                if text.is_empty() {
                    continue;
                }
                // A full channel means the supervisor is not keeping up;
                // dropping the line is better than blocking the child.
                if tx.try_send(OutputLine { stream, text }).is_err() {
                    break;
                }
            }
        });
    }

    /// Send the polite termination signal.
    #[cfg(unix)]
    fn terminate(child: &mut Child) {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        match child.id() {
            Some(pid) => {
                let _ = kill(Pid::from_raw(pid as i32), Signal::SIGTERM);
            }
            None => {
                let _ = child.start_kill();
            }
        }
    }

    /// Windows has no SIGTERM equivalent we can rely on; go straight to kill.
    #[cfg(not(unix))]
    fn terminate(child: &mut Child) {
        let _ = child.start_kill();
    }
}

impl Default for RealProcessSpawner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl ProcessSpawner for RealProcessSpawner {
    async fn spawn(&self, kind: ProcessKind, spec: &LaunchSpec) -> SupervisorResult<SpawnedProcess> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .envs(spec.env.iter().cloned())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| SupervisorError::spawn(kind, e))?;
        let pid = child.id();
        debug!("spawned {kind} process (pid {pid:?})");

        let (output_tx, output_rx) = mpsc::channel(OUTPUT_CHANNEL_CAPACITY);
        if let Some(stdout) = child.stdout.take() {
            Self::forward_lines(stdout, OutputStream::Stdout, output_tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            Self::forward_lines(stderr, OutputStream::Stderr, output_tx);
        }

        let (exit_tx, exit_rx) = watch::channel(None);
        let (control_tx, mut control_rx) = mpsc::channel(CONTROL_CHANNEL_CAPACITY);

        // Driver task: the only owner of the Child. Waits for exit while
        // servicing control requests.
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    status = child.wait() => {
                        let code = status.ok().and_then(|s| s.code());
                        let _ = exit_tx.send(Some(ExitInfo { code }));
                        break;
                    }
                    signal = control_rx.recv() => match signal {
                        Some(ControlSignal::Terminate) => Self::terminate(&mut child),
                        Some(ControlSignal::Kill) => {
                            let _ = child.start_kill();
                        }
                        // Supervisor discarded the handle. Kill and reap so
                        // the exit status is not leaked.
                        None => {
                            let _ = child.start_kill();
                            let code = child.wait().await.ok().and_then(|s| s.code());
                            let _ = exit_tx.send(Some(ExitInfo { code }));
                            break;
                        }
                    },
                }
            }
        });

        Ok(SpawnedProcess {
            pid,
            output: output_rx,
            exited: exit_rx,
            control: control_tx,
        })
    }
}
