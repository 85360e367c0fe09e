//! Test helpers for supervisor integration tests
//!
//! Provides a scripted process spawner (channel plumbing instead of OS
//! processes), a recording notifier, and a table-driven prober so the full
//! supervisor state machine can be exercised deterministically under
//! `tokio::time::pause`.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use stagelink::config::{BridgeConfig, LaunchSpec};
use stagelink::error::{SupervisorError, SupervisorResult};
use stagelink::traits::{Notifier, ProbeOutcome, ProcessSpawner, Prober, SpawnedProcess};
use stagelink::types::{ControlSignal, ExitInfo, OutputLine, OutputStream, ProcessKind, UiEvent};
use stagelink::Supervisor;

/// Test-side handle to one process produced by the scripted spawner.
pub struct FakeProcess {
    pub kind: ProcessKind,
    pub spec: LaunchSpec,
    output: Option<mpsc::Sender<OutputLine>>,
    exit: watch::Sender<Option<ExitInfo>>,
    pub control: mpsc::Receiver<ControlSignal>,
}

impl FakeProcess {
    /// Report process exit with the given code (`None` = signal death).
    pub fn exit(&self, code: Option<i32>) {
        let _ = self.exit.send(Some(ExitInfo { code }));
    }

    /// Emit one line of child output.
    pub async fn emit(&self, stream: OutputStream, text: &str) {
        if let Some(output) = &self.output {
            let _ = output
                .send(OutputLine {
                    stream,
                    text: text.to_string(),
                })
                .await;
        }
    }

    /// Close the output stream without exiting, like a child that closed its
    /// pipes early.
    pub fn close_output(&mut self) {
        self.output = None;
    }

    pub async fn expect_signal(&mut self) -> ControlSignal {
        self.control.recv().await.expect("control channel closed")
    }
}

/// Answer any control signal by exiting, like a well-behaved child.
pub fn respond_graceful(mut process: FakeProcess) {
    tokio::spawn(async move {
        if process.control.recv().await.is_some() {
            process.exit(None);
        }
        // Keep the handle alive so the exit value stays observable.
        std::future::pending::<()>().await;
    });
}

pub struct FakeSpawner {
    handles: mpsc::UnboundedSender<FakeProcess>,
    spawn_count: Arc<AtomicUsize>,
    fail_spawn: Arc<AtomicBool>,
    delay_ms: Arc<AtomicU64>,
}

/// Test-side view of the scripted spawner.
pub struct SpawnerHandle {
    pub processes: mpsc::UnboundedReceiver<FakeProcess>,
    pub spawn_count: Arc<AtomicUsize>,
    pub fail_spawn: Arc<AtomicBool>,
    delay_ms: Arc<AtomicU64>,
}

impl SpawnerHandle {
    pub async fn next_process(&mut self) -> FakeProcess {
        self.processes.recv().await.expect("spawner dropped")
    }

    pub fn spawns(&self) -> usize {
        self.spawn_count.load(Ordering::SeqCst)
    }

    /// Make every subsequent spawn take this long, like a slow OS.
    pub fn set_spawn_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }
}

pub fn scripted_spawner() -> (FakeSpawner, SpawnerHandle) {
    let (handles_tx, handles_rx) = mpsc::unbounded_channel();
    let spawn_count = Arc::new(AtomicUsize::new(0));
    let fail_spawn = Arc::new(AtomicBool::new(false));
    let delay_ms = Arc::new(AtomicU64::new(0));

    (
        FakeSpawner {
            handles: handles_tx,
            spawn_count: Arc::clone(&spawn_count),
            fail_spawn: Arc::clone(&fail_spawn),
            delay_ms: Arc::clone(&delay_ms),
        },
        SpawnerHandle {
            processes: handles_rx,
            spawn_count,
            fail_spawn,
            delay_ms,
        },
    )
}

#[async_trait::async_trait]
impl ProcessSpawner for FakeSpawner {
    async fn spawn(&self, kind: ProcessKind, spec: &LaunchSpec) -> SupervisorResult<SpawnedProcess> {
        if self.fail_spawn.load(Ordering::SeqCst) {
            return Err(SupervisorError::spawn(
                kind,
                std::io::Error::new(std::io::ErrorKind::NotFound, "no such file or directory"),
            ));
        }

        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }

        self.spawn_count.fetch_add(1, Ordering::SeqCst);

        let (output_tx, output_rx) = mpsc::channel(64);
        let (exit_tx, exit_rx) = watch::channel(None);
        let (control_tx, control_rx) = mpsc::channel(4);

        let _ = self.handles.send(FakeProcess {
            kind,
            spec: spec.clone(),
            output: Some(output_tx),
            exit: exit_tx,
            control: control_rx,
        });

        Ok(SpawnedProcess {
            pid: Some(4242),
            output: output_rx,
            exited: exit_rx,
            control: control_tx,
        })
    }
}

/// Notifier that records every pushed event.
#[derive(Clone, Default)]
pub struct RecordingNotifier {
    events: Arc<Mutex<Vec<UiEvent>>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<UiEvent> {
        self.events.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, event: UiEvent) {
        self.events.lock().unwrap().push(event);
    }
}

/// Prober answering from a URL table; unknown URLs are unreachable.
#[derive(Clone, Default)]
pub struct TableProber {
    outcomes: Arc<Mutex<HashMap<String, ProbeOutcome>>>,
}

impl TableProber {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, url: &str, outcome: ProbeOutcome) {
        self.outcomes.lock().unwrap().insert(url.to_string(), outcome);
    }

    pub fn clear(&self, url: &str) {
        self.outcomes.lock().unwrap().remove(url);
    }
}

#[async_trait::async_trait]
impl Prober for TableProber {
    async fn probe(&self, url: &str) -> ProbeOutcome {
        self.outcomes
            .lock()
            .unwrap()
            .get(url)
            .cloned()
            .unwrap_or(ProbeOutcome::Unreachable)
    }
}

pub fn test_config(tunnel_url: Option<&str>) -> BridgeConfig {
    BridgeConfig {
        server_host: "127.0.0.1".to_string(),
        server_port: 8080,
        auth_token: None,
        tunnel_url: tunnel_url.map(String::from),
        upstream_host: "127.0.0.1".to_string(),
        upstream_port: 1025,
        web_server_bin: PathBuf::from("/opt/stagelink/stagelink-web"),
        tunnel_bin: PathBuf::from("/opt/stagelink/cloudflared"),
    }
}

pub type TestSupervisor = Supervisor<FakeSpawner, TableProber, RecordingNotifier>;

/// Fully-wired test supervisor plus handles to its scripted services.
pub struct TestRig {
    pub supervisor: TestSupervisor,
    pub spawner: SpawnerHandle,
    pub prober: TableProber,
    pub notifier: RecordingNotifier,
}

pub fn test_rig(tunnel_url: Option<&str>) -> TestRig {
    let (spawner, handle) = scripted_spawner();
    let prober = TableProber::new();
    let notifier = RecordingNotifier::new();
    let supervisor = Supervisor::new(
        spawner,
        prober.clone(),
        notifier.clone(),
        test_config(tunnel_url),
    );

    TestRig {
        supervisor,
        spawner: handle,
        prober,
        notifier,
    }
}

/// Let spawned supervisor tasks run without advancing past pending timers.
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}
