//! Main supervisor implementation
//!
//! Single authority for starting, stopping, and restarting the managed
//! processes, and single source of truth for the aggregated status snapshot.
//! All side effects (spawning, killing, probing, notifying) flow through
//! here, with the actual mechanisms injected via the service traits.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::config::{BridgeConfig, ConfigUpdate};
use crate::error::SupervisorResult;
use crate::services::health_monitor::{self, ProbeTargets, HEALTH_INTERVAL};
use crate::services::log_buffer::LogBuffer;
use crate::services::tunnel_log::CloudflaredSignals;
use crate::traits::{Notifier, ProcessSpawner, Prober, TunnelSignalParser};
use crate::types::{
    ControlSignal, ExitInfo, HealthStatus, LogEntry, LogLevel, LogSource, OutputLine, OutputStream,
    ProcessKind, ProcessReport, ProcessState, StatusSnapshot, TunnelConnectivity, UiEvent,
};

/// Consecutive unexpected exits tolerated before the supervisor gives up and
/// waits for a manual start.
pub const MAX_RESTART_ATTEMPTS: u32 = 5;

/// Grace period between the polite termination signal and the kill.
pub const STOP_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Delay between spawning the web server and the first opportunistic probe.
pub const WEB_PROBE_DELAY: Duration = Duration::from_secs(2);

/// Log lines included in each status snapshot.
const SNAPSHOT_LOG_LINES: usize = 20;

/// Backoff before auto-restart attempt `attempt` (1-based), capped at 10s.
pub(crate) fn restart_delay(attempt: u32) -> Duration {
    Duration::from_millis((u64::from(attempt) * 2000).min(10_000))
}

/// Mutable bookkeeping for one managed process.
#[derive(Debug)]
struct ProcState {
    state: ProcessState,
    restart_attempts: u32,
    last_exit_code: Option<i32>,
    /// Cleared by an explicit stop so a subsequent exit never auto-restarts.
    auto_restart: bool,
    /// Bumped on every spawn and every explicit start/stop. Monitor tasks,
    /// delayed restarts, and delayed probes all carry the epoch they were
    /// scheduled under and no-op when it has moved on.
    epoch: u64,
    control: Option<mpsc::Sender<ControlSignal>>,
    exited: Option<watch::Receiver<Option<ExitInfo>>>,
    pid: Option<u32>,
}

impl ProcState {
    fn new() -> Self {
        Self {
            state: ProcessState::Stopped,
            restart_attempts: 0,
            last_exit_code: None,
            auto_restart: false,
            epoch: 0,
            control: None,
            exited: None,
            pid: None,
        }
    }

    fn discard_handle(&mut self) {
        self.control = None;
        self.exited = None;
        self.pid = None;
    }

    fn report(&self) -> ProcessReport {
        ProcessReport {
            state: self.state,
            restart_attempts: self.restart_attempts,
            last_exit_code: self.last_exit_code,
            pid: self.pid,
        }
    }
}

/// What to do after observing an unexpected exit.
enum ExitAction {
    CleanStop,
    CleanExit,
    Restart { attempt: u32, delay: Duration, epoch: u64 },
    GiveUp,
}

struct SupervisorInner<S, P, N> {
    spawner: S,
    prober: P,
    notifier: N,
    tunnel_signals: Arc<dyn TunnelSignalParser>,

    config: Mutex<BridgeConfig>,
    web: Mutex<ProcState>,
    tunnel: Mutex<ProcState>,
    health: Mutex<HealthStatus>,
    logs: Mutex<LogBuffer>,

    health_shutdown: watch::Sender<bool>,
    health_task: Mutex<Option<JoinHandle<()>>>,
}

/// The supervisor facade handed to the UI bridge and the CLI.
///
/// Cloning is cheap and shares the underlying state, which is what a UI
/// bridge wants: one instance constructed at process start, passed by
/// reference or clone, no ambient singletons.
pub struct Supervisor<S, P, N>
where
    S: ProcessSpawner + 'static,
    P: Prober + 'static,
    N: Notifier + 'static,
{
    inner: Arc<SupervisorInner<S, P, N>>,
}

impl<S, P, N> Clone for Supervisor<S, P, N>
where
    S: ProcessSpawner + 'static,
    P: Prober + 'static,
    N: Notifier + 'static,
{
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S, P, N> Supervisor<S, P, N>
where
    S: ProcessSpawner + 'static,
    P: Prober + 'static,
    N: Notifier + 'static,
{
    /// Create a supervisor with the default cloudflared tunnel parser.
    pub fn new(spawner: S, prober: P, notifier: N, config: BridgeConfig) -> Self {
        Self::with_tunnel_signals(spawner, prober, notifier, config, Arc::new(CloudflaredSignals))
    }

    pub fn with_tunnel_signals(
        spawner: S,
        prober: P,
        notifier: N,
        config: BridgeConfig,
        tunnel_signals: Arc<dyn TunnelSignalParser>,
    ) -> Self {
        let health = HealthStatus::new(config.tunnel_url.is_some());
        let (health_shutdown, _) = watch::channel(false);

        Self {
            inner: Arc::new(SupervisorInner {
                spawner,
                prober,
                notifier,
                tunnel_signals,
                config: Mutex::new(config),
                web: Mutex::new(ProcState::new()),
                tunnel: Mutex::new(ProcState::new()),
                health: Mutex::new(health),
                logs: Mutex::new(LogBuffer::new()),
                health_shutdown,
                health_task: Mutex::new(None),
            }),
        }
    }

    /// Start a managed process. A no-op while it is already starting,
    /// running, or stopping; spawn failures are reported through status and
    /// logs, never as an error return.
    pub async fn start(&self, kind: ProcessKind) -> SupervisorResult<()> {
        self.inner.start(kind).await
    }

    /// Stop a managed process, escalating to a kill after the grace period.
    /// Always resolves; never hangs on a wedged child.
    pub async fn stop(&self, kind: ProcessKind) -> SupervisorResult<()> {
        self.inner.stop(kind).await
    }

    /// Stop then start, used when configuration for that kind changed.
    pub async fn restart(&self, kind: ProcessKind) -> SupervisorResult<()> {
        self.inner.stop(kind).await?;
        self.inner.start(kind).await
    }

    /// Apply a partial configuration update, restarting whichever running
    /// processes the changed fields affect.
    pub async fn apply_config(&self, update: ConfigUpdate) -> SupervisorResult<()> {
        self.inner.apply_config(update).await
    }

    /// Current point-in-time snapshot, recomputed on demand.
    pub async fn status(&self) -> StatusSnapshot {
        self.inner.status().await
    }

    pub async fn health(&self) -> HealthStatus {
        self.inner.health.lock().await.clone()
    }

    pub async fn process_state(&self, kind: ProcessKind) -> ProcessState {
        self.inner.proc(kind).lock().await.state
    }

    /// Everything currently in the log ring buffer, oldest first.
    pub async fn logs(&self) -> Vec<LogEntry> {
        self.inner.logs.lock().await.snapshot()
    }

    pub async fn config(&self) -> BridgeConfig {
        self.inner.config.lock().await.clone()
    }

    /// Start the periodic health monitor. Idempotent and never re-entrant:
    /// a tick still probing when the next fires causes the next to be
    /// skipped, not queued.
    pub async fn start_health_monitor(&self) {
        self.inner.start_health_monitor().await;
    }

    /// Stop the health monitor, then both managed processes, awaiting both.
    /// Used at process-wide exit to guarantee no orphaned children.
    pub async fn shutdown(&self) -> SupervisorResult<()> {
        self.inner.shutdown().await
    }
}

impl<S, P, N> SupervisorInner<S, P, N>
where
    S: ProcessSpawner + 'static,
    P: Prober + 'static,
    N: Notifier + 'static,
{
    fn proc(&self, kind: ProcessKind) -> &Mutex<ProcState> {
        match kind {
            ProcessKind::WebServer => &self.web,
            ProcessKind::Tunnel => &self.tunnel,
        }
    }

    async fn start(self: &Arc<Self>, kind: ProcessKind) -> SupervisorResult<()> {
        if kind == ProcessKind::Tunnel {
            let configured = self.config.lock().await.tunnel_url.is_some();
            if !configured {
                self.log(
                    LogSource::Supervisor,
                    LogLevel::Warn,
                    "tunnel start requested but no tunnel URL is configured".to_string(),
                )
                .await;
                return Ok(());
            }
        }

        let spawn_epoch = {
            let mut proc = self.proc(kind).lock().await;
            match proc.state {
                ProcessState::Stopped | ProcessState::Crashed => {}
                state => {
                    debug!("ignoring start request for {kind} while {state}");
                    return Ok(());
                }
            }
            proc.state = ProcessState::Starting;
            proc.restart_attempts = 0;
            proc.auto_restart = true;
            // Invalidate any delayed auto-restart still in flight.
            proc.epoch += 1;
            proc.epoch
        };
        self.notify_status().await;

        self.spawn_process(kind, spawn_epoch).await;
        Ok(())
    }

    /// Spawn the process for `kind`. The caller must already have moved the
    /// state to `Starting` under `spawn_epoch`. If an explicit start or stop
    /// bumps the epoch while the spawn is in flight, the result is discarded
    /// instead of installed.
    async fn spawn_process(self: &Arc<Self>, kind: ProcessKind, spawn_epoch: u64) {
        let spec = { self.config.lock().await.launch_spec(kind) };
        let Some(spec) = spec else {
            // Configuration changed under a scheduled restart.
            {
                let mut proc = self.proc(kind).lock().await;
                if proc.epoch == spawn_epoch {
                    proc.state = ProcessState::Stopped;
                }
            }
            self.log(
                LogSource::Supervisor,
                LogLevel::Warn,
                format!("no launch configuration for {kind}; not starting"),
            )
            .await;
            self.notify_status().await;
            return;
        };

        self.log(
            LogSource::Supervisor,
            LogLevel::Info,
            format!("starting {kind} ({})", spec.program.display()),
        )
        .await;

        match self.spawner.spawn(kind, &spec).await {
            Err(e) => {
                {
                    let mut proc = self.proc(kind).lock().await;
                    if proc.epoch == spawn_epoch {
                        proc.state = ProcessState::Stopped;
                        proc.discard_handle();
                    }
                }
                self.log(
                    LogSource::Supervisor,
                    LogLevel::Error,
                    format!("failed to start {kind}: {e}"),
                )
                .await;
                self.notify_status().await;
            }
            Ok(process) => {
                let crate::traits::SpawnedProcess {
                    pid,
                    output,
                    exited,
                    control,
                } = process;

                let installed = {
                    let mut proc = self.proc(kind).lock().await;
                    if proc.epoch == spawn_epoch {
                        proc.control = Some(control);
                        proc.exited = Some(exited.clone());
                        proc.pid = pid;
                        proc.state = ProcessState::Running;
                        true
                    } else {
                        false
                    }
                };

                if !installed {
                    // An explicit stop or start won the race while the spawn
                    // was in flight. Dropping the handle makes the driver
                    // kill and reap the fresh child.
                    debug!("discarding superseded {kind} spawn");
                    return;
                }

                let monitor = Arc::clone(self);
                tokio::spawn(async move {
                    monitor.run_monitor(kind, spawn_epoch, output, exited).await;
                });

                if kind == ProcessKind::WebServer {
                    self.schedule_web_probe(spawn_epoch);
                }

                let pid_str = pid.map(|p| p.to_string()).unwrap_or_else(|| "?".to_string());
                self.log(
                    LogSource::Supervisor,
                    LogLevel::Info,
                    format!("{kind} running (pid {pid_str})"),
                )
                .await;
                self.notify_status().await;
            }
        }
    }

    /// Consume one spawned process's output and exit notification.
    async fn run_monitor(
        self: Arc<Self>,
        kind: ProcessKind,
        spawn_epoch: u64,
        mut output: mpsc::Receiver<OutputLine>,
        mut exited: watch::Receiver<Option<ExitInfo>>,
    ) {
        loop {
            tokio::select! {
                line = output.recv() => match line {
                    Some(line) => self.handle_output(kind, spawn_epoch, &line).await,
                    None => break,
                },
                changed = exited.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    let info = *exited.borrow_and_update();
                    if let Some(info) = info {
                        // Flush whatever output already arrived before the
                        // exit was observed.
                        while let Ok(line) = output.try_recv() {
                            self.handle_output(kind, spawn_epoch, &line).await;
                        }
                        self.handle_exit(kind, spawn_epoch, info).await;
                        return;
                    }
                }
            }
        }

        // Output streams closed first; wait for the exit notification. The
        // watch guard must be dropped before the await below.
        loop {
            let info = *exited.borrow_and_update();
            if let Some(info) = info {
                self.handle_exit(kind, spawn_epoch, info).await;
                return;
            }
            if exited.changed().await.is_err() {
                return;
            }
        }
    }

    async fn handle_output(self: &Arc<Self>, kind: ProcessKind, spawn_epoch: u64, line: &OutputLine) {
        if kind == ProcessKind::Tunnel && self.tunnel_signals.is_connection_registered(&line.text) {
            let fresh = self.proc(kind).lock().await.epoch == spawn_epoch;
            if fresh {
                let latched = {
                    let mut health = self.health.lock().await;
                    if health.tunnel != TunnelConnectivity::Connected {
                        health.tunnel = TunnelConnectivity::Connected;
                        true
                    } else {
                        false
                    }
                };
                if latched {
                    self.log(
                        LogSource::Supervisor,
                        LogLevel::Info,
                        "tunnel connection registered".to_string(),
                    )
                    .await;
                    self.notify_status().await;
                }
            }
        }

        let level = self.classify_line(kind, line);
        self.log(LogSource::Process(kind), level, line.text.clone()).await;
    }

    fn classify_line(&self, kind: ProcessKind, line: &OutputLine) -> LogLevel {
        match line.stream {
            OutputStream::Stdout => {
                if contains_error_marker(&line.text) {
                    LogLevel::Error
                } else {
                    LogLevel::Info
                }
            }
            OutputStream::Stderr => {
                if kind == ProcessKind::Tunnel {
                    self.tunnel_signals.classify_stderr(&line.text)
                } else if contains_error_marker(&line.text) {
                    LogLevel::Error
                } else {
                    LogLevel::Warn
                }
            }
        }
    }

    async fn handle_exit(self: &Arc<Self>, kind: ProcessKind, spawn_epoch: u64, info: ExitInfo) {
        let action = {
            let mut proc = self.proc(kind).lock().await;
            if proc.epoch != spawn_epoch {
                // An explicit start/stop superseded this spawn; its exit has
                // already been accounted for.
                return;
            }
            proc.discard_handle();
            proc.last_exit_code = info.code;

            match proc.state {
                ProcessState::Stopping => {
                    // Exit while stopping is clean regardless of code.
                    proc.state = ProcessState::Stopped;
                    ExitAction::CleanStop
                }
                ProcessState::Starting | ProcessState::Running => {
                    if info.is_clean() {
                        proc.state = ProcessState::Stopped;
                        ExitAction::CleanExit
                    } else {
                        proc.state = ProcessState::Crashed;
                        if proc.auto_restart && proc.restart_attempts < MAX_RESTART_ATTEMPTS {
                            proc.restart_attempts += 1;
                            ExitAction::Restart {
                                attempt: proc.restart_attempts,
                                delay: restart_delay(proc.restart_attempts),
                                epoch: proc.epoch,
                            }
                        } else {
                            ExitAction::GiveUp
                        }
                    }
                }
                ProcessState::Stopped | ProcessState::Crashed => return,
            }
        };

        self.clear_health_for(kind).await;

        match action {
            ExitAction::CleanStop => {
                self.log(LogSource::Supervisor, LogLevel::Info, format!("{kind} stopped"))
                    .await;
            }
            ExitAction::CleanExit => {
                self.log(
                    LogSource::Supervisor,
                    LogLevel::Info,
                    format!("{kind} exited cleanly"),
                )
                .await;
            }
            ExitAction::Restart { attempt, delay, epoch } => {
                self.log(
                    LogSource::Supervisor,
                    LogLevel::Warn,
                    format!(
                        "{kind} exited unexpectedly (code {}); restart attempt {attempt}/{MAX_RESTART_ATTEMPTS} in {}ms",
                        format_code(info.code),
                        delay.as_millis()
                    ),
                )
                .await;

                let inner = Arc::clone(self);
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    inner.try_auto_restart(kind, epoch, attempt).await;
                });
            }
            ExitAction::GiveUp => {
                self.log(
                    LogSource::Supervisor,
                    LogLevel::Error,
                    format!(
                        "{kind} crashed (code {}) after {MAX_RESTART_ATTEMPTS} restart attempts; manual start required",
                        format_code(info.code)
                    ),
                )
                .await;
            }
        }

        self.notify_status().await;
    }

    /// Fire a scheduled auto-restart unless an explicit start/stop got there
    /// first. Does not reset the attempt counter.
    async fn try_auto_restart(self: &Arc<Self>, kind: ProcessKind, epoch: u64, attempt: u32) {
        let spawn_epoch = {
            let mut proc = self.proc(kind).lock().await;
            if proc.epoch != epoch || proc.state != ProcessState::Crashed || !proc.auto_restart {
                return;
            }
            proc.state = ProcessState::Starting;
            proc.epoch += 1;
            proc.epoch
        };

        self.log(
            LogSource::Supervisor,
            LogLevel::Info,
            format!("restarting {kind} (attempt {attempt}/{MAX_RESTART_ATTEMPTS})"),
        )
        .await;
        self.notify_status().await;
        self.respawn(kind, spawn_epoch).await;
    }

    /// Boxed wrapper around `spawn_process` for the delayed-restart path.
    /// The restart task awaits this type-erased future instead of recursing
    /// through the opaque `spawn_process` type.
    fn respawn(
        self: &Arc<Self>,
        kind: ProcessKind,
        spawn_epoch: u64,
    ) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        let inner = Arc::clone(self);
        Box::pin(async move { inner.spawn_process(kind, spawn_epoch).await })
    }

    async fn stop(self: &Arc<Self>, kind: ProcessKind) -> SupervisorResult<()> {
        let (control, exited) = {
            let mut proc = self.proc(kind).lock().await;
            proc.auto_restart = false;
            // Cancels pending auto-restarts and detaches the monitor task
            // from this spawn's exit handling.
            proc.epoch += 1;
            match proc.state {
                ProcessState::Stopped => return Ok(()),
                ProcessState::Crashed => {
                    proc.state = ProcessState::Stopped;
                    return Ok(());
                }
                _ => {}
            }
            proc.state = ProcessState::Stopping;
            (proc.control.clone(), proc.exited.clone())
        };

        self.log(LogSource::Supervisor, LogLevel::Info, format!("stopping {kind}"))
            .await;
        self.notify_status().await;

        if let Some(control) = &control {
            let _ = control.send(ControlSignal::Terminate).await;
        }

        let waited = match exited {
            Some(mut rx) => tokio::time::timeout(STOP_GRACE_PERIOD, wait_for_exit(&mut rx))
                .await
                .ok(),
            None => Some(None),
        };

        match waited {
            Some(info) => {
                {
                    let mut proc = self.proc(kind).lock().await;
                    if proc.state == ProcessState::Stopping {
                        proc.state = ProcessState::Stopped;
                        proc.last_exit_code = info.and_then(|i| i.code);
                        proc.discard_handle();
                    }
                }
                self.log(LogSource::Supervisor, LogLevel::Info, format!("{kind} stopped"))
                    .await;
            }
            None => {
                // Grace period elapsed. Kill, then discard the handle without
                // waiting for OS confirmation: the supervisor must make
                // progress even against a wedged child.
                if let Some(control) = &control {
                    let _ = control.send(ControlSignal::Kill).await;
                }
                {
                    let mut proc = self.proc(kind).lock().await;
                    proc.state = ProcessState::Stopped;
                    proc.discard_handle();
                }
                self.log(
                    LogSource::Supervisor,
                    LogLevel::Warn,
                    format!(
                        "{kind} did not exit within {}s; killed and handle discarded",
                        STOP_GRACE_PERIOD.as_secs()
                    ),
                )
                .await;
            }
        }

        self.clear_health_for(kind).await;
        self.notify_status().await;
        Ok(())
    }

    async fn apply_config(self: &Arc<Self>, update: ConfigUpdate) -> SupervisorResult<()> {
        let changes = { self.config.lock().await.apply(update) };

        if changes.tunnel {
            let configured = self.config.lock().await.tunnel_url.is_some();
            let mut health = self.health.lock().await;
            health.tunnel = if configured {
                TunnelConnectivity::Disconnected
            } else {
                TunnelConnectivity::NotConfigured
            };
        }

        if changes.web_server {
            let active = matches!(
                self.web.lock().await.state,
                ProcessState::Starting | ProcessState::Running
            );
            if active {
                self.log(
                    LogSource::Supervisor,
                    LogLevel::Info,
                    "web server configuration changed; restarting".to_string(),
                )
                .await;
                self.stop(ProcessKind::WebServer).await?;
                self.start(ProcessKind::WebServer).await?;
            }
        }

        if changes.tunnel {
            let active = matches!(
                self.tunnel.lock().await.state,
                ProcessState::Starting | ProcessState::Running
            );
            if active {
                self.log(
                    LogSource::Supervisor,
                    LogLevel::Info,
                    "tunnel configuration changed; restarting".to_string(),
                )
                .await;
                // start() is a no-op when the URL was removed, so this also
                // covers "tunnel unconfigured while running".
                self.stop(ProcessKind::Tunnel).await?;
                self.start(ProcessKind::Tunnel).await?;
            }
        }

        if changes.web_server || changes.tunnel {
            self.notify_status().await;
        }
        Ok(())
    }

    /// Schedule the one-shot post-spawn probe that confirms the web server
    /// actually answers, without blocking the start call.
    fn schedule_web_probe(self: &Arc<Self>, epoch: u64) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(WEB_PROBE_DELAY).await;

            {
                let proc = inner.web.lock().await;
                if proc.epoch != epoch || proc.state != ProcessState::Running {
                    return;
                }
            }

            let url = { inner.config.lock().await.health_url() };
            let outcome = inner.prober.probe(&url).await;

            {
                let proc = inner.web.lock().await;
                if proc.epoch != epoch {
                    return;
                }
            }

            let reachable = outcome.is_reachable();
            let changed = {
                let mut health = inner.health.lock().await;
                let changed = health.web_server_running != reachable;
                health.web_server_running = reachable;
                changed
            };

            if reachable {
                inner
                    .log(
                        LogSource::Supervisor,
                        LogLevel::Info,
                        "web server is responding on /health".to_string(),
                    )
                    .await;
            }
            if changed {
                inner.notify_status().await;
            }
        });
    }

    async fn start_health_monitor(self: &Arc<Self>) {
        let mut task = self.health_task.lock().await;
        if task.is_some() {
            return;
        }
        let inner = Arc::clone(self);
        let shutdown = self.health_shutdown.subscribe();
        *task = Some(tokio::spawn(async move {
            inner.run_health_monitor(shutdown).await;
        }));
    }

    async fn run_health_monitor(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(HEALTH_INTERVAL);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        debug!("health monitor started");

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // Probes run inline, so an outstanding tick causes the
                    // next to be skipped rather than queued.
                    let targets = {
                        let config = self.config.lock().await;
                        ProbeTargets {
                            health_url: config.health_url(),
                            version_url: config.upstream_version_url(),
                        }
                    };
                    let results = health_monitor::run_probes(&self.prober, &targets).await;
                    let changed = {
                        let mut health = self.health.lock().await;
                        health_monitor::apply_results(&mut health, &results)
                    };
                    if changed {
                        self.notify_status().await;
                    }
                }
                res = shutdown.changed() => {
                    if res.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("health monitor stopped");
    }

    async fn shutdown(self: &Arc<Self>) -> SupervisorResult<()> {
        let _ = self.health_shutdown.send(true);
        if let Some(task) = self.health_task.lock().await.take() {
            let _ = task.await;
        }

        let (web, tunnel) = tokio::join!(self.stop(ProcessKind::WebServer), self.stop(ProcessKind::Tunnel));
        web?;
        tunnel?;

        self.log(
            LogSource::Supervisor,
            LogLevel::Info,
            "supervisor shut down".to_string(),
        )
        .await;
        Ok(())
    }

    /// Drop the connectivity flags owned by `kind` after its process exited.
    async fn clear_health_for(&self, kind: ProcessKind) {
        match kind {
            ProcessKind::WebServer => {
                self.health.lock().await.web_server_running = false;
            }
            ProcessKind::Tunnel => {
                let configured = self.config.lock().await.tunnel_url.is_some();
                let mut health = self.health.lock().await;
                health.tunnel = if configured {
                    TunnelConnectivity::Disconnected
                } else {
                    TunnelConnectivity::NotConfigured
                };
            }
        }
    }

    async fn status(&self) -> StatusSnapshot {
        let web_server = self.web.lock().await.report();
        let tunnel = self.tunnel.lock().await.report();
        let health = self.health.lock().await.clone();
        let recent_logs = self.logs.lock().await.recent(SNAPSHOT_LOG_LINES);

        StatusSnapshot {
            web_server,
            tunnel,
            health,
            recent_logs,
        }
    }

    async fn notify_status(&self) {
        let snapshot = self.status().await;
        self.notifier.notify(UiEvent::Status(snapshot));
    }

    /// Append to the ring buffer, emit a trace event, and push to the UI.
    async fn log(&self, source: LogSource, level: LogLevel, message: String) {
        match level {
            LogLevel::Info => info!("[{source}] {message}"),
            LogLevel::Warn => warn!("[{source}] {message}"),
            LogLevel::Error => error!("[{source}] {message}"),
        }

        let entry = LogEntry {
            time: Utc::now(),
            source,
            level,
            message,
        };
        self.logs.lock().await.push(entry.clone());
        self.notifier.notify(UiEvent::Log(entry));
    }
}

async fn wait_for_exit(rx: &mut watch::Receiver<Option<ExitInfo>>) -> Option<ExitInfo> {
    loop {
        if let Some(info) = *rx.borrow_and_update() {
            return Some(info);
        }
        if rx.changed().await.is_err() {
            // Driver gone without reporting; the process is not coming back.
            return None;
        }
    }
}

fn contains_error_marker(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    lower.contains("error") || lower.starts_with("panic")
}

fn format_code(code: Option<i32>) -> String {
    code.map(|c| c.to_string()).unwrap_or_else(|| "signal".to_string())
}
