use std::{path::PathBuf, str::FromStr, sync::Arc};

use thymelab_process::{ExitOutcome, HealthStatus, ProcessHandle, ProcessState};
use tokio::{
    io::{AsyncWrite, AsyncWriteExt},
    sync::{mpsc, watch},
};
use tokio_util::sync::CancellationToken;

use crate::actuator::{ActuatorClient, RuntimeInfo};
use crate::error::CommandParseError;
use crate::health::{HealthPoller, PollPolicy, ReadinessListener};
use crate::log_buffer::LogStreamBuffer;
use crate::logging::LevelHandle;
use crate::settings::{self, Settings};
use crate::supervisor::{LineSink, ProcessListener, ProcessSupervisor};
use crate::transcript::Transcript;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Start,
    Stop,
    Restart,
    Status,
    Level(String),
    Buffer(usize),
    Clear,
    Info,
    Quit,
}

impl FromStr for ConsoleCommand {
    type Err = CommandParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let head = parts.next().unwrap_or_default().to_ascii_lowercase();
        let arg = parts.next();
        if parts.next().is_some() {
            return Err(CommandParseError::Unknown(s.trim().to_string()));
        }

        match (head.as_str(), arg) {
            ("start", None) => Ok(ConsoleCommand::Start),
            ("stop", None) => Ok(ConsoleCommand::Stop),
            ("restart", None) => Ok(ConsoleCommand::Restart),
            ("status", None) => Ok(ConsoleCommand::Status),
            ("clear", None) => Ok(ConsoleCommand::Clear),
            ("info", None) => Ok(ConsoleCommand::Info),
            ("quit" | "exit", None) => Ok(ConsoleCommand::Quit),
            ("level", Some(level)) => settings::normalize_log_level(level)
                .map(|l| ConsoleCommand::Level(l.to_string()))
                .ok_or(CommandParseError::Level),
            ("level", None) => Err(CommandParseError::Level),
            ("buffer", Some(n)) => n
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .map(ConsoleCommand::Buffer)
                .ok_or(CommandParseError::Buffer),
            ("buffer", None) => Err(CommandParseError::Buffer),
            _ => Err(CommandParseError::Unknown(s.trim().to_string())),
        }
    }
}

/// Everything the console task reacts to. Background tasks only ever post
/// these; they never touch console state directly.
#[derive(Debug)]
pub enum UiEvent {
    Output(String),
    Started(ProcessHandle),
    Exited(ExitOutcome),
    Readiness { cycle: u64, status: HealthStatus },
    StopFinished { performed: bool },
    RuntimeInfo(RuntimeInfo),
    Command(ConsoleCommand),
    Notice(String),
}

/// Posts onto the console's queue from any task.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<UiEvent>,
}

impl EventSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<UiEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn post(&self, event: UiEvent) {
        // Closed only after the console has gone away.
        let _ = self.tx.send(event);
    }
}

impl LineSink for EventSink {
    fn accept(&self, chunk: String) {
        self.post(UiEvent::Output(chunk));
    }
}

impl ProcessListener for EventSink {
    fn on_started(&self, handle: &ProcessHandle) {
        self.post(UiEvent::Started(handle.clone()));
    }

    fn on_exit(&self, outcome: ExitOutcome) {
        self.post(UiEvent::Exited(outcome));
    }
}

/// Tags readiness with the cycle that produced it.
struct CycleReadiness {
    sink: EventSink,
    cycle: u64,
}

impl ReadinessListener for CycleReadiness {
    fn on_readiness(&self, status: HealthStatus) {
        self.sink.post(UiEvent::Readiness {
            cycle: self.cycle,
            status,
        });
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Indicator {
    #[default]
    Hidden,
    /// Started, waiting for the first healthy answer.
    Pending,
    Ready,
    Failed,
}

/// Enablement of the controls that depend on the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlState {
    pub start_enabled: bool,
    pub stop_enabled: bool,
    pub log_controls_enabled: bool,
    pub indicator: Indicator,
    pub server_url: Option<String>,
}

impl Default for ControlState {
    fn default() -> Self {
        Self {
            start_enabled: true,
            stop_enabled: false,
            log_controls_enabled: false,
            indicator: Indicator::Hidden,
            server_url: None,
        }
    }
}

impl ControlState {
    pub fn on_started(&mut self) {
        self.start_enabled = false;
        self.stop_enabled = true;
        self.log_controls_enabled = false;
        self.indicator = Indicator::Pending;
        self.server_url = None;
    }

    pub fn on_readiness(&mut self, status: HealthStatus, url: String) {
        match status {
            HealthStatus::Ready => {
                self.log_controls_enabled = true;
                self.indicator = Indicator::Ready;
                self.server_url = Some(url);
            }
            HealthStatus::Unreachable => {
                self.log_controls_enabled = false;
                self.indicator = Indicator::Failed;
                self.server_url = None;
            }
            HealthStatus::Unknown | HealthStatus::Checking => {}
        }
    }

    pub fn on_stop_requested(&mut self) {
        self.stop_enabled = false;
        self.log_controls_enabled = false;
        self.server_url = None;
    }

    pub fn on_exit(&mut self) {
        *self = Self::default();
    }
}

struct HealthCycle {
    id: u64,
    cancel: CancellationToken,
}

#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

fn or_na<T: std::fmt::Display>(v: Option<T>) -> String {
    v.map(|v| v.to_string()).unwrap_or_else(|| "n/a".to_string())
}

fn format_info(info: &RuntimeInfo) -> String {
    format!(
        "status={} memory_mb={} cpu_percent={} live_threads={}",
        or_na(info.status.as_deref()),
        or_na(info.memory_used_mb.map(|v| format!("{v:.1}"))),
        or_na(info.cpu_usage_percent.map(|v| format!("{v:.1}"))),
        or_na(info.live_threads),
    )
}

/// The single consumer of [`UiEvent`]s. Owns the log buffer and the control
/// state; writes rendered output and notices to `out`.
pub struct Console<W> {
    supervisor: ProcessSupervisor,
    sink: EventSink,
    events: mpsc::UnboundedReceiver<UiEvent>,
    settings: watch::Sender<Settings>,
    settings_path: Option<PathBuf>,
    level: Option<LevelHandle>,
    transcript: Option<Transcript>,
    poll_policy: PollPolicy,
    buffer: LogStreamBuffer,
    controls: ControlState,
    health: Option<HealthCycle>,
    health_status: Option<watch::Receiver<HealthStatus>>,
    next_cycle: u64,
    actuator: Option<ActuatorClient>,
    last_exit: Option<ExitOutcome>,
    restart_pending: bool,
    cursor: u64,
    out: W,
}

impl<W: AsyncWrite + Unpin> Console<W> {
    pub fn new(
        supervisor: ProcessSupervisor,
        sink: EventSink,
        events: mpsc::UnboundedReceiver<UiEvent>,
        settings: watch::Sender<Settings>,
        out: W,
    ) -> Self {
        let buffer = LogStreamBuffer::new(settings.borrow().log_buffer_size());
        Self {
            supervisor,
            sink,
            events,
            settings,
            settings_path: None,
            level: None,
            transcript: None,
            poll_policy: PollPolicy::default(),
            buffer,
            controls: ControlState::default(),
            health: None,
            health_status: None,
            next_cycle: 0,
            actuator: None,
            last_exit: None,
            restart_pending: false,
            cursor: 0,
            out,
        }
    }

    /// Persist setting changes made from the console to this file.
    pub fn with_settings_path(mut self, path: PathBuf) -> Self {
        self.settings_path = Some(path);
        self
    }

    pub fn with_level_handle(mut self, handle: LevelHandle) -> Self {
        self.level = Some(handle);
        self
    }

    pub fn with_transcript(mut self, transcript: Transcript) -> Self {
        self.transcript = Some(transcript);
        self
    }

    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.poll_policy = policy;
        self
    }

    pub fn controls(&self) -> &ControlState {
        &self.controls
    }

    pub fn buffer(&self) -> &LogStreamBuffer {
        &self.buffer
    }

    pub async fn run(mut self, shutdown: CancellationToken) {
        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => break,
                event = self.events.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };
            if self.handle(event).await == Flow::Quit {
                break;
            }
        }
        self.cancel_health();
        let _ = self.out.flush().await;
    }

    async fn handle(&mut self, event: UiEvent) -> Flow {
        match event {
            UiEvent::Output(chunk) => {
                if let Some(t) = &self.transcript {
                    t.record(&chunk);
                }
                self.buffer.append(&chunk);
                self.render_new_lines().await;
            }
            UiEvent::Started(handle) => {
                self.controls.on_started();
                let pid = or_na(handle.pid);
                self.notice(&format!("server process started (pid {pid})"))
                    .await;
                self.begin_health_cycle().await;
            }
            UiEvent::Exited(outcome) => {
                self.cancel_health();
                self.actuator = None;
                self.health_status = None;
                self.controls.on_exit();
                tracing::debug!(?outcome, "console observed exit");
                self.last_exit = Some(outcome);
                if std::mem::take(&mut self.restart_pending) {
                    self.start().await;
                }
            }
            UiEvent::Readiness { cycle, status } => {
                if self.health.as_ref().map(|h| h.id) != Some(cycle) {
                    tracing::debug!(cycle, ?status, "ignoring readiness from a finished cycle");
                    return Flow::Continue;
                }
                self.health = None;
                let url = self.settings.borrow().server_url();
                self.controls.on_readiness(status, url.clone());
                match status {
                    HealthStatus::Ready => self.notice(&format!("server is ready: {url}")).await,
                    HealthStatus::Unreachable => {
                        self.notice("server did not become ready; log level controls stay disabled")
                            .await
                    }
                    HealthStatus::Unknown | HealthStatus::Checking => {}
                }
            }
            UiEvent::StopFinished { performed } => {
                if !performed {
                    self.notice("server is not running").await;
                }
            }
            UiEvent::RuntimeInfo(info) => {
                self.notice(&format_info(&info)).await;
            }
            UiEvent::Command(cmd) => return self.execute(cmd).await,
            UiEvent::Notice(text) => self.notice(&text).await,
        }
        Flow::Continue
    }

    async fn execute(&mut self, cmd: ConsoleCommand) -> Flow {
        tracing::debug!(?cmd, "console command");
        match cmd {
            ConsoleCommand::Start => {
                if self.supervisor.state().is_active() {
                    self.notice("server is already running").await;
                } else {
                    self.start().await;
                }
            }
            ConsoleCommand::Stop => self.request_stop(),
            ConsoleCommand::Restart => match self.supervisor.state() {
                ProcessState::Running => {
                    self.restart_pending = true;
                    self.request_stop();
                }
                // A stop is already under way; start again once it exits.
                ProcessState::Stopping => self.restart_pending = true,
                ProcessState::Starting => {}
                ProcessState::Idle | ProcessState::Stopped | ProcessState::Crashed => {
                    self.start().await
                }
            },
            ConsoleCommand::Status => {
                let line = self.status_line();
                self.notice(&line).await;
            }
            ConsoleCommand::Level(level) => self.change_level(level).await,
            ConsoleCommand::Buffer(n) => {
                self.buffer.set_max_lines(n);
                self.update_setting(settings::KEY_LOG_BUFFER_SIZE, n.to_string());
                self.notice(&format!("log buffer holds {n} lines")).await;
            }
            ConsoleCommand::Clear => {
                self.buffer.clear();
            }
            ConsoleCommand::Info => self.request_info().await,
            ConsoleCommand::Quit => return Flow::Quit,
        }
        Flow::Continue
    }

    async fn start(&mut self) {
        if self.supervisor.start().await.is_none() {
            tracing::debug!(state = ?self.supervisor.state(), "start produced no process");
        }
    }

    fn request_stop(&mut self) {
        self.cancel_health();
        self.controls.on_stop_requested();

        // `stop()` can take seconds; keep the console responsive meanwhile.
        let supervisor = self.supervisor.clone();
        let sink = self.sink.clone();
        self.supervisor.spawn_task(async move {
            let performed = supervisor.stop().await;
            sink.post(UiEvent::StopFinished { performed });
        });
    }

    async fn begin_health_cycle(&mut self) {
        self.cancel_health();

        let url = self.settings.borrow().server_url();
        let client = match ActuatorClient::new(url) {
            Ok(client) => client,
            Err(err) => {
                tracing::error!(error = %err, "cannot poll worker health");
                self.controls
                    .on_readiness(HealthStatus::Unreachable, String::new());
                self.notice(&err.to_string()).await;
                return;
            }
        };

        self.next_cycle += 1;
        let cycle = self.next_cycle;
        let cancel = self.supervisor.child_token();
        let listener = Arc::new(CycleReadiness {
            sink: self.sink.clone(),
            cycle,
        });
        let poller = HealthPoller::new(client.clone(), self.poll_policy, listener);

        self.health_status = Some(poller.subscribe());
        self.actuator = Some(client);
        self.health = Some(HealthCycle {
            id: cycle,
            cancel: cancel.clone(),
        });
        self.supervisor.spawn_task(async move {
            let outcome = poller.poll_until_ready(&cancel).await;
            tracing::debug!(cycle, ?outcome, "health cycle finished");
        });
    }

    fn cancel_health(&mut self) {
        if let Some(cycle) = self.health.take() {
            cycle.cancel.cancel();
        }
    }

    async fn change_level(&mut self, level: String) {
        if !self.controls.log_controls_enabled {
            self.notice("log level can only be changed while the server is ready")
                .await;
            return;
        }

        if let Some(handle) = &self.level
            && let Err(err) = handle.set(&level)
        {
            tracing::warn!(error = %format!("{err:#}"), "failed to change launcher log level");
        }
        self.update_setting(settings::KEY_LOG_LEVEL, level.clone());
        if let Some(client) = self.actuator.clone() {
            self.supervisor.spawn_task(client.push_log_level(level.clone()));
        }
        self.notice(&format!("log level set to {level}")).await;
    }

    async fn request_info(&mut self) {
        let client = match &self.actuator {
            Some(client) if self.controls.indicator == Indicator::Ready => client.clone(),
            _ => {
                self.notice("runtime info is available once the server is ready")
                    .await;
                return;
            }
        };
        let sink = self.sink.clone();
        self.supervisor.spawn_task(async move {
            let info = client.runtime_info().await;
            sink.post(UiEvent::RuntimeInfo(info));
        });
    }

    fn update_setting(&mut self, key: &str, value: String) {
        self.settings.send_modify(|s| s.set(key, value));
        if let Some(path) = &self.settings_path
            && let Err(err) = self.settings.borrow().save(path)
        {
            tracing::warn!(path = %path.display(), error = %format!("{err:#}"), "failed to save settings");
        }
    }

    fn status_line(&self) -> String {
        let mut line = format!(
            "process={:?} readiness={:?}",
            self.supervisor.state(),
            self.controls.indicator
        );
        if let Some(status) = &self.health_status {
            line.push_str(&format!(" health={:?}", *status.borrow()));
        }
        if let Some(url) = &self.controls.server_url {
            line.push_str(&format!(" url={url}"));
        }
        match &self.last_exit {
            Some(ExitOutcome::Exited { code, .. }) => {
                line.push_str(&format!(" last_exit={}", or_na(*code)));
            }
            Some(ExitOutcome::NotLaunched { reason }) => {
                line.push_str(&format!(" last_error={reason:?}"));
            }
            None => {}
        }
        line.push_str(&format!(
            " buffer={}/{}",
            self.buffer.line_count(),
            self.buffer.max_lines()
        ));
        line
    }

    async fn render_new_lines(&mut self) {
        let (lines, cursor) = self.buffer.tail_after(self.cursor, usize::MAX);
        self.cursor = self.cursor.max(cursor);
        let mut text = String::new();
        for line in &lines {
            text.push_str(&line.to_ansi());
            text.push('\n');
        }
        self.write(&text).await;
    }

    async fn notice(&mut self, text: &str) {
        self.write(&format!("[launcher] {text}\n")).await;
    }

    async fn write(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        let res = async {
            self.out.write_all(text.as_bytes()).await?;
            self.out.flush().await
        }
        .await;
        if let Err(err) = res {
            tracing::debug!(error = %err, "console write failed");
        }
    }
}
