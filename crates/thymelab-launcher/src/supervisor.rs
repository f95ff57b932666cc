use std::{
    future::Future,
    process::{ExitStatus, Stdio},
    sync::{
        Arc,
        atomic::{AtomicU8, Ordering},
    },
    time::Duration,
};

use thymelab_process::{ExitOutcome, ProcessHandle, ProcessId, ProcessState};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, BufReader, Split},
    process::{Child, ChildStderr, ChildStdout, Command},
    sync::{Mutex, watch},
};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

use crate::command::LaunchPlanner;
use crate::error::LaunchError;

const DEFAULT_STOP_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

/// Receives the worker's console output, one chunk per call.
///
/// Called from background tasks; implementations marshal to their own
/// consumer.
pub trait LineSink: Send + Sync {
    fn accept(&self, chunk: String);
}

/// Start/exit notifications. `on_exit` fires exactly once per start cycle.
pub trait ProcessListener: Send + Sync {
    fn on_started(&self, handle: &ProcessHandle);
    fn on_exit(&self, outcome: ExitOutcome);
}

#[derive(Debug, Clone, Copy)]
pub struct SupervisorOptions {
    /// Graceful phase of `stop()`, and again the bound after the forced kill.
    pub stop_timeout: Duration,
    /// How long `shutdown()` waits for background tasks to drain.
    pub shutdown_timeout: Duration,
}

impl Default for SupervisorOptions {
    fn default() -> Self {
        Self {
            stop_timeout: DEFAULT_STOP_TIMEOUT,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }
}

struct ActiveRun {
    handle: ProcessHandle,
    kill: CancellationToken,
    exited: watch::Receiver<bool>,
}

struct Shared {
    planner: Arc<dyn LaunchPlanner>,
    sink: Arc<dyn LineSink>,
    listener: Arc<dyn ProcessListener>,
    options: SupervisorOptions,
    // Written only while `run` is locked; read lock-free.
    state: AtomicU8,
    run: Mutex<Option<ActiveRun>>,
    tasks: TaskTracker,
    shutdown: CancellationToken,
}

impl Shared {
    fn state(&self) -> ProcessState {
        ProcessState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn set_state(&self, state: ProcessState) {
        self.state.store(state as u8, Ordering::Release);
    }

    fn report_not_launched(&self, err: LaunchError) {
        match &err {
            LaunchError::MissingArtifact { .. } => {
                tracing::warn!(error = %err, "worker not started");
            }
            LaunchError::SpawnFailure { exec, source } => {
                tracing::error!(exec = %exec.display(), error = %source, "failed to spawn worker");
            }
        }
        self.sink.accept(format!("{err}\n"));
        self.listener.on_exit(ExitOutcome::NotLaunched {
            reason: err.to_string(),
        });
    }

    async fn wait_for_exit(
        self: Arc<Self>,
        mut child: Child,
        id: ProcessId,
        kill: CancellationToken,
        exited: watch::Sender<bool>,
    ) {
        let finished = tokio::select! {
            status = child.wait() => Some(status),
            _ = kill.cancelled() => None,
        };
        let status = match finished {
            Some(status) => status,
            None => {
                if let Err(err) = child.start_kill() {
                    tracing::warn!(%id, error = %err, "failed to kill worker");
                }
                child.wait().await
            }
        };
        let _ = exited.send(true);

        let interrupted = self.shutdown.is_cancelled();
        let requested = {
            let mut slot = self.run.lock().await;
            let requested = interrupted || self.state() == ProcessState::Stopping;
            if slot.as_ref().is_some_and(|r| r.handle.id == id) {
                *slot = None;
                self.set_state(if requested {
                    ProcessState::Stopped
                } else {
                    ProcessState::Crashed
                });
            }
            requested
        };

        if interrupted {
            tracing::debug!(%id, "exit wait interrupted by shutdown");
            return;
        }

        let code = match &status {
            Ok(s) => {
                tracing::info!(%id, exit = %exit_label(s), requested, "worker exited");
                self.sink
                    .accept(format!("Process exited with code: {}\n", exit_label(s)));
                s.code()
            }
            Err(err) => {
                tracing::error!(%id, error = %err, "failed waiting for worker");
                self.sink
                    .accept(format!("Failed waiting for process: {err}\n"));
                None
            }
        };
        self.listener.on_exit(ExitOutcome::Exited { code, requested });
    }
}

fn exit_label(status: &ExitStatus) -> String {
    match status.code() {
        Some(code) => code.to_string(),
        None => status.to_string(),
    }
}

#[cfg(target_os = "linux")]
fn set_parent_death_signal() -> std::io::Result<()> {
    // If the launcher dies, take the worker with it.
    let rc = unsafe { libc::prctl(libc::PR_SET_PDEATHSIG, libc::SIGTERM) };
    if rc == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

/// Graceful termination request. Returns false when no signal could be sent.
#[cfg(unix)]
fn send_terminate(pid: Option<u32>) -> bool {
    let Some(pid) = pid.and_then(|p| libc::pid_t::try_from(p).ok()) else {
        return false;
    };
    let rc = unsafe { libc::kill(pid, libc::SIGTERM) };
    rc == 0
}

// No graceful signal elsewhere; `stop()` goes straight to the forced phase.
#[cfg(not(unix))]
fn send_terminate(_pid: Option<u32>) -> bool {
    false
}

async fn next_segment<R>(reader: &mut Option<Split<R>>) -> std::io::Result<Option<Vec<u8>>>
where
    R: AsyncBufRead + Unpin,
{
    match reader {
        Some(r) => r.next_segment().await,
        None => std::future::pending().await,
    }
}

fn decode_line(mut bytes: Vec<u8>) -> String {
    if bytes.last() == Some(&b'\r') {
        bytes.pop();
    }
    let mut line = String::from_utf8_lossy(&bytes).into_owned();
    line.push('\n');
    line
}

/// Forwards stdout and stderr, line by line, into one sink until both close.
async fn relay_output(
    stdout: Option<ChildStdout>,
    stderr: Option<ChildStderr>,
    sink: Arc<dyn LineSink>,
    shutdown: CancellationToken,
) {
    let mut out = stdout.map(|s| BufReader::new(s).split(b'\n'));
    let mut err = stderr.map(|s| BufReader::new(s).split(b'\n'));

    while out.is_some() || err.is_some() {
        let (read, from_stdout) = tokio::select! {
            _ = shutdown.cancelled() => break,
            read = next_segment(&mut out) => (read, true),
            read = next_segment(&mut err) => (read, false),
        };
        match read {
            Ok(Some(bytes)) => sink.accept(decode_line(bytes)),
            Ok(None) => {
                if from_stdout {
                    out = None;
                } else {
                    err = None;
                }
            }
            Err(e) => {
                sink.accept(format!("Error reading process output: {e}\n"));
                if from_stdout {
                    out = None;
                } else {
                    err = None;
                }
            }
        }
    }
}

/// Owns the single worker process: spawn, output relay, exit detection,
/// graceful-then-forced stop and shutdown cleanup.
///
/// `is_running()` is true from the moment the OS confirms the spawn until the
/// exit is observed, including while a stop is waiting for the child to go.
#[derive(Clone)]
pub struct ProcessSupervisor {
    shared: Arc<Shared>,
}

impl ProcessSupervisor {
    pub fn new(
        planner: Arc<dyn LaunchPlanner>,
        sink: Arc<dyn LineSink>,
        listener: Arc<dyn ProcessListener>,
        options: SupervisorOptions,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                planner,
                sink,
                listener,
                options,
                state: AtomicU8::new(ProcessState::Idle as u8),
                run: Mutex::new(None),
                tasks: TaskTracker::new(),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    pub fn state(&self) -> ProcessState {
        self.shared.state()
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state(), ProcessState::Running | ProcessState::Stopping)
    }

    pub async fn current(&self) -> Option<ProcessHandle> {
        self.shared
            .run
            .lock()
            .await
            .as_ref()
            .map(|r| r.handle.clone())
    }

    /// Run `fut` in the supervisor's task pool so `shutdown()` drains it.
    pub fn spawn_task<F>(&self, fut: F) -> tokio::task::JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.shared.tasks.spawn(fut)
    }

    /// Token cancelled when the supervisor shuts down.
    pub fn child_token(&self) -> CancellationToken {
        self.shared.shutdown.child_token()
    }

    /// Starts the worker unless a run is already in flight.
    ///
    /// Build and spawn failures are reported through the sink and the exit
    /// callback; the return value is only the handle of a new child.
    pub async fn start(&self) -> Option<ProcessHandle> {
        let shared = &self.shared;
        let mut slot = shared.run.lock().await;

        if shared.shutdown.is_cancelled() {
            tracing::debug!("start ignored: supervisor is shut down");
            return None;
        }
        let state = shared.state();
        if state.is_active() {
            tracing::debug!(?state, "start ignored: worker already active");
            return None;
        }
        shared.set_state(ProcessState::Starting);

        let spec = match shared.planner.plan() {
            Ok(spec) => spec,
            Err(err) => {
                shared.set_state(ProcessState::Crashed);
                drop(slot);
                shared.report_not_launched(err);
                return None;
            }
        };

        tracing::info!(command = %spec.display_command(), "starting worker");
        let mut cmd = Command::new(&spec.exec);
        cmd.args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(target_os = "linux")]
        unsafe {
            cmd.pre_exec(set_parent_death_signal);
        }

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(source) => {
                shared.set_state(ProcessState::Crashed);
                drop(slot);
                shared.report_not_launched(LaunchError::SpawnFailure {
                    exec: spec.exec,
                    source,
                });
                return None;
            }
        };

        let handle = ProcessHandle {
            id: ProcessId::new(),
            pid: child.id(),
        };
        let kill = shared.shutdown.child_token();
        let (exited_tx, exited_rx) = watch::channel(false);
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();

        *slot = Some(ActiveRun {
            handle: handle.clone(),
            kill: kill.clone(),
            exited: exited_rx,
        });
        shared.set_state(ProcessState::Running);
        drop(slot);

        tracing::info!(id = %handle.id, pid = ?handle.pid, "worker spawned");
        shared.tasks.spawn(relay_output(
            stdout,
            stderr,
            shared.sink.clone(),
            shared.shutdown.clone(),
        ));
        // Started must reach listeners before any exit notification.
        shared.listener.on_started(&handle);
        shared.tasks.spawn(Shared::wait_for_exit(
            shared.clone(),
            child,
            handle.id.clone(),
            kill,
            exited_tx,
        ));
        Some(handle)
    }

    /// Graceful stop with escalation. Returns false when nothing was running.
    ///
    /// Blocks the calling task for at most `stop_timeout` before the forced
    /// kill, plus the same bound for the kill to be observed.
    pub async fn stop(&self) -> bool {
        let (id, pid, kill, mut exited) = {
            let slot = self.shared.run.lock().await;
            if self.shared.state() != ProcessState::Running {
                return false;
            }
            let Some(run) = slot.as_ref() else {
                return false;
            };
            self.shared.set_state(ProcessState::Stopping);
            (
                run.handle.id.clone(),
                run.handle.pid,
                run.kill.clone(),
                run.exited.clone(),
            )
        };

        let limit = self.shared.options.stop_timeout;
        if send_terminate(pid) {
            tracing::info!(%id, ?pid, "stop: sent SIGTERM");
            if tokio::time::timeout(limit, exited.wait_for(|done| *done))
                .await
                .is_ok()
            {
                return true;
            }
            tracing::warn!(
                %id,
                timeout_ms = limit.as_millis() as u64,
                "stop: worker did not exit in time, killing"
            );
        }

        kill.cancel();
        if tokio::time::timeout(limit, exited.wait_for(|done| *done))
            .await
            .is_err()
        {
            tracing::error!(%id, "stop: worker still alive after forced kill");
        }
        true
    }

    /// Process-wide teardown: kill immediately, then drain background tasks.
    pub async fn shutdown(&self) {
        tracing::info!("supervisor shutting down");
        self.shared.shutdown.cancel();
        self.shared.tasks.close();

        let limit = self.shared.options.shutdown_timeout;
        if tokio::time::timeout(limit, self.shared.tasks.wait())
            .await
            .is_err()
        {
            tracing::warn!(
                timeout_ms = limit.as_millis() as u64,
                "background tasks did not finish before shutdown deadline"
            );
            self.shared
                .sink
                .accept("Failed to terminate background tasks\n".to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{path::PathBuf, sync::Mutex as StdMutex};

    use tokio::sync::mpsc;

    use super::*;
    use crate::command::LaunchSpec;

    #[derive(Debug)]
    enum Event {
        Started(ProcessHandle),
        Exit(ExitOutcome),
    }

    struct ChannelListener(mpsc::UnboundedSender<Event>);

    impl ProcessListener for ChannelListener {
        fn on_started(&self, handle: &ProcessHandle) {
            let _ = self.0.send(Event::Started(handle.clone()));
        }

        fn on_exit(&self, outcome: ExitOutcome) {
            let _ = self.0.send(Event::Exit(outcome));
        }
    }

    #[derive(Default)]
    struct VecSink(StdMutex<Vec<String>>);

    impl LineSink for VecSink {
        fn accept(&self, chunk: String) {
            self.0.lock().unwrap().push(chunk);
        }
    }

    impl VecSink {
        fn contains(&self, needle: &str) -> bool {
            self.0.lock().unwrap().iter().any(|l| l.contains(needle))
        }
    }

    struct FixedPlanner(LaunchSpec);

    impl LaunchPlanner for FixedPlanner {
        fn plan(&self) -> Result<LaunchSpec, LaunchError> {
            Ok(self.0.clone())
        }
    }

    struct MissingPlanner;

    impl LaunchPlanner for MissingPlanner {
        fn plan(&self) -> Result<LaunchSpec, LaunchError> {
            Err(LaunchError::MissingArtifact { path: None })
        }
    }

    struct Harness {
        supervisor: ProcessSupervisor,
        sink: Arc<VecSink>,
        events: mpsc::UnboundedReceiver<Event>,
    }

    fn harness(planner: Arc<dyn LaunchPlanner>, options: SupervisorOptions) -> Harness {
        let (tx, events) = mpsc::unbounded_channel();
        let sink = Arc::new(VecSink::default());
        let supervisor =
            ProcessSupervisor::new(planner, sink.clone(), Arc::new(ChannelListener(tx)), options);
        Harness {
            supervisor,
            sink,
            events,
        }
    }

    #[cfg(unix)]
    fn sh(script: &str) -> Arc<dyn LaunchPlanner> {
        Arc::new(FixedPlanner(LaunchSpec {
            exec: PathBuf::from("sh"),
            args: vec!["-c".to_string(), script.to_string()],
            env: vec![],
        }))
    }

    async fn next_event(h: &mut Harness) -> Event {
        tokio::time::timeout(Duration::from_secs(10), h.events.recv())
            .await
            .expect("event in time")
            .expect("listener alive")
    }

    async fn wait_for_line(sink: &VecSink, needle: &str) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
        while !sink.contains(needle) {
            assert!(
                tokio::time::Instant::now() < deadline,
                "line {needle:?} never arrived"
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    #[tokio::test]
    async fn idle_before_any_start() {
        let h = harness(Arc::new(MissingPlanner), SupervisorOptions::default());
        assert_eq!(h.supervisor.state(), ProcessState::Idle);
        assert!(!h.supervisor.is_running());
        assert!(h.supervisor.current().await.is_none());
    }

    #[tokio::test]
    async fn missing_artifact_reports_exit_once_without_spawning() {
        let mut h = harness(Arc::new(MissingPlanner), SupervisorOptions::default());

        assert!(h.supervisor.start().await.is_none());
        match next_event(&mut h).await {
            Event::Exit(ExitOutcome::NotLaunched { reason }) => {
                assert!(reason.contains("not configured"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(h.events.try_recv().is_err());
        assert!(!h.supervisor.is_running());
        assert_eq!(h.supervisor.state(), ProcessState::Crashed);
        assert!(h.sink.contains("not configured"));
    }

    #[tokio::test]
    async fn spawn_failure_is_reported_through_exit_callback() {
        let planner = Arc::new(FixedPlanner(LaunchSpec {
            exec: PathBuf::from("/definitely/not/a/real/java"),
            args: vec![],
            env: vec![],
        }));
        let mut h = harness(planner, SupervisorOptions::default());

        assert!(h.supervisor.start().await.is_none());
        match next_event(&mut h).await {
            Event::Exit(ExitOutcome::NotLaunched { reason }) => {
                assert!(reason.starts_with("Failed to start process"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(h.events.try_recv().is_err());
        assert!(!h.supervisor.is_running());
    }

    #[tokio::test]
    async fn stop_when_idle_is_a_noop() {
        let mut h = harness(Arc::new(MissingPlanner), SupervisorOptions::default());
        assert!(!h.supervisor.stop().await);
        assert!(h.events.try_recv().is_err());
        assert_eq!(h.supervisor.state(), ProcessState::Idle);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn natural_exit_relays_merged_output_and_fires_exit_once() {
        let mut h = harness(
            sh("echo hello; echo oops 1>&2; exit 3"),
            SupervisorOptions::default(),
        );

        let handle = h.supervisor.start().await.expect("spawned");
        assert!(handle.pid.is_some());
        match next_event(&mut h).await {
            Event::Started(started) => assert_eq!(started, handle),
            other => panic!("unexpected event: {other:?}"),
        }
        match next_event(&mut h).await {
            Event::Exit(outcome) => assert_eq!(
                outcome,
                ExitOutcome::Exited {
                    code: Some(3),
                    requested: false
                }
            ),
            other => panic!("unexpected event: {other:?}"),
        }

        wait_for_line(&h.sink, "hello\n").await;
        wait_for_line(&h.sink, "oops\n").await;
        assert!(h.sink.contains("Process exited with code: 3"));
        assert!(!h.supervisor.is_running());
        assert_eq!(h.supervisor.state(), ProcessState::Crashed);
        assert!(h.supervisor.current().await.is_none());
        assert!(h.events.try_recv().is_err());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn graceful_stop_terminates_and_reports_requested_exit() {
        let mut h = harness(sh("exec sleep 30"), SupervisorOptions::default());

        h.supervisor.start().await.expect("spawned");
        assert!(h.supervisor.is_running());
        assert!(matches!(next_event(&mut h).await, Event::Started(_)));

        assert!(h.supervisor.stop().await);
        match next_event(&mut h).await {
            Event::Exit(ExitOutcome::Exited { requested, code }) => {
                assert!(requested);
                assert_eq!(code, None);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(!h.supervisor.is_running());
        assert_eq!(h.supervisor.state(), ProcessState::Stopped);
        assert!(!h.supervisor.stop().await);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn stop_escalates_to_kill_when_term_is_ignored() {
        let options = SupervisorOptions {
            stop_timeout: Duration::from_millis(300),
            shutdown_timeout: Duration::from_secs(5),
        };
        let mut h = harness(sh("trap '' TERM; echo ready; exec sleep 30"), options);

        h.supervisor.start().await.expect("spawned");
        assert!(matches!(next_event(&mut h).await, Event::Started(_)));
        wait_for_line(&h.sink, "ready").await;

        let began = std::time::Instant::now();
        assert!(h.supervisor.stop().await);
        assert!(began.elapsed() >= Duration::from_millis(300));

        match next_event(&mut h).await {
            Event::Exit(ExitOutcome::Exited { requested, .. }) => assert!(requested),
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(!h.supervisor.is_running());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn still_running_while_graceful_stop_waits() {
        let options = SupervisorOptions {
            stop_timeout: Duration::from_secs(2),
            shutdown_timeout: Duration::from_secs(5),
        };
        let mut h = harness(sh("trap '' TERM; echo ready; exec sleep 30"), options);

        h.supervisor.start().await.expect("spawned");
        assert!(matches!(next_event(&mut h).await, Event::Started(_)));
        wait_for_line(&h.sink, "ready").await;

        let stopping = tokio::spawn({
            let supervisor = h.supervisor.clone();
            async move { supervisor.stop().await }
        });
        tokio::time::sleep(Duration::from_millis(300)).await;

        assert_eq!(h.supervisor.state(), ProcessState::Stopping);
        assert!(h.supervisor.is_running());
        // A second stop does not restart the escalation.
        assert!(!h.supervisor.stop().await);

        assert!(stopping.await.unwrap());
        assert!(matches!(next_event(&mut h).await, Event::Exit(_)));
        assert!(!h.supervisor.is_running());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn second_start_while_running_is_ignored() {
        let mut h = harness(sh("exec sleep 30"), SupervisorOptions::default());

        let first = h.supervisor.start().await.expect("spawned");
        assert!(h.supervisor.start().await.is_none());
        assert_eq!(h.supervisor.current().await, Some(first));
        assert!(matches!(next_event(&mut h).await, Event::Started(_)));
        assert!(h.events.try_recv().is_err());

        h.supervisor.stop().await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn new_cycle_after_exit_gets_a_new_identity() {
        let mut h = harness(sh("exit 0"), SupervisorOptions::default());

        let first = h.supervisor.start().await.expect("spawned");
        assert!(matches!(next_event(&mut h).await, Event::Started(_)));
        assert!(matches!(next_event(&mut h).await, Event::Exit(_)));

        let second = h.supervisor.start().await.expect("spawned again");
        assert_ne!(first.id, second.id);
        assert!(matches!(next_event(&mut h).await, Event::Started(_)));
        assert!(matches!(next_event(&mut h).await, Event::Exit(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn shutdown_kills_immediately_and_swallows_exit_callback() {
        let mut h = harness(sh("trap '' TERM; exec sleep 30"), SupervisorOptions::default());

        h.supervisor.start().await.expect("spawned");
        assert!(matches!(next_event(&mut h).await, Event::Started(_)));

        let began = std::time::Instant::now();
        h.supervisor.shutdown().await;
        assert!(began.elapsed() < Duration::from_secs(5));

        assert!(!h.supervisor.is_running());
        assert_eq!(h.supervisor.state(), ProcessState::Stopped);
        assert!(h.events.try_recv().is_err());
        assert!(h.supervisor.start().await.is_none());
    }

    #[tokio::test]
    async fn shutdown_gives_up_on_tasks_that_never_finish() {
        let options = SupervisorOptions {
            stop_timeout: Duration::from_secs(5),
            shutdown_timeout: Duration::from_millis(100),
        };
        let h = harness(Arc::new(MissingPlanner), options);
        h.supervisor.spawn_task(std::future::pending());

        let began = std::time::Instant::now();
        h.supervisor.shutdown().await;
        let took = began.elapsed();

        assert!(took >= Duration::from_millis(100));
        assert!(took < Duration::from_secs(2), "shutdown took {took:?}");
        assert!(h.sink.contains("Failed to terminate background tasks"));
    }

    #[tokio::test]
    async fn shutdown_with_nothing_in_flight_is_quiet() {
        let h = harness(Arc::new(MissingPlanner), SupervisorOptions::default());
        h.supervisor.shutdown().await;
        assert!(!h.sink.contains("Failed to terminate"));
    }
}
