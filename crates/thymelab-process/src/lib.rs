/// Identity of one start cycle of the worker process.
///
/// A fresh id is minted for every spawn, so late notifications from an
/// earlier run can be told apart from the current one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub struct ProcessId(pub String);

impl ProcessId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for ProcessId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ProcessId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque handle of a spawned child, valid until its exit is confirmed.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ProcessHandle {
    pub id: ProcessId,
    pub pid: Option<u32>,
}

/// Lifecycle of the supervised worker.
///
/// `Idle -> Starting -> Running -> {Stopping -> Stopped} | Crashed`.
/// `Stopped` and `Crashed` both allow a new start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum ProcessState {
    Idle = 0,
    Starting = 1,
    Running = 2,
    Stopping = 3,
    Stopped = 4,
    Crashed = 5,
}

impl ProcessState {
    /// States in which a new run must not begin.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            ProcessState::Starting | ProcessState::Running | ProcessState::Stopping
        )
    }

    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => ProcessState::Starting,
            2 => ProcessState::Running,
            3 => ProcessState::Stopping,
            4 => ProcessState::Stopped,
            5 => ProcessState::Crashed,
            _ => ProcessState::Idle,
        }
    }
}

/// Readiness of the worker's health endpoint for the current start cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub enum HealthStatus {
    #[default]
    Unknown,
    Checking,
    Ready,
    Unreachable,
}

/// Why a start cycle ended. Delivered exactly once per cycle.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ExitOutcome {
    /// The child ran and has exited. `code` is `None` when it died by signal.
    Exited { code: Option<i32>, requested: bool },
    /// No child was spawned (missing artifact or spawn failure).
    NotLaunched { reason: String },
}

impl ExitOutcome {
    pub fn is_failure(&self) -> bool {
        match self {
            ExitOutcome::Exited { code, requested } => !requested && *code != Some(0),
            ExitOutcome::NotLaunched { .. } => true,
        }
    }
}
