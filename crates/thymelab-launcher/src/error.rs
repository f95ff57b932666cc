use std::path::PathBuf;

/// Failures that keep a start cycle from producing a child process.
///
/// Both variants are reported through the exit callback; neither is fatal
/// to the supervisor.
#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    /// `path` is `None` when nothing is configured at all.
    #[error("{}", missing_artifact_message(.path.as_deref()))]
    MissingArtifact { path: Option<PathBuf> },

    #[error("Failed to start process: {source}")]
    SpawnFailure {
        exec: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn missing_artifact_message(path: Option<&std::path::Path>) -> String {
    match path {
        Some(p) => format!("Processor jar not found: {}", p.display()),
        None => "Processor jar is not configured (set processor.jar.path)".to_string(),
    }
}

/// Failures talking to the worker's actuator endpoints.
#[derive(Debug, thiserror::Error)]
pub enum ActuatorError {
    #[error("failed to build http client: {0}")]
    Client(#[source] reqwest::Error),

    #[error("request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("server returned: HTTP {status}")]
    UnexpectedStatus { status: u16 },

    #[error("unexpected response from {url}: {message}")]
    Decode { url: String, message: String },
}

impl ActuatorError {
    /// True when the worker has not opened its listening socket yet.
    pub fn is_connect(&self) -> bool {
        match self {
            ActuatorError::Transport { source, .. } => source.is_connect(),
            _ => false,
        }
    }
}

/// Rejected terminal input.
#[derive(Debug, PartialEq, Eq, thiserror::Error)]
pub enum CommandParseError {
    #[error("unknown command: {0:?} (try: start, stop, restart, status, level, buffer, clear, info, quit)")]
    Unknown(String),

    #[error("usage: level <INFO|DEBUG|WARN|ERROR>")]
    Level,

    #[error("usage: buffer <lines>")]
    Buffer,
}
