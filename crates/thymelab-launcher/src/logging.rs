use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, Registry, layer::SubscriberExt, reload, util::SubscriberInitExt};

const LOG_FILE_NAME: &str = "launcher.log";

/// The launcher's own log level, adjustable at runtime.
#[derive(Clone)]
pub struct LevelHandle {
    inner: reload::Handle<EnvFilter, Registry>,
}

impl LevelHandle {
    /// Accepts the worker-facing names (`INFO`, `DEBUG`, `WARN`, `ERROR`).
    pub fn set(&self, level: &str) -> anyhow::Result<()> {
        let filter = EnvFilter::try_new(directive_for(level)).context("invalid log level")?;
        self.inner.reload(filter).context("reload log filter")?;
        Ok(())
    }

    pub fn current(&self) -> Option<String> {
        self.inner.with_current(|f| f.to_string()).ok()
    }
}

/// Keeps the non-blocking file writer alive; drop it last.
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

fn directive_for(level: &str) -> String {
    level.trim().to_ascii_lowercase()
}

/// Installs the global subscriber: stderr plus, when `log_dir` is given, a
/// daily rolling `launcher.log`. `RUST_LOG` wins over `level` at startup.
pub fn init(level: &str, log_dir: Option<&Path>) -> anyhow::Result<(LevelHandle, LogGuard)> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(directive_for(level)))
        .context("build log filter")?;
    let (filter, handle) = reload::Layer::new(filter);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create log dir {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init()
        .context("install tracing subscriber")?;

    Ok((LevelHandle { inner: handle }, LogGuard { _file: guard }))
}
