use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use anyhow::Context;

pub const KEY_LOG_LEVEL: &str = "log.level";
pub const KEY_SERVER_PORT: &str = "server.port";
pub const KEY_STATIC_FOLDER: &str = "static.folder.path";
pub const KEY_TEMPLATES_FOLDER: &str = "templates.folder.path";
pub const KEY_DATA_FOLDER: &str = "data.folder.path";
pub const KEY_PROCESSOR_JAR: &str = "processor.jar.path";
pub const KEY_LOG_BUFFER_SIZE: &str = "log.buffer.size";
pub const KEY_CONSOLE_LOG_FILE: &str = "console.log.file";
pub const KEY_AUTOSTART: &str = "autostart";

pub const DEFAULT_LOG_LEVEL: &str = "INFO";
pub const DEFAULT_SERVER_PORT: u16 = 8080;
pub const DEFAULT_LOG_BUFFER_SIZE: usize = 1000;

const DEFAULT_SETTINGS_FILE: &str = "thymelab.toml";
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_RUNTIME_DIR: &str = "runtime";

/// Levels the worker's logger endpoint accepts.
pub const LOG_LEVELS: [&str; 4] = ["INFO", "DEBUG", "WARN", "ERROR"];

fn env_path(key: &str, default: &str) -> PathBuf {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(default))
}

pub fn settings_path() -> PathBuf {
    env_path("THYMELAB_CONFIG", DEFAULT_SETTINGS_FILE)
}

/// Where the launcher's own rolling log files go.
pub fn log_dir() -> PathBuf {
    env_path("THYMELAB_LOG_DIR", DEFAULT_LOG_DIR)
}

/// Bundled Java runtime searched before `java` on PATH.
pub fn runtime_dir() -> PathBuf {
    env_path("THYMELAB_RUNTIME_DIR", DEFAULT_RUNTIME_DIR)
}

pub fn normalize_log_level(raw: &str) -> Option<&'static str> {
    let upper = raw.trim().to_ascii_uppercase();
    LOG_LEVELS.iter().copied().find(|l| *l == upper)
}

/// Flat key/value settings, persisted as a TOML table.
///
/// Values are kept as strings; typed getters fall back to the supplied
/// default when a key is absent or does not parse.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Settings {
    values: BTreeMap<String, String>,
}

impl Settings {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Missing file yields empty settings; a malformed one is an error.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let text = match std::fs::read_to_string(path) {
            Ok(v) => v,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(e).with_context(|| format!("read settings {}", path.display()));
            }
        };
        Self::parse(&text).with_context(|| format!("parse settings {}", path.display()))
    }

    pub fn parse(text: &str) -> anyhow::Result<Self> {
        let table: toml::Table = text.parse()?;
        let mut values = BTreeMap::new();
        for (k, v) in table {
            let s = match v {
                toml::Value::String(s) => s,
                toml::Value::Integer(i) => i.to_string(),
                toml::Value::Boolean(b) => b.to_string(),
                toml::Value::Float(f) => f.to_string(),
                // Nested tables and arrays are not part of the settings surface.
                _ => continue,
            };
            values.insert(k, s);
        }
        Ok(Self { values })
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).context("create settings dir")?;
        }
        let data = toml::to_string(&self.values).context("serialize settings")?;
        let tmp = path.with_extension("toml.tmp");
        std::fs::write(&tmp, data.as_bytes()).context("write settings tmp")?;
        std::fs::rename(&tmp, path).context("persist settings")?;
        Ok(())
    }

    pub fn get_str(&self, key: &str, default: &str) -> String {
        self.values
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        self.values
            .get(key)
            .and_then(|v| v.trim().parse::<i64>().ok())
            .unwrap_or(default)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.values.get(key).map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if v == "true" => true,
            Some(_) => false,
            None => default,
        }
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.values.insert(key.to_string(), value.into());
    }

    pub fn log_level(&self) -> String {
        let raw = self.get_str(KEY_LOG_LEVEL, DEFAULT_LOG_LEVEL);
        normalize_log_level(&raw)
            .unwrap_or(DEFAULT_LOG_LEVEL)
            .to_string()
    }

    pub fn server_port(&self) -> u16 {
        u16::try_from(self.get_int(KEY_SERVER_PORT, DEFAULT_SERVER_PORT as i64))
            .ok()
            .filter(|p| *p != 0)
            .unwrap_or(DEFAULT_SERVER_PORT)
    }

    pub fn log_buffer_size(&self) -> usize {
        usize::try_from(self.get_int(KEY_LOG_BUFFER_SIZE, DEFAULT_LOG_BUFFER_SIZE as i64))
            .ok()
            .filter(|n| *n > 0)
            .unwrap_or(DEFAULT_LOG_BUFFER_SIZE)
    }

    pub fn processor_jar_path(&self) -> String {
        self.get_str(KEY_PROCESSOR_JAR, "").trim().to_string()
    }

    pub fn console_log_file(&self) -> Option<PathBuf> {
        let raw = self.get_str(KEY_CONSOLE_LOG_FILE, "");
        let raw = raw.trim();
        (!raw.is_empty()).then(|| PathBuf::from(raw))
    }

    pub fn server_url(&self) -> String {
        format!("http://localhost:{}", self.server_port())
    }
}
