use std::path::{Path, PathBuf};

use tokio::sync::watch;

use crate::error::LaunchError;
use crate::settings::{self, Settings};

const PROCESS_NAME: &str = "ThymeleafProcessor";
pub const LOGGER_NAMESPACE: &str = "com.github.thkwag.thymelab";
const SYSTEM_JAVA: &str = "java";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub exec: PathBuf,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl LaunchSpec {
    pub fn display_command(&self) -> String {
        let mut out = self.exec.display().to_string();
        for a in &self.args {
            out.push(' ');
            out.push_str(a);
        }
        out
    }
}

/// Produces the launch command for one start attempt.
pub trait LaunchPlanner: Send + Sync {
    fn plan(&self) -> Result<LaunchSpec, LaunchError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsFamily {
    Windows,
    Unix,
}

impl OsFamily {
    pub fn current() -> Self {
        if cfg!(windows) {
            OsFamily::Windows
        } else {
            OsFamily::Unix
        }
    }

    fn jvm_flags(self) -> &'static [&'static str] {
        match self {
            OsFamily::Windows => &[
                "-XX:NativeMemoryTracking=summary",
                "-Dproc_name=ThymeleafProcessor",
            ],
            OsFamily::Unix => &["-Dproc_name=ThymeleafProcessor"],
        }
    }
}

/// Bundled runtime first (Windows layout, then Unix layout), then `java` from PATH.
pub fn resolve_java(runtime_dir: &Path) -> PathBuf {
    let bin = runtime_dir.join("bin");
    let candidates = [bin.join("java.exe"), bin.join("java")];
    candidates
        .into_iter()
        .find(|p| p.is_file())
        .unwrap_or_else(|| PathBuf::from(SYSTEM_JAVA))
}

fn resolve_artifact(configured: &str) -> Result<PathBuf, LaunchError> {
    if configured.is_empty() {
        return Err(LaunchError::MissingArtifact { path: None });
    }
    let path = PathBuf::from(configured);
    if !path.exists() {
        return Err(LaunchError::MissingArtifact { path: Some(path) });
    }
    Ok(std::path::absolute(&path).unwrap_or(path))
}

pub fn build_launch_spec(
    settings: &Settings,
    runtime_dir: &Path,
    os: OsFamily,
) -> Result<LaunchSpec, LaunchError> {
    let artifact = resolve_artifact(&settings.processor_jar_path())?;
    let exec = resolve_java(runtime_dir);

    let mut args: Vec<String> = os.jvm_flags().iter().map(|s| s.to_string()).collect();
    args.push("-jar".to_string());
    args.push(artifact.display().to_string());
    args.push(format!(
        "--logging.level.{LOGGER_NAMESPACE}={}",
        settings.log_level()
    ));
    args.push(format!("--server.port={}", settings.server_port()));

    let watch_dirs = [
        (settings::KEY_STATIC_FOLDER, "static"),
        (settings::KEY_TEMPLATES_FOLDER, "templates"),
        (settings::KEY_DATA_FOLDER, "thymeleaf-data"),
    ];
    for (key, flag) in watch_dirs {
        let value = settings.get_str(key, "");
        if !value.is_empty() {
            args.push(format!("--watch.directory.{flag}={value}"));
        }
    }

    Ok(LaunchSpec {
        exec,
        args,
        env: vec![("PROCESS_NAME".to_string(), PROCESS_NAME.to_string())],
    })
}

/// Builds a fresh `LaunchSpec` from the current settings on every start.
pub struct CommandBuilder {
    settings: watch::Receiver<Settings>,
    runtime_dir: PathBuf,
    os: OsFamily,
}

impl CommandBuilder {
    pub fn new(settings: watch::Receiver<Settings>) -> Self {
        Self {
            settings,
            runtime_dir: settings::runtime_dir(),
            os: OsFamily::current(),
        }
    }

    pub fn with_runtime_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.runtime_dir = dir.into();
        self
    }

    pub fn with_os(mut self, os: OsFamily) -> Self {
        self.os = os;
        self
    }
}

impl LaunchPlanner for CommandBuilder {
    fn plan(&self) -> Result<LaunchSpec, LaunchError> {
        let snapshot = self.settings.borrow().clone();
        build_launch_spec(&snapshot, &self.runtime_dir, self.os)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings_with_jar(jar: &Path) -> Settings {
        Settings::from_pairs([(settings::KEY_PROCESSOR_JAR, jar.display().to_string())])
    }

    #[test]
    fn empty_artifact_path_is_missing_artifact() {
        let err = build_launch_spec(&Settings::default(), Path::new("runtime"), OsFamily::Unix)
            .unwrap_err();
        assert!(matches!(err, LaunchError::MissingArtifact { path: None }));
        assert!(err.to_string().contains("not configured"));
    }

    #[test]
    fn nonexistent_artifact_is_missing_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("nope.jar");
        let err = build_launch_spec(&settings_with_jar(&jar), dir.path(), OsFamily::Unix)
            .unwrap_err();
        match err {
            LaunchError::MissingArtifact { path: Some(p) } => assert_eq!(p, jar),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn minimal_command_on_unix() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("processor.jar");
        std::fs::write(&jar, b"jar").unwrap();

        let spec = build_launch_spec(
            &settings_with_jar(&jar),
            &dir.path().join("runtime"),
            OsFamily::Unix,
        )
        .unwrap();

        assert_eq!(spec.exec, PathBuf::from("java"));
        assert_eq!(
            spec.args,
            vec![
                "-Dproc_name=ThymeleafProcessor".to_string(),
                "-jar".to_string(),
                jar.display().to_string(),
                "--logging.level.com.github.thkwag.thymelab=INFO".to_string(),
                "--server.port=8080".to_string(),
            ]
        );
        assert!(
            spec.env
                .iter()
                .any(|(k, v)| k == "PROCESS_NAME" && v == "ThymeleafProcessor")
        );
    }

    #[test]
    fn windows_flags_and_watch_directories() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("processor.jar");
        std::fs::write(&jar, b"jar").unwrap();

        let mut s = settings_with_jar(&jar);
        s.set(settings::KEY_LOG_LEVEL, "debug");
        s.set(settings::KEY_SERVER_PORT, "9000");
        s.set(settings::KEY_STATIC_FOLDER, "/w/static");
        s.set(settings::KEY_DATA_FOLDER, "/w/data");

        let spec = build_launch_spec(&s, dir.path(), OsFamily::Windows).unwrap();
        assert_eq!(spec.args[0], "-XX:NativeMemoryTracking=summary");
        assert_eq!(spec.args[1], "-Dproc_name=ThymeleafProcessor");
        assert!(spec.args.contains(&"--logging.level.com.github.thkwag.thymelab=DEBUG".to_string()));
        assert!(spec.args.contains(&"--server.port=9000".to_string()));
        assert!(spec.args.contains(&"--watch.directory.static=/w/static".to_string()));
        assert!(spec.args.contains(&"--watch.directory.thymeleaf-data=/w/data".to_string()));
        assert!(!spec.args.iter().any(|a| a.starts_with("--watch.directory.templates")));
    }

    #[test]
    fn bundled_runtime_is_preferred_over_system_java() {
        let dir = tempfile::tempdir().unwrap();
        let bin = dir.path().join("bin");
        std::fs::create_dir_all(&bin).unwrap();
        std::fs::write(bin.join("java"), b"").unwrap();
        assert_eq!(resolve_java(dir.path()), bin.join("java"));

        std::fs::write(bin.join("java.exe"), b"").unwrap();
        assert_eq!(resolve_java(dir.path()), bin.join("java.exe"));
    }

    #[test]
    fn planner_reads_current_settings_each_time() {
        let dir = tempfile::tempdir().unwrap();
        let jar = dir.path().join("processor.jar");
        std::fs::write(&jar, b"jar").unwrap();

        let (tx, rx) = watch::channel(Settings::default());
        let builder = CommandBuilder::new(rx)
            .with_runtime_dir(dir.path())
            .with_os(OsFamily::Unix);
        assert!(builder.plan().is_err());

        tx.send_modify(|s| s.set(settings::KEY_PROCESSOR_JAR, jar.display().to_string()));
        let spec = builder.plan().unwrap();
        assert!(spec.display_command().contains("-jar"));
    }
}
