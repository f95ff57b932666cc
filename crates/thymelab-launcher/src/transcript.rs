use std::{
    future::Future,
    path::{Path, PathBuf},
};

use tokio::{io::AsyncWriteExt, sync::mpsc};

use crate::log_buffer::parse_ansi;

pub const DEFAULT_MAX_BYTES: u64 = 10 * 1024 * 1024;
pub const DEFAULT_MAX_FILES: usize = 5;

/// Size-rotated plain-text file: `console.log`, `console.log.1`, ...
struct RotatingFile {
    path: PathBuf,
    max_bytes: u64,
    max_files: usize,
    bytes: u64,
    file: tokio::fs::File,
}

impl RotatingFile {
    async fn open(path: PathBuf, max_bytes: u64, max_files: usize) -> std::io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }

        let bytes = tokio::fs::metadata(&path)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;

        Ok(Self {
            path,
            max_bytes,
            max_files: max_files.max(1),
            bytes,
            file,
        })
    }

    fn rotated(&self, n: usize) -> PathBuf {
        PathBuf::from(format!("{}.{n}", self.path.display()))
    }

    async fn shift(from: &Path, to: &Path) {
        if tokio::fs::metadata(from).await.is_err() {
            return;
        }
        if let Err(err) = tokio::fs::rename(from, to).await {
            tracing::warn!(
                from = %from.display(),
                to = %to.display(),
                error = %err,
                "transcript rotation rename failed"
            );
        }
    }

    async fn rotate(&mut self) -> std::io::Result<()> {
        if let Err(err) = self.file.flush().await {
            tracing::warn!(
                path = %self.path.display(),
                error = %err,
                "transcript flush before rotation failed"
            );
        }

        // .(n-1) -> .n, oldest falls off the end
        for i in (1..self.max_files).rev() {
            Self::shift(&self.rotated(i), &self.rotated(i + 1)).await;
        }
        Self::shift(&self.path, &self.rotated(1)).await;

        self.file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        self.bytes = 0;
        Ok(())
    }

    async fn write(&mut self, text: &str) -> std::io::Result<()> {
        let len = text.len() as u64;
        if self.max_bytes > 0
            && self.bytes > 0
            && self.bytes.saturating_add(len) > self.max_bytes
            && let Err(err) = self.rotate().await
        {
            tracing::warn!(path = %self.path.display(), error = %err, "transcript rotation failed");
        }

        self.file.write_all(text.as_bytes()).await?;
        self.file.flush().await?;
        self.bytes = self.bytes.saturating_add(len);
        Ok(())
    }
}

/// Mirrors worker output into a file from one background writer.
///
/// Escape sequences are stripped; the file holds what `plain_text()` would show.
#[derive(Debug, Clone)]
pub struct Transcript {
    tx: mpsc::UnboundedSender<String>,
}

impl Transcript {
    /// Returns the handle and the writer future; the caller decides where it
    /// runs. The writer ends once every handle is dropped.
    pub fn open(
        path: &Path,
        max_bytes: u64,
        max_files: usize,
    ) -> (Self, impl Future<Output = ()> + Send + use<>) {
        let (tx, mut rx) = mpsc::unbounded_channel::<String>();
        let path = path.to_path_buf();

        let writer = async move {
            let mut file = match RotatingFile::open(path.clone(), max_bytes, max_files).await {
                Ok(f) => f,
                Err(err) => {
                    tracing::warn!(path = %path.display(), error = %err, "console transcript disabled");
                    return;
                }
            };
            tracing::debug!(path = %path.display(), "console transcript opened");
            while let Some(chunk) = rx.recv().await {
                if let Err(err) = file.write(&chunk).await {
                    tracing::warn!(path = %path.display(), error = %err, "transcript write failed");
                }
            }
        };

        (Self { tx }, writer)
    }

    pub fn record(&self, raw: &str) {
        let plain: String = parse_ansi(raw).into_iter().map(|r| r.text).collect();
        if !plain.is_empty() {
            let _ = self.tx.send(plain);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn write_lines(
        path: &Path,
        max_bytes: u64,
        max_files: usize,
        lines: std::ops::RangeInclusive<u32>,
    ) {
        let (transcript, writer) = Transcript::open(path, max_bytes, max_files);
        for i in lines {
            transcript.record(&format!("\u{1b}[32mline-{i}\u{1b}[0m\n"));
        }
        drop(transcript);
        writer.await;
    }

    fn read(path: impl AsRef<Path>) -> String {
        std::fs::read_to_string(path).unwrap()
    }

    #[tokio::test]
    async fn strips_escapes_and_appends_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("logs").join("console.log");

        write_lines(&path, 0, 3, 1..=2).await;
        write_lines(&path, 0, 3, 3..=3).await;

        assert_eq!(read(&path), "line-1\nline-2\nline-3\n");
    }

    #[tokio::test]
    async fn rotates_by_size_and_shifts_older_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("console.log");

        // "line-N\n" is 7 bytes; four fit under 32.
        write_lines(&path, 32, 2, 1..=10).await;

        assert_eq!(read(&path), "line-9\nline-10\n");
        assert_eq!(read(dir.path().join("console.log.1")), "line-5\nline-6\nline-7\nline-8\n");
        assert_eq!(read(dir.path().join("console.log.2")), "line-1\nline-2\nline-3\nline-4\n");
        assert!(!dir.path().join("console.log.3").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn failed_rename_keeps_writing_to_the_live_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("console.log");
        // A non-empty directory where the first rotated file should go.
        let rotated = dir.path().join("console.log.1");
        std::fs::create_dir(&rotated).unwrap();
        std::fs::write(rotated.join("keep"), b"x").unwrap();

        write_lines(&path, 16, 1, 1..=4).await;

        assert!(rotated.is_dir());
        assert!(read(&path).ends_with("line-4\n"));
    }

    #[tokio::test]
    async fn unopenable_path_disables_transcript_quietly() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, b"x").unwrap();

        let (transcript, writer) = Transcript::open(&blocker.join("console.log"), 0, 1);
        let task = tokio::spawn(writer);
        task.await.unwrap();
        transcript.record("still fine\n");
    }
}
