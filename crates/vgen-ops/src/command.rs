//! Media download through a yt-dlp style CLI tool.
//!
//! The child is spawned with piped output; a reader task scrapes progress
//! lines ("[download]  45.2% of ...") while polls check the exit status.
//! Success requires both exit code 0 and the output artifact on disk,
//! because yt-dlp can exit cleanly after downloading nothing.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use vgen_jobs::{AdapterError, Operation, OperationHandle};
use vgen_models::{JobKind, PollOutcome};

use crate::error::OpResult;

/// How many trailing stderr lines are kept for the failure message.
const STDERR_TAIL: usize = 5;

/// Downloader settings.
#[derive(Debug, Clone)]
pub struct DownloadConfig {
    /// Binary name or path, resolved through PATH at spawn time
    pub binary: String,
    /// Directory downloaded files are written to
    pub output_dir: PathBuf,
    /// Arguments inserted before the built-in ones
    pub extra_args: Vec<String>,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            binary: "yt-dlp".to_string(),
            output_dir: std::env::temp_dir(),
            extra_args: Vec::new(),
        }
    }
}

impl DownloadConfig {
    /// Read downloader settings from the environment.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            binary: std::env::var("DOWNLOADER_BIN").unwrap_or(defaults.binary),
            output_dir: std::env::var("DOWNLOADER_OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.output_dir),
            extra_args: Vec::new(),
        }
    }
}

/// One media download driven through the CLI tool.
pub struct DownloadOperation {
    config: DownloadConfig,
    url: String,
    output: PathBuf,
    child: Mutex<Option<Child>>,
    progress: Arc<AtomicU8>,
    stderr_tail: Arc<std::sync::Mutex<Vec<String>>>,
}

impl DownloadOperation {
    pub fn new(config: DownloadConfig, url: impl Into<String>) -> Self {
        let token = Uuid::new_v4().to_string();
        let output = config.output_dir.join(format!("{}.mp4", token));
        Self {
            config,
            url: url.into(),
            output,
            child: Mutex::new(None),
            progress: Arc::new(AtomicU8::new(0)),
            stderr_tail: Arc::new(std::sync::Mutex::new(Vec::new())),
        }
    }

    /// Where the artifact will land.
    pub fn output_path(&self) -> &PathBuf {
        &self.output
    }

    async fn spawn(&self) -> OpResult<()> {
        let binary = which::which(&self.config.binary)?;

        let mut child = Command::new(binary)
            .args(&self.config.extra_args)
            .arg("--newline")
            .arg("--no-playlist")
            .arg("-o")
            .arg(&self.output)
            .arg(&self.url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(stdout) = child.stdout.take() {
            let progress = Arc::clone(&self.progress);
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    if let Some(value) = parse_progress_line(&line) {
                        progress.fetch_max(value, Ordering::SeqCst);
                    }
                }
            });
        }
        if let Some(stderr) = child.stderr.take() {
            let tail = Arc::clone(&self.stderr_tail);
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    let mut tail = tail.lock().unwrap();
                    if tail.len() >= STDERR_TAIL {
                        tail.remove(0);
                    }
                    tail.push(line);
                }
            });
        }

        *self.child.lock().await = Some(child);
        Ok(())
    }

    fn failure_message(&self, code: Option<i32>) -> String {
        let tail = self.stderr_tail.lock().unwrap().join("; ");
        match (code, tail.is_empty()) {
            (Some(code), false) => format!("downloader exited with code {}: {}", code, tail),
            (Some(code), true) => format!("downloader exited with code {}", code),
            (None, false) => format!("downloader killed by signal: {}", tail),
            (None, true) => "downloader killed by signal".to_string(),
        }
    }
}

#[async_trait]
impl Operation for DownloadOperation {
    fn kind(&self) -> JobKind {
        JobKind::MediaDownload
    }

    async fn start(&self) -> Result<OperationHandle, AdapterError> {
        self.spawn()
            .await
            .map_err(|e| AdapterError::start(e.to_string()))?;
        debug!(url = %self.url, output = %self.output.display(), "Download started");
        Ok(OperationHandle::new(
            self.output
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or("download")
                .to_string(),
        ))
    }

    async fn poll(&self, _handle: &OperationHandle) -> Result<PollOutcome, AdapterError> {
        let mut guard = self.child.lock().await;
        let child = guard
            .as_mut()
            .ok_or_else(|| AdapterError::poll("download was never started"))?;

        match child.try_wait() {
            Ok(None) => Ok(PollOutcome::pending(Some(
                self.progress.load(Ordering::SeqCst),
            ))),
            Ok(Some(status)) if status.success() => {
                if tokio::fs::try_exists(&self.output).await.unwrap_or(false) {
                    Ok(PollOutcome::completed(self.output.display().to_string()))
                } else {
                    Ok(PollOutcome::failed(
                        "downloader exited cleanly but produced no file",
                    ))
                }
            }
            Ok(Some(status)) => Ok(PollOutcome::failed(self.failure_message(status.code()))),
            Err(e) => Err(AdapterError::poll(format!(
                "failed to check downloader: {}",
                e
            ))),
        }
    }

    async fn cancel(&self, _handle: &OperationHandle) -> Result<(), AdapterError> {
        let mut guard = self.child.lock().await;
        if let Some(child) = guard.as_mut() {
            if let Err(e) = child.kill().await {
                // Already exited on its own
                warn!(url = %self.url, "Kill failed: {}", e);
            }
        }
        Ok(())
    }
}

/// Extract a percentage from a yt-dlp progress line.
///
/// Lines look like `[download]  45.2% of 10.00MiB at 2.00MiB/s ETA 00:05`.
fn parse_progress_line(line: &str) -> Option<u8> {
    let rest = line.trim_start().strip_prefix("[download]")?;
    let token = rest.split_whitespace().find(|t| t.ends_with('%'))?;
    let value: f64 = token.trim_end_matches('%').parse().ok()?;
    Some(value.clamp(0.0, 100.0) as u8)
}
