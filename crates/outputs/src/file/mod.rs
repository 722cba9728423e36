//! File Output - JSON lines with size-based rotation
//!
//! Appends one JSON document per event to `<path>/<filename>`. Before a write
//! would push the active file past `rotate_every_kb`, files are shifted:
//!
//! ```text
//! beacon.5 → removed      (number_of_files = 6)
//! beacon.4 → beacon.5
//! ...
//! beacon   → beacon.1
//! (new)    → beacon
//! ```
//!
//! This is the only built-in output that stays enabled in dry-run mode.
//!
//! # Settings
//!
//! ```toml
//! [output.local]
//! type = "file"
//! path = "/var/log/beacon"
//! filename = "beacon"        # default: agent name
//! rotate_every_kb = 10240
//! number_of_files = 7
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use beacon_publisher::{Message, Output, OutputContext, OutputError, OutputFactory};
use serde::Deserialize;
use tokio::fs::{self, File, OpenOptions};
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;

#[cfg(test)]
#[path = "file_test.rs"]
mod tests;

/// Default size limit of the active file, in KiB
pub const DEFAULT_ROTATE_EVERY_KB: u64 = 10 * 1024;

/// Default number of files kept, active file included
pub const DEFAULT_NUMBER_OF_FILES: usize = 7;

/// Smallest accepted `number_of_files`
pub const MIN_NUMBER_OF_FILES: usize = 2;

/// Largest accepted `number_of_files`
pub const MAX_NUMBER_OF_FILES: usize = 1024;

/// Write buffer in front of the active file
const WRITE_BUFFER_SIZE: usize = 64 * 1024;

/// Raw `[output.<name>]` settings
#[derive(Debug, Deserialize)]
struct FileSettings {
    path: PathBuf,
    #[serde(default)]
    filename: Option<String>,
    #[serde(default = "default_rotate_every_kb")]
    rotate_every_kb: u64,
    #[serde(default = "default_number_of_files")]
    number_of_files: usize,
}

fn default_rotate_every_kb() -> u64 {
    DEFAULT_ROTATE_EVERY_KB
}

fn default_number_of_files() -> usize {
    DEFAULT_NUMBER_OF_FILES
}

/// Validated file output configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileConfig {
    /// Directory holding the files
    pub path: PathBuf,

    /// Name of the active file
    pub filename: String,

    /// Size limit of the active file, in bytes
    pub rotate_every_bytes: u64,

    /// Files kept, active file included
    pub number_of_files: usize,
}

impl FileConfig {
    /// Config with default rotation for `filename` under `path`
    pub fn new(path: impl Into<PathBuf>, filename: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            filename: filename.into(),
            rotate_every_bytes: DEFAULT_ROTATE_EVERY_KB * 1024,
            number_of_files: DEFAULT_NUMBER_OF_FILES,
        }
    }

    #[must_use]
    pub fn with_rotate_every_bytes(mut self, bytes: u64) -> Self {
        self.rotate_every_bytes = bytes;
        self
    }

    #[must_use]
    pub fn with_number_of_files(mut self, files: usize) -> Self {
        self.number_of_files = files;
        self
    }

    /// Build from output settings, defaulting the file name to `agent_name`
    pub fn from_context(ctx: &OutputContext<'_>) -> Result<Self, OutputError> {
        let settings: FileSettings = ctx.settings()?;
        let filename = settings
            .filename
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| ctx.agent_name.to_string());

        let config = Self {
            path: settings.path,
            filename,
            rotate_every_bytes: settings.rotate_every_kb.saturating_mul(1024),
            number_of_files: settings.number_of_files,
        };
        config.validate().map_err(|e| match e {
            OutputError::Config(msg) => OutputError::config(format!("output '{}': {msg}", ctx.output_name)),
            other => other,
        })?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), OutputError> {
        if self.path.as_os_str().is_empty() {
            return Err(OutputError::config("path must not be empty"));
        }
        if self.filename.contains(['/', '\\']) {
            return Err(OutputError::config(format!(
                "filename '{}' must not contain a path separator",
                self.filename
            )));
        }
        if self.rotate_every_bytes == 0 {
            return Err(OutputError::config("rotate_every_kb must be greater than 0"));
        }
        if !(MIN_NUMBER_OF_FILES..=MAX_NUMBER_OF_FILES).contains(&self.number_of_files) {
            return Err(OutputError::config(format!(
                "number_of_files must be between {MIN_NUMBER_OF_FILES} and {MAX_NUMBER_OF_FILES}, got {}",
                self.number_of_files
            )));
        }
        Ok(())
    }

    /// Path of the active file
    pub fn active_path(&self) -> PathBuf {
        self.path.join(&self.filename)
    }

    /// Path of the `n`-th rotated file (`n >= 1`)
    pub fn rotated_path(&self, n: usize) -> PathBuf {
        self.path.join(format!("{}.{n}", self.filename))
    }
}

/// File output metrics
#[derive(Debug, Default)]
pub struct FileMetrics {
    lines_written: AtomicU64,
    bytes_written: AtomicU64,
    rotations: AtomicU64,
    write_errors: AtomicU64,
}

impl FileMetrics {
    pub fn lines_written(&self) -> u64 {
        self.lines_written.load(Ordering::Relaxed)
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written.load(Ordering::Relaxed)
    }

    pub fn rotations(&self) -> u64 {
        self.rotations.load(Ordering::Relaxed)
    }

    pub fn write_errors(&self) -> u64 {
        self.write_errors.load(Ordering::Relaxed)
    }
}

/// Active file and its current size
#[derive(Default)]
struct ActiveFile {
    writer: Option<BufWriter<File>>,
    size: u64,
}

/// JSON-lines file output with rotation
pub struct FileOutput {
    config: FileConfig,
    active: Mutex<ActiveFile>,
    metrics: FileMetrics,
}

impl FileOutput {
    /// Create the output, creating the directory if needed
    ///
    /// The active file is opened on first write.
    pub fn new(config: FileConfig) -> Result<Self, OutputError> {
        config.validate()?;
        std::fs::create_dir_all(&config.path)?;
        Ok(Self {
            config,
            active: Mutex::new(ActiveFile::default()),
            metrics: FileMetrics::default(),
        })
    }

    pub fn config(&self) -> &FileConfig {
        &self.config
    }

    #[inline]
    pub fn metrics(&self) -> &FileMetrics {
        &self.metrics
    }

    async fn open(&self) -> Result<ActiveFile, OutputError> {
        let path = self.config.active_path();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        let size = file.metadata().await?.len();
        tracing::debug!(path = %path.display(), size, "opened output file");
        Ok(ActiveFile {
            writer: Some(BufWriter::with_capacity(WRITE_BUFFER_SIZE, file)),
            size,
        })
    }

    /// Shift rotated files up by one and move the active file to `.1`
    async fn rotate(&self, active: &mut ActiveFile) -> Result<(), OutputError> {
        if let Some(mut writer) = active.writer.take() {
            writer.flush().await?;
            writer.into_inner().sync_all().await?;
        }

        let oldest = self.config.rotated_path(self.config.number_of_files - 1);
        remove_if_exists(&oldest).await?;

        for n in (1..self.config.number_of_files - 1).rev() {
            rename_if_exists(&self.config.rotated_path(n), &self.config.rotated_path(n + 1)).await?;
        }
        rename_if_exists(&self.config.active_path(), &self.config.rotated_path(1)).await?;

        self.metrics.rotations.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(file = %self.config.active_path().display(), "rotated output file");

        *active = self.open().await?;
        Ok(())
    }

    async fn write_line(&self, active: &mut ActiveFile, line: &[u8]) -> Result<(), OutputError> {
        let len = line.len() as u64;
        if active.size > 0 && active.size + len > self.config.rotate_every_bytes {
            self.rotate(active).await?;
        }
        if active.writer.is_none() {
            *active = self.open().await?;
        }

        if let Some(writer) = active.writer.as_mut() {
            writer.write_all(line).await?;
        }
        active.size += len;
        self.metrics.lines_written.fetch_add(1, Ordering::Relaxed);
        self.metrics.bytes_written.fetch_add(len, Ordering::Relaxed);
        Ok(())
    }

    async fn write_batch(&self, batch: &[Message]) -> Result<(), OutputError> {
        let mut active = self.active.lock().await;
        let mut line = Vec::with_capacity(512);

        for event in batch.iter().flat_map(Message::events) {
            line.clear();
            serde_json::to_writer(&mut line, event)?;
            line.push(b'\n');
            self.write_line(&mut active, &line).await?;
        }

        if let Some(writer) = active.writer.as_mut() {
            writer.flush().await?;
        }
        Ok(())
    }
}

#[async_trait]
impl Output for FileOutput {
    async fn send(&self, batch: &[Message]) -> Result<(), OutputError> {
        self.write_batch(batch).await.inspect_err(|e| {
            self.metrics.write_errors.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(file = %self.config.active_path().display(), error = %e, "file write failed");
        })
    }

    async fn close(&self) -> Result<(), OutputError> {
        let mut active = self.active.lock().await;
        if let Some(mut writer) = active.writer.take() {
            writer.flush().await?;
            writer.into_inner().sync_all().await?;
        }
        tracing::info!(
            file = %self.config.active_path().display(),
            lines = self.metrics.lines_written(),
            rotations = self.metrics.rotations(),
            "file output closed"
        );
        Ok(())
    }
}

async fn remove_if_exists(path: &Path) -> Result<(), OutputError> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

async fn rename_if_exists(from: &Path, to: &Path) -> Result<(), OutputError> {
    match fs::rename(from, to).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Factory for `type = "file"`
#[derive(Debug, Default, Clone, Copy)]
pub struct FileFactory;

impl OutputFactory for FileFactory {
    fn create(&self, ctx: &OutputContext<'_>) -> Result<Arc<dyn Output>, OutputError> {
        let config = FileConfig::from_context(ctx)?;
        tracing::info!(
            output = %ctx.output_name,
            file = %config.active_path().display(),
            rotate_every_bytes = config.rotate_every_bytes,
            number_of_files = config.number_of_files,
            "file output created"
        );
        Ok(Arc::new(FileOutput::new(config)?))
    }

    fn name(&self) -> &'static str {
        "file"
    }

    fn dry_run_exempt(&self) -> bool {
        true
    }
}
