//! Structured logging
//!
//! Installs the global `tracing` subscriber: JSON or text output, level filtering
//! (overridable through `RUST_LOG`) and an optional size-rotated log file.

use crate::core::config::LoggingConfig;
use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Keeps the non-blocking writer alive for the lifetime of the process
pub struct Logger {
    _guard: WorkerGuard,
}

impl Logger {
    /// Initialize the logging system based on configuration
    pub fn init(config: &LoggingConfig) -> Result<Self> {
        let level = parse_log_level(&config.level)?;

        let env_filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(level.as_str()));

        let (writer, guard) = match config.output.as_str() {
            "stdout" => tracing_appender::non_blocking(std::io::stdout()),
            "file" => {
                let log_file = config
                    .log_file
                    .as_ref()
                    .context("log_file must be specified when output is 'file'")?;

                if let Some(parent) = log_file.parent() {
                    std::fs::create_dir_all(parent).context("Failed to create log directory")?;
                }

                let appender = SizeRotatingFile::open(
                    log_file.clone(),
                    config.max_file_size,
                    config.max_backups,
                )
                .with_context(|| format!("Failed to open log file {}", log_file.display()))?;

                tracing_appender::non_blocking(appender)
            }
            other => anyhow::bail!("Invalid output configuration: {}", other),
        };

        let fmt_layer = match config.format.as_str() {
            "json" => fmt::layer()
                .json()
                .with_writer(writer)
                .with_span_events(FmtSpan::CLOSE)
                .with_current_span(true)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .boxed(),
            "text" => fmt::layer()
                .with_writer(writer)
                .with_span_events(FmtSpan::CLOSE)
                .with_target(true)
                .with_file(true)
                .with_line_number(true)
                .boxed(),
            other => anyhow::bail!("Invalid format configuration: {}", other),
        };

        tracing_subscriber::registry()
            .with(env_filter)
            .with(fmt_layer)
            .try_init()
            .context("Failed to initialize tracing subscriber")?;

        tracing::info!(
            level = %config.level,
            format = %config.format,
            output = %config.output,
            "Logging system initialized"
        );

        Ok(Logger { _guard: guard })
    }
}

/// Parse log level string to tracing Level
fn parse_log_level(level: &str) -> Result<Level> {
    match level.to_lowercase().as_str() {
        "debug" => Ok(Level::DEBUG),
        "info" => Ok(Level::INFO),
        "warn" => Ok(Level::WARN),
        "error" => Ok(Level::ERROR),
        _ => anyhow::bail!("Invalid log level: {}", level),
    }
}

/// Log file that rolls over to `name.1`, `name.2`, ... once it grows past `max_size`
///
/// Owned by the non-blocking worker thread, so no interior locking is needed.
pub struct SizeRotatingFile {
    path: PathBuf,
    max_size: usize,
    max_backups: usize,
    file: File,
    written: usize,
}

impl SizeRotatingFile {
    pub fn open(path: PathBuf, max_size: usize, max_backups: usize) -> std::io::Result<Self> {
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let written = file.metadata()?.len() as usize;
        Ok(Self {
            path,
            max_size,
            max_backups,
            file,
            written,
        })
    }

    fn backup_path(&self, index: usize) -> PathBuf {
        backup_path_for(&self.path, index)
    }

    fn rotate(&mut self) -> std::io::Result<()> {
        self.file.flush()?;

        // Shift name.(n-1) -> name.n, dropping the oldest
        for i in (1..self.max_backups).rev() {
            let from = self.backup_path(i);
            if from.exists() {
                std::fs::rename(&from, self.backup_path(i + 1))?;
            }
        }
        if self.max_backups > 0 {
            std::fs::rename(&self.path, self.backup_path(1))?;
        } else {
            std::fs::remove_file(&self.path)?;
        }

        self.file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

fn backup_path_for(path: &Path, index: usize) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(format!(".{}", index));
    PathBuf::from(name)
}

impl Write for SizeRotatingFile {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        if self.written > 0 && self.written + buf.len() > self.max_size {
            self.rotate()?;
        }
        let n = self.file.write(buf)?;
        self.written += n;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.file.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_log_level() {
        assert!(matches!(parse_log_level("debug"), Ok(Level::DEBUG)));
        assert!(matches!(parse_log_level("INFO"), Ok(Level::INFO)));
        assert!(matches!(parse_log_level("warn"), Ok(Level::WARN)));
        assert!(matches!(parse_log_level("error"), Ok(Level::ERROR)));
        assert!(parse_log_level("verbose").is_err());
    }

    #[test]
    fn test_backup_paths() {
        let path = PathBuf::from("/tmp/logs/leaf.log");
        assert_eq!(backup_path_for(&path, 1), PathBuf::from("/tmp/logs/leaf.log.1"));
        assert_eq!(backup_path_for(&path, 3), PathBuf::from("/tmp/logs/leaf.log.3"));
    }

    #[test]
    fn test_rotation_keeps_bounded_backups() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("leaf.log");
        let mut appender = SizeRotatingFile::open(path.clone(), 16, 2).unwrap();

        for _ in 0..5 {
            appender.write_all(b"0123456789abcdef").unwrap();
        }
        appender.flush().unwrap();

        assert!(path.exists());
        assert!(dir.path().join("leaf.log.1").exists());
        assert!(dir.path().join("leaf.log.2").exists());
        assert!(!dir.path().join("leaf.log.3").exists());
        assert_eq!(std::fs::read(&path).unwrap().len(), 16);
    }
}
