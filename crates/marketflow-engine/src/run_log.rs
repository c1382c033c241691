//! Accumulated per-run log text
//!
//! Every line is emitted through `tracing` and kept in memory; the buffer
//! becomes the `logs` column of the run record. With a log folder
//! configured, lines are also mirrored into `<pipeline>_<timestamp>.log`.

use chrono::Utc;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
    Error,
}

impl LogLevel {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warn => "WARNING",
            Self::Error => "ERROR",
        }
    }
}

/// Log of one run
#[derive(Debug)]
pub struct RunLog {
    pipeline: String,
    lines: Vec<String>,
    file: Option<(PathBuf, File)>,
}

impl RunLog {
    pub fn new(pipeline: impl Into<String>) -> Self {
        Self {
            pipeline: pipeline.into(),
            lines: Vec::new(),
            file: None,
        }
    }

    /// Also write lines to a new file under `folder`
    pub fn with_folder(pipeline: impl Into<String>, folder: &Path) -> std::io::Result<Self> {
        let mut log = Self::new(pipeline);
        std::fs::create_dir_all(folder)?;
        let path = folder.join(format!(
            "{}_{}.log",
            log.pipeline,
            Utc::now().format("%Y%m%d_%H%M%S_%3f")
        ));
        let file = File::create(&path)?;
        log.file = Some((path, file));
        Ok(log)
    }

    /// Mirror file, when one is open
    pub fn path(&self) -> Option<&Path> {
        self.file.as_ref().map(|(path, _)| path.as_path())
    }

    pub fn info(&mut self, message: impl AsRef<str>) {
        tracing::info!(pipeline = %self.pipeline, "{}", message.as_ref());
        self.push(LogLevel::Info, message.as_ref());
    }

    pub fn warn(&mut self, message: impl AsRef<str>) {
        tracing::warn!(pipeline = %self.pipeline, "{}", message.as_ref());
        self.push(LogLevel::Warn, message.as_ref());
    }

    pub fn error(&mut self, message: impl AsRef<str>) {
        tracing::error!(pipeline = %self.pipeline, "{}", message.as_ref());
        self.push(LogLevel::Error, message.as_ref());
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Full log text, one line per entry
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }

    fn push(&mut self, level: LogLevel, message: &str) {
        let line = format!(
            "[{}] - {} - {}",
            Utc::now().format("%Y-%m-%d %H:%M:%S%.3f"),
            level.as_str(),
            message
        );

        let failed = match &mut self.file {
            Some((path, file)) => match writeln!(file, "{}", line) {
                Ok(()) => false,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Stopped mirroring run log");
                    true
                }
            },
            None => false,
        };
        if failed {
            self.file = None;
        }

        self.lines.push(line);
    }
}
