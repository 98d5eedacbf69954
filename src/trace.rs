//! Comparison log capture and replay (JSON Lines).
//!
//! One [`Comparison`] per line, in log order. Writing happens on a background
//! thread so the driver never blocks on disk.

use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::sync::mpsc;

use crate::state::Comparison;

#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("line {line}: {message}")]
    Parse { line: usize, message: String },
    #[error("serialization error: {0}")]
    Serde(String),
    #[error("comparison log channel closed")]
    Closed,
    #[error("comparison log worker failed: {0}")]
    Join(String),
}

pub trait ComparisonSink: Send + Sync {
    fn record(&self, comparison: &Comparison) -> Result<(), TraceError>;
}

#[derive(Clone)]
pub struct JsonlComparisonSink {
    sender: mpsc::Sender<Comparison>,
}

/// Owns the writer thread. `join` flushes and reports the first write error.
pub struct ComparisonLogWorker {
    handle: Option<std::thread::JoinHandle<Result<usize, TraceError>>>,
}

impl ComparisonLogWorker {
    /// Wait for all senders to drop, then return the number of lines written.
    pub fn join(mut self) -> Result<usize, TraceError> {
        match self.handle.take() {
            Some(handle) => match handle.join() {
                Ok(result) => result,
                Err(_) => Err(TraceError::Join("writer thread panicked".to_string())),
            },
            None => Ok(0),
        }
    }
}

impl JsonlComparisonSink {
    pub fn create(path: impl AsRef<Path>) -> Result<(Self, ComparisonLogWorker), TraceError> {
        let file = std::fs::File::create(path)?;
        let (sender, receiver) = mpsc::channel::<Comparison>();
        let handle = std::thread::spawn(move || write_log_loop(file, receiver));
        Ok((
            Self { sender },
            ComparisonLogWorker {
                handle: Some(handle),
            },
        ))
    }
}

impl ComparisonSink for JsonlComparisonSink {
    fn record(&self, comparison: &Comparison) -> Result<(), TraceError> {
        self.sender
            .send(comparison.clone())
            .map_err(|_| TraceError::Closed)
    }
}

fn write_log_loop(
    file: std::fs::File,
    receiver: mpsc::Receiver<Comparison>,
) -> Result<usize, TraceError> {
    let mut writer = BufWriter::new(file);
    let mut written = 0;
    for comparison in receiver {
        let line =
            serde_json::to_string(&comparison).map_err(|e| TraceError::Serde(e.to_string()))?;
        writeln!(writer, "{line}")?;
        written += 1;
    }
    writer.flush()?;
    Ok(written)
}

/// Load a log written by [`JsonlComparisonSink`]. Blank lines are ignored.
pub fn read_comparison_log(path: impl AsRef<Path>) -> Result<Vec<Comparison>, TraceError> {
    let reader = BufReader::new(std::fs::File::open(path)?);
    let mut log = Vec::new();
    for (idx, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let comparison = serde_json::from_str(&line).map_err(|e| TraceError::Parse {
            line: idx + 1,
            message: e.to_string(),
        })?;
        log.push(comparison);
    }
    Ok(log)
}

/// Write a whole log synchronously.
pub fn write_comparison_log(
    path: impl AsRef<Path>,
    log: &[Comparison],
) -> Result<(), TraceError> {
    let mut writer = BufWriter::new(std::fs::File::create(path)?);
    for comparison in log {
        let line =
            serde_json::to_string(comparison).map_err(|e| TraceError::Serde(e.to_string()))?;
        writeln!(writer, "{line}")?;
    }
    writer.flush()?;
    Ok(())
}
