//! Persistent conversion history.
//!
//! Every finished conversion is appended to `conversions.json` in the log
//! directory so statistics accumulate across runs.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::device::Device;
use crate::pool::{ConversionTask, TaskStatus};

/// File name of the history log inside the log directory.
pub const HISTORY_FILE: &str = "conversions.json";

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("Failed to access history {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to encode history: {0}")]
    Encode(#[from] serde_json::Error),
}

/// One finished conversion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionRecord {
    pub file_path: PathBuf,
    pub file_size: u64,
    /// Wall time from task start to end, in seconds.
    pub duration: f64,
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,
    pub use_gpu: bool,
    pub timestamp: DateTime<Utc>,
}

impl ConversionRecord {
    /// Record for a task that succeeded or failed. Stopped and unfinished
    /// tasks are not conversions and yield `None`.
    pub fn from_task(task: &ConversionTask, device: Device) -> Option<Self> {
        let success = match task.status() {
            TaskStatus::Succeeded => true,
            TaskStatus::Failed => false,
            _ => return None,
        };
        let duration = match (task.started_at(), task.ended_at()) {
            (Some(start), Some(end)) => (end - start).num_milliseconds().max(0) as f64 / 1000.0,
            _ => 0.0,
        };

        Some(Self {
            file_path: task.input_path().to_path_buf(),
            file_size: std::fs::metadata(task.input_path()).map(|m| m.len()).unwrap_or(0),
            duration,
            success,
            output_path: task.output_file().map(Path::to_path_buf),
            error_message: task.error().map(str::to_string),
            backend: task.backend_used().map(str::to_string),
            use_gpu: device.is_gpu(),
            timestamp: task.ended_at().unwrap_or_else(Utc::now),
        })
    }
}

/// Totals over every recorded conversion.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryStats {
    pub total_files: usize,
    pub successful: usize,
    pub failed: usize,
    /// Fraction of successful conversions, 0.0 to 1.0.
    pub success_rate: f64,
    pub total_size_mb: f64,
    pub total_time_seconds: f64,
    pub avg_time_per_file: f64,
}

/// Conversion log backed by a JSON file.
#[derive(Debug, Clone)]
pub struct History {
    path: PathBuf,
    records: Vec<ConversionRecord>,
}

impl History {
    /// Open the history in `log_dir`.
    ///
    /// A missing file is an empty history. An unreadable or corrupt file is
    /// logged and replaced on the next save.
    pub async fn open(log_dir: &Path) -> Self {
        let path = log_dir.join(HISTORY_FILE);
        let records = match tokio::fs::read_to_string(&path).await {
            Ok(text) => match serde_json::from_str(&text) {
                Ok(records) => records,
                Err(e) => {
                    tracing::warn!("Ignoring unreadable history {}: {}", path.display(), e);
                    Vec::new()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => {
                tracing::warn!("Failed to read history {}: {}", path.display(), e);
                Vec::new()
            }
        };
        Self { path, records }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &[ConversionRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn append(&mut self, record: ConversionRecord) {
        self.records.push(record);
    }

    /// Append records for every finished task of a run; returns how many.
    pub fn record_run(&mut self, tasks: &[ConversionTask], device: Device) -> usize {
        let before = self.records.len();
        self.records
            .extend(tasks.iter().filter_map(|t| ConversionRecord::from_task(t, device)));
        self.records.len() - before
    }

    pub fn statistics(&self) -> HistoryStats {
        let total_files = self.records.len();
        let successful = self.records.iter().filter(|r| r.success).count();
        let total_bytes: u64 = self.records.iter().map(|r| r.file_size).sum();
        let total_time: f64 = self.records.iter().map(|r| r.duration).sum();
        let per_file = |value: f64| {
            if total_files == 0 {
                0.0
            } else {
                value / total_files as f64
            }
        };

        HistoryStats {
            total_files,
            successful,
            failed: total_files - successful,
            success_rate: per_file(successful as f64),
            total_size_mb: total_bytes as f64 / (1024.0 * 1024.0),
            total_time_seconds: total_time,
            avg_time_per_file: per_file(total_time),
        }
    }

    /// Write the history back to disk as pretty JSON.
    pub async fn save(&self) -> Result<(), HistoryError> {
        let json = serde_json::to_string_pretty(&self.records)?;
        let io_error = |source| HistoryError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(io_error)?;
        }
        tokio::fs::write(&self.path, json).await.map_err(io_error)
    }
}
