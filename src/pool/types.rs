//! Pool run results, events and status export.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task::{ConversionTask, TaskStatus};
use crate::device::Device;

/// Counters for one run of the pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRun {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub stopped: usize,
    pub device_used: Device,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
}

impl BatchRun {
    pub fn new(total: usize, device_used: Device) -> Self {
        Self {
            total,
            succeeded: 0,
            failed: 0,
            stopped: 0,
            device_used,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Tasks that reached a terminal state.
    pub fn finished(&self) -> usize {
        self.succeeded + self.failed + self.stopped
    }

    pub fn percent_complete(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        100.0 * self.finished() as f64 / self.total as f64
    }

    pub fn elapsed(&self) -> chrono::Duration {
        self.ended_at.unwrap_or_else(Utc::now) - self.started_at
    }

    pub(crate) fn record(&mut self, status: TaskStatus) {
        match status {
            TaskStatus::Succeeded => self.succeeded += 1,
            TaskStatus::Failed => self.failed += 1,
            TaskStatus::Stopped => self.stopped += 1,
            TaskStatus::Pending | TaskStatus::Running => {}
        }
    }
}

/// Events emitted while a run is in progress.
#[derive(Debug, Clone)]
pub enum PoolEvent {
    /// Run started with `workers` executors on `device`
    RunStarted {
        total: usize,
        workers: usize,
        device: Device,
    },
    TaskStarted { task_id: Uuid, filename: String },
    TaskSucceeded {
        task_id: Uuid,
        filename: String,
        backend: String,
        output_file: PathBuf,
        duration_ms: u64,
    },
    TaskFailed {
        task_id: Uuid,
        filename: String,
        error: String,
    },
    TaskStopped { task_id: Uuid, filename: String },
    /// Run complete (all workers joined)
    RunFinished { run: BatchRun },
}

/// Exported view of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskSnapshot {
    pub filename: String,
    pub status: TaskStatus,
    pub progress: u8,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend_used: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&ConversionTask> for TaskSnapshot {
    fn from(task: &ConversionTask) -> Self {
        Self {
            filename: task.filename(),
            status: task.status(),
            progress: task.progress(),
            started_at: task.started_at(),
            ended_at: task.ended_at(),
            backend_used: task.backend_used().map(str::to_string),
            error: task.error().map(str::to_string),
        }
    }
}

/// Serializable status of every task in a pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub stopped: usize,
    pub tasks: Vec<TaskSnapshot>,
}

impl StatusSnapshot {
    pub fn from_tasks(tasks: Vec<TaskSnapshot>) -> Self {
        let count = |status| tasks.iter().filter(|t| t.status == status).count();
        Self {
            total: tasks.len(),
            succeeded: count(TaskStatus::Succeeded),
            failed: count(TaskStatus::Failed),
            stopped: count(TaskStatus::Stopped),
            tasks,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Write the snapshot as pretty JSON to `path`.
    pub async fn write_to(&self, path: &Path) -> std::io::Result<()> {
        let json = self.to_json().map_err(std::io::Error::other)?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, json).await
    }
}
