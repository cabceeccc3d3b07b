//! Conversion task state.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::backend::{AttemptFailure, ExtractOptions};
use crate::output;

/// Lifecycle status of a conversion task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Succeeded,
    Failed,
    Stopped,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Running => "running",
            TaskStatus::Succeeded => "succeeded",
            TaskStatus::Failed => "failed",
            TaskStatus::Stopped => "stopped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Succeeded | TaskStatus::Failed | TaskStatus::Stopped
        )
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rejected status change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("invalid task transition from {from} to {to}")]
pub struct InvalidTransition {
    pub from: TaskStatus,
    pub to: TaskStatus,
}

/// One document to convert.
///
/// Status only moves forward: `Pending -> Running -> {Succeeded, Failed, Stopped}`
/// or `Pending -> Stopped`. Terminal tasks reject every further change.
#[derive(Debug, Clone)]
pub struct ConversionTask {
    id: Uuid,
    input_path: PathBuf,
    /// Input path relative to the root it was discovered under.
    relative_path: PathBuf,
    output_dir: PathBuf,
    options: ExtractOptions,
    status: TaskStatus,
    progress: u8,
    started_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    error: Option<String>,
    backend_used: Option<String>,
    output_file: Option<PathBuf>,
    attempts: Vec<AttemptFailure>,
}

impl ConversionTask {
    pub fn new(input_path: PathBuf, output_dir: PathBuf, options: ExtractOptions) -> Self {
        let relative_path = input_path
            .file_name()
            .map(PathBuf::from)
            .unwrap_or_else(|| input_path.clone());
        Self {
            id: Uuid::new_v4(),
            input_path,
            relative_path,
            output_dir,
            options,
            status: TaskStatus::Pending,
            progress: 0,
            started_at: None,
            ended_at: None,
            error: None,
            backend_used: None,
            output_file: None,
            attempts: Vec::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn input_path(&self) -> &Path {
        &self.input_path
    }

    /// Mirror `relative_path` under the output directory instead of using
    /// the bare file name.
    pub fn with_relative_path(mut self, relative_path: PathBuf) -> Self {
        self.relative_path = relative_path;
        self
    }

    pub fn relative_path(&self) -> &Path {
        &self.relative_path
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Where the Markdown for this task is written.
    pub fn output_path(&self) -> PathBuf {
        output::output_path(&self.relative_path, &self.output_dir)
    }

    pub fn options(&self) -> &ExtractOptions {
        &self.options
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn progress(&self) -> u8 {
        self.progress
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn backend_used(&self) -> Option<&str> {
        self.backend_used.as_deref()
    }

    pub fn output_file(&self) -> Option<&Path> {
        self.output_file.as_deref()
    }

    pub fn attempts(&self) -> &[AttemptFailure] {
        &self.attempts
    }

    /// File name of the input, used in messages and status exports.
    pub fn filename(&self) -> String {
        self.input_path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.input_path.display().to_string())
    }

    fn check(&self, allowed: &[TaskStatus], to: TaskStatus) -> Result<(), InvalidTransition> {
        if allowed.contains(&self.status) {
            Ok(())
        } else {
            Err(InvalidTransition {
                from: self.status,
                to,
            })
        }
    }

    /// Pending -> Running.
    pub fn start(&mut self) -> Result<(), InvalidTransition> {
        self.check(&[TaskStatus::Pending], TaskStatus::Running)?;
        self.status = TaskStatus::Running;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Raise progress of a running task. Lower values are ignored.
    pub fn set_progress(&mut self, progress: u8) -> Result<(), InvalidTransition> {
        self.check(&[TaskStatus::Running], TaskStatus::Running)?;
        self.progress = self.progress.max(progress.min(100));
        Ok(())
    }

    pub fn record_attempts(&mut self, attempts: Vec<AttemptFailure>) -> Result<(), InvalidTransition> {
        self.check(&[TaskStatus::Running], TaskStatus::Running)?;
        self.attempts = attempts;
        Ok(())
    }

    /// Running -> Succeeded.
    pub fn succeed(&mut self, backend: &str, output_file: PathBuf) -> Result<(), InvalidTransition> {
        self.check(&[TaskStatus::Running], TaskStatus::Succeeded)?;
        self.status = TaskStatus::Succeeded;
        self.progress = 100;
        self.backend_used = Some(backend.to_string());
        self.output_file = Some(output_file);
        self.ended_at = Some(Utc::now());
        Ok(())
    }

    /// Running -> Failed.
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), InvalidTransition> {
        self.check(&[TaskStatus::Running], TaskStatus::Failed)?;
        self.status = TaskStatus::Failed;
        self.error = Some(error.into());
        self.ended_at = Some(Utc::now());
        Ok(())
    }

    /// Pending or Running -> Stopped.
    pub fn stop(&mut self) -> Result<(), InvalidTransition> {
        self.check(&[TaskStatus::Pending, TaskStatus::Running], TaskStatus::Stopped)?;
        self.status = TaskStatus::Stopped;
        self.ended_at = Some(Utc::now());
        Ok(())
    }
}
