//! Concurrent conversion worker pool.
//!
//! Tasks are submitted up front, then a single `run` drives them through a
//! bounded set of tokio workers. Each worker claims the next task from the
//! queue, resolves it through the backend chain on the blocking thread pool,
//! writes the Markdown output and reports progress. `stop` may be called from
//! anywhere at any time; tasks not yet begun, and tasks whose backend call was
//! still in flight, end `Stopped`.

mod error;
mod queue;
mod registry;
mod task;
mod types;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::backend::{Backend, BackendChain, BackendResult, ChainObserver, ExtractOptions};
use crate::cancel::{AbortSignal, CancellationToken};
use crate::device::{self, Device, DevicePreference, DeviceProbe};
use crate::output;

pub use error::PoolError;
pub use queue::{SharedTask, TaskQueue};
pub use registry::ActiveInvocations;
pub use task::{ConversionTask, InvalidTransition, TaskStatus};
pub use types::{BatchRun, PoolEvent, StatusSnapshot, TaskSnapshot};

use queue::lock;

type ProgressFn = dyn Fn(f64, &str) + Send + Sync;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RunPhase {
    Idle,
    Running,
    Finished,
}

struct Inner {
    chain: BackendChain,
    probe: Arc<dyn DeviceProbe>,
    token: CancellationToken,
    registry: ActiveInvocations,
    tasks: Mutex<Vec<SharedTask>>,
    phase: Mutex<RunPhase>,
    events: Option<mpsc::Sender<PoolEvent>>,
}

impl Inner {
    async fn emit(&self, event: PoolEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event).await;
        }
    }
}

/// Bounded pool converting submitted documents through a backend chain.
///
/// Clones share the same pool, so one clone can `stop` while another awaits `run`.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<Inner>,
}

/// Marks the run finished however `run` exits.
struct PhaseGuard<'a>(&'a Mutex<RunPhase>);

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        *lock(self.0) = RunPhase::Finished;
    }
}

/// Stops the run and aborts its workers if `run` is dropped before they
/// are joined, settling every unfinished task to `Stopped`.
struct WorkerGuard {
    inner: Arc<Inner>,
    tasks: Vec<SharedTask>,
    handles: Vec<JoinHandle<()>>,
    joined: bool,
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        if self.joined {
            return;
        }
        tracing::warn!("Run dropped before its workers finished; aborting them");
        self.inner.registry.abort_all();
        for handle in &self.handles {
            handle.abort();
        }
        for task in &self.tasks {
            let mut task = lock(task);
            if !task.status().is_terminal() {
                let _ = task.stop();
            }
        }
    }
}

impl WorkerPool {
    pub fn new(chain: BackendChain, probe: impl DeviceProbe + 'static) -> Self {
        let token = CancellationToken::new();
        Self {
            inner: Arc::new(Inner {
                chain,
                probe: Arc::new(probe),
                registry: ActiveInvocations::new(token.clone()),
                token,
                tasks: Mutex::new(Vec::new()),
                phase: Mutex::new(RunPhase::Idle),
                events: None,
            }),
        }
    }

    /// Emit [`PoolEvent`]s on `tx` during the run.
    ///
    /// Must be called before the pool is cloned; later calls on a shared pool
    /// are ignored.
    pub fn with_events(mut self, tx: mpsc::Sender<PoolEvent>) -> Self {
        match Arc::get_mut(&mut self.inner) {
            Some(inner) => inner.events = Some(tx),
            None => tracing::warn!("Pool already shared, event channel not attached"),
        }
        self
    }

    /// Queue a document for conversion, written as `<output_dir>/<stem>.md`.
    pub fn submit(
        &self,
        input_path: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        options: ExtractOptions,
    ) -> Result<Uuid, PoolError> {
        self.enqueue(ConversionTask::new(input_path.into(), output_dir.into(), options))
    }

    /// Queue a document whose output mirrors `relative_path` under `output_dir`.
    pub fn submit_relative(
        &self,
        input_path: impl Into<PathBuf>,
        relative_path: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
        options: ExtractOptions,
    ) -> Result<Uuid, PoolError> {
        let task = ConversionTask::new(input_path.into(), output_dir.into(), options)
            .with_relative_path(relative_path.into());
        self.enqueue(task)
    }

    fn enqueue(&self, task: ConversionTask) -> Result<Uuid, PoolError> {
        let phase = lock(&self.inner.phase);
        if *phase != RunPhase::Idle {
            return Err(PoolError::RunInProgress);
        }

        let output = task.output_path();
        let mut tasks = lock(&self.inner.tasks);
        if tasks.iter().any(|t| lock(t).output_path() == output) {
            return Err(PoolError::DuplicateOutput(output));
        }

        let id = task.id();
        tasks.push(Arc::new(Mutex::new(task)));
        Ok(id)
    }

    /// Request a stop. Idempotent and safe to call from any thread.
    pub fn stop(&self) {
        if self.inner.registry.abort_all() {
            tracing::info!("Stop requested");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.inner.token.is_cancelled()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.tasks).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies of every task in submission order.
    pub fn tasks(&self) -> Vec<ConversionTask> {
        lock(&self.inner.tasks)
            .iter()
            .map(|t| lock(t).clone())
            .collect()
    }

    /// Current status of all tasks.
    pub fn snapshot(&self) -> StatusSnapshot {
        let tasks = lock(&self.inner.tasks)
            .iter()
            .map(|t| TaskSnapshot::from(&*lock(t)))
            .collect();
        StatusSnapshot::from_tasks(tasks)
    }

    /// Execute every submitted task, returning once all workers have exited.
    ///
    /// `on_progress(percent, message)` is called after each task that
    /// succeeds or fails, serialized across workers so percentages never
    /// decrease.
    pub async fn run<F>(
        &self,
        max_workers: usize,
        preference: DevicePreference,
        on_progress: F,
    ) -> Result<BatchRun, PoolError>
    where
        F: Fn(f64, &str) + Send + Sync + 'static,
    {
        {
            let mut phase = lock(&self.inner.phase);
            match *phase {
                RunPhase::Running => return Err(PoolError::ConcurrentRun),
                RunPhase::Finished => return Err(PoolError::AlreadyFinished),
                RunPhase::Idle => {}
            }
            if max_workers == 0 {
                return Err(PoolError::InvalidWorkerCount);
            }
            *phase = RunPhase::Running;
        }
        let _phase = PhaseGuard(&self.inner.phase);

        let tasks: Vec<SharedTask> = lock(&self.inner.tasks).clone();
        let total = tasks.len();
        let mut guard = WorkerGuard {
            inner: self.inner.clone(),
            tasks: tasks.clone(),
            handles: Vec::new(),
            joined: false,
        };

        let probe = self.inner.probe.clone();
        let gpu_available = tokio::task::spawn_blocking(move || probe.is_gpu_available())
            .await
            .unwrap_or(false);
        let device = device::select(preference, gpu_available);

        let workers = max_workers.min(total);
        tracing::info!(
            "Starting run: {} tasks, {} workers, device {}",
            total,
            workers,
            device
        );

        let counters = Arc::new(Mutex::new(BatchRun::new(total, device)));
        self.inner
            .emit(PoolEvent::RunStarted {
                total,
                workers,
                device,
            })
            .await;

        let queue = Arc::new(TaskQueue::new(tasks.clone()));
        let on_progress: Arc<ProgressFn> = Arc::new(on_progress);

        guard.handles = (0..workers)
            .map(|worker_id| {
                let inner = self.inner.clone();
                let queue = queue.clone();
                let counters = counters.clone();
                let on_progress = on_progress.clone();
                tokio::spawn(async move {
                    while let Some(task) = queue.next() {
                        let (status, message) = process_task(&inner, &task, device).await;
                        tracing::debug!("Worker {} finished task: {}", worker_id, message);

                        {
                            let mut run = lock(&counters);
                            run.record(status);
                            if matches!(status, TaskStatus::Succeeded | TaskStatus::Failed) {
                                on_progress(run.percent_complete(), &message);
                            }
                        }
                    }
                })
            })
            .collect();

        for result in futures::future::join_all(guard.handles.iter_mut()).await {
            if let Err(e) = result {
                tracing::error!("Worker panicked: {}", e);
            }
        }
        guard.joined = true;

        // A panicked worker can leave its task behind; settle it so no task
        // outlives the run in a non-terminal state.
        for task in &tasks {
            let mut task = lock(task);
            let settled = match task.status() {
                TaskStatus::Pending => task.stop(),
                TaskStatus::Running => task.fail("worker terminated unexpectedly"),
                _ => continue,
            };
            if settled.is_ok() {
                lock(&counters).record(task.status());
            }
        }

        let run = {
            let mut run = lock(&counters);
            run.ended_at = Some(chrono::Utc::now());
            run.clone()
        };
        tracing::info!(
            "Run finished: {} succeeded, {} failed, {} stopped",
            run.succeeded,
            run.failed,
            run.stopped
        );
        self.inner
            .emit(PoolEvent::RunFinished { run: run.clone() })
            .await;

        Ok(run)
    }
}

/// Apply a transition, logging if the task was already past it.
fn transition(
    task: &SharedTask,
    apply: impl FnOnce(&mut ConversionTask) -> Result<(), InvalidTransition>,
) {
    let mut task = lock(task);
    if let Err(e) = apply(&mut task) {
        tracing::warn!("Task {}: {}", task.id(), e);
    }
}

/// Run one task to a terminal state.
async fn process_task(inner: &Arc<Inner>, task: &SharedTask, device: Device) -> (TaskStatus, String) {
    let (task_id, filename) = {
        let t = lock(task);
        (t.id(), t.filename())
    };

    if inner.token.is_cancelled() {
        transition(task, ConversionTask::stop);
        inner
            .emit(PoolEvent::TaskStopped { task_id, filename: filename.clone() })
            .await;
        return (TaskStatus::Stopped, format!("Stopped {}", filename));
    }

    let (input, output_path, options) = {
        let mut t = lock(task);
        if let Err(e) = t.start() {
            tracing::warn!("Task {}: {}", task_id, e);
            return (t.status(), format!("Skipped {}", filename));
        }
        (t.input_path().to_path_buf(), t.output_path(), t.options().clone())
    };
    inner
        .emit(PoolEvent::TaskStarted { task_id, filename: filename.clone() })
        .await;

    let result = {
        let inner = inner.clone();
        let task = task.clone();
        let input = input.clone();
        tokio::task::spawn_blocking(move || {
            let observer = TaskObserver::new(&inner, &task, task_id);
            inner.chain.resolve_observed(&input, &options, device, &observer)
        })
        .await
        .unwrap_or_else(|e| BackendResult {
            success: false,
            text: None,
            backend_name: String::new(),
            duration_ms: 0,
            error: Some(format!("backend call panicked: {}", e)),
            details: Vec::new(),
        })
    };

    transition(task, |t| t.record_attempts(result.details.clone()));

    if inner.token.is_cancelled() {
        tracing::debug!("Discarding result for {} after stop", filename);
        transition(task, ConversionTask::stop);
        inner
            .emit(PoolEvent::TaskStopped { task_id, filename: filename.clone() })
            .await;
        return (TaskStatus::Stopped, format!("Stopped {}", filename));
    }

    let outcome = match result.text.as_deref() {
        Some(text) if result.success => output::write_markdown(&input, &output_path, text)
            .await
            .map(|()| output_path.clone())
            .map_err(|e| format!("failed to write output: {}", e)),
        _ => Err(result.describe_failure()),
    };

    match outcome {
        Ok(path) => {
            transition(task, |t| t.succeed(&result.backend_name, path.clone()));
            tracing::info!("Converted {} with {}", filename, result.backend_name);
            inner
                .emit(PoolEvent::TaskSucceeded {
                    task_id,
                    filename: filename.clone(),
                    backend: result.backend_name.clone(),
                    output_file: path,
                    duration_ms: result.duration_ms,
                })
                .await;
            (
                TaskStatus::Succeeded,
                format!("Converted {} ({})", filename, result.backend_name),
            )
        }
        Err(error) => {
            tracing::warn!("Failed {}: {}", filename, error);
            transition(task, |t| t.fail(error.clone()));
            inner
                .emit(PoolEvent::TaskFailed {
                    task_id,
                    filename: filename.clone(),
                    error: error.clone(),
                })
                .await;
            (TaskStatus::Failed, format!("Failed {}: {}", filename, error))
        }
    }
}

/// Connects one task's chain resolution to the pool's stop machinery.
struct TaskObserver<'a> {
    inner: &'a Inner,
    task: &'a SharedTask,
    task_id: Uuid,
    current: Mutex<Option<u64>>,
}

impl<'a> TaskObserver<'a> {
    fn new(inner: &'a Inner, task: &'a SharedTask, task_id: Uuid) -> Self {
        Self {
            inner,
            task,
            task_id,
            current: Mutex::new(None),
        }
    }
}

impl ChainObserver for TaskObserver<'_> {
    fn before_attempt(&self, index: usize, total: usize, backend: &dyn Backend) -> Option<AbortSignal> {
        if self.inner.token.is_cancelled() {
            return None;
        }

        let progress = (index * 100 / total.max(1)) as u8;
        transition(self.task, |t| t.set_progress(progress));

        if !backend.supports_abort() {
            return Some(AbortSignal::new());
        }
        let (id, signal) = self.inner.registry.register(self.task_id, backend.name());
        *lock(&self.current) = Some(id);
        Some(signal)
    }

    fn after_attempt(&self, _index: usize, _backend: &dyn Backend) {
        if let Some(id) = lock(&self.current).take() {
            self.inner.registry.unregister(id);
        }
    }
}
