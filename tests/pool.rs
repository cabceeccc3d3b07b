//! Worker pool integration tests
//!
//! Drives full runs with in-process backends and checks task outcomes,
//! progress reporting, stop behaviour and run-control errors.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use docbatch::{
    Backend, BackendChain, BackendError, Device, DevicePreference, ExtractContext, ExtractOptions,
    FixedProbe, PoolError, PoolEvent, TaskStatus, WorkerPool,
};

/// Returns `converted <stem>`, optionally after a delay.
struct Echo {
    delay: Duration,
    calls: Arc<AtomicUsize>,
    devices: Arc<Mutex<Vec<Device>>>,
}

impl Echo {
    fn new() -> Self {
        Self::slow(Duration::ZERO)
    }

    fn slow(delay: Duration) -> Self {
        Self {
            delay,
            calls: Arc::new(AtomicUsize::new(0)),
            devices: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Backend for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    fn extract(
        &self,
        path: &Path,
        _options: &ExtractOptions,
        ctx: &ExtractContext,
    ) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.devices.lock().unwrap().push(ctx.device);
        std::thread::sleep(self.delay);
        let stem = path.file_stem().unwrap().to_string_lossy();
        Ok(format!("converted {}", stem))
    }
}

/// Returns `from <input path>`.
struct Source;

impl Backend for Source {
    fn name(&self) -> &str {
        "source"
    }

    fn extract(
        &self,
        path: &Path,
        _options: &ExtractOptions,
        _ctx: &ExtractContext,
    ) -> Result<String, BackendError> {
        Ok(format!("from {}", path.display()))
    }
}

/// Always fails.
struct Broken;

impl Backend for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    fn extract(
        &self,
        _path: &Path,
        _options: &ExtractOptions,
        _ctx: &ExtractContext,
    ) -> Result<String, BackendError> {
        Err(BackendError::Failed("cannot parse".to_string()))
    }
}

/// Blocks until aborted; gives up after ten seconds so a broken stop cannot hang the suite.
struct WaitForAbort {
    started: Arc<AtomicUsize>,
}

impl Backend for WaitForAbort {
    fn name(&self) -> &str {
        "wait"
    }

    fn supports_abort(&self) -> bool {
        true
    }

    fn extract(
        &self,
        _path: &Path,
        _options: &ExtractOptions,
        ctx: &ExtractContext,
    ) -> Result<String, BackendError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let deadline = Instant::now() + Duration::from_secs(10);
        while Instant::now() < deadline {
            if ctx.abort.is_aborted() {
                return Err(BackendError::Aborted);
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        Ok("finished without abort".to_string())
    }
}

fn submit_docs(pool: &WorkerPool, count: usize, output_dir: &Path) -> Vec<PathBuf> {
    (0..count)
        .map(|i| {
            let input = PathBuf::from(format!("/inputs/doc{}.pdf", i));
            pool.submit(input.clone(), output_dir, ExtractOptions::default())
                .unwrap();
            input
        })
        .collect()
}

type Calls = Arc<Mutex<Vec<(f64, String)>>>;

fn recorder() -> (Calls, impl Fn(f64, &str) + Send + Sync + 'static) {
    let calls: Calls = Arc::new(Mutex::new(Vec::new()));
    let sink = calls.clone();
    (calls, move |percent: f64, message: &str| {
        sink.lock().unwrap().push((percent, message.to_string()));
    })
}

async fn wait_for(counter: &AtomicUsize, target: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while counter.load(Ordering::SeqCst) < target {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("backend never started");
}

#[tokio::test]
async fn test_all_tasks_succeed_with_two_workers() {
    let out = tempfile::tempdir().unwrap();
    let backend = Echo::new();
    let backend_calls = backend.calls.clone();
    let pool = WorkerPool::new(BackendChain::new().with(backend), FixedProbe(false));
    submit_docs(&pool, 5, out.path());

    let (calls, on_progress) = recorder();
    let run = pool.run(2, DevicePreference::GpuFirst, on_progress).await.unwrap();

    assert_eq!(run.total, 5);
    assert_eq!(run.succeeded, 5);
    assert_eq!(run.failed, 0);
    assert_eq!(run.stopped, 0);
    assert_eq!(run.device_used, Device::Cpu);
    assert!(run.ended_at.is_some());
    assert_eq!(backend_calls.load(Ordering::SeqCst), 5);

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 5);
    assert!(calls.windows(2).all(|w| w[0].0 <= w[1].0));
    assert_eq!(calls.last().unwrap().0, 100.0);

    for task in pool.tasks() {
        assert_eq!(task.status(), TaskStatus::Succeeded);
        assert_eq!(task.backend_used(), Some("echo"));
        assert!(task.error().is_none());
        assert!(task.started_at().is_some() && task.ended_at().is_some());
        let written = std::fs::read_to_string(task.output_file().unwrap()).unwrap();
        let stem = task.input_path().file_stem().unwrap().to_string_lossy().to_string();
        assert_eq!(written, format!("# {}\n\nconverted {}", stem, stem));
    }
}

#[tokio::test]
async fn test_more_workers_than_tasks() {
    let out = tempfile::tempdir().unwrap();
    let pool = WorkerPool::new(BackendChain::new().with(Echo::new()), FixedProbe(false));
    submit_docs(&pool, 2, out.path());

    let run = pool.run(16, DevicePreference::CpuFirst, |_, _| {}).await.unwrap();
    assert_eq!(run.succeeded, 2);
}

#[tokio::test]
async fn test_empty_pool_runs() {
    let pool = WorkerPool::new(BackendChain::new().with(Echo::new()), FixedProbe(false));
    let (calls, on_progress) = recorder();
    let run = pool.run(4, DevicePreference::Auto, on_progress).await.unwrap();
    assert_eq!(run.total, 0);
    assert_eq!(run.finished(), 0);
    assert!(calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_gpu_device_passed_to_backends() {
    let out = tempfile::tempdir().unwrap();
    let backend = Echo::new();
    let devices = backend.devices.clone();
    let pool = WorkerPool::new(BackendChain::new().with(backend), FixedProbe(true));
    submit_docs(&pool, 3, out.path());

    let run = pool.run(2, DevicePreference::Auto, |_, _| {}).await.unwrap();
    assert_eq!(run.device_used, Device::Gpu);
    assert!(devices.lock().unwrap().iter().all(|d| *d == Device::Gpu));
}

#[tokio::test]
async fn test_exhausted_chain_fails_task_and_batch_continues() {
    let out = tempfile::tempdir().unwrap();
    let pool = WorkerPool::new(
        BackendChain::new().with(Broken).with(Broken),
        FixedProbe(false),
    );
    submit_docs(&pool, 3, out.path());

    let (calls, on_progress) = recorder();
    let run = pool.run(2, DevicePreference::CpuFirst, on_progress).await.unwrap();
    assert_eq!(run.failed, 3);
    assert_eq!(run.succeeded + run.failed + run.stopped, run.total);

    for task in pool.tasks() {
        assert_eq!(task.status(), TaskStatus::Failed);
        let error = task.error().unwrap();
        assert!(error.contains("all backends exhausted"), "{}", error);
        assert!(error.contains("cannot parse"));
        assert_eq!(task.attempts().len(), 2);
        assert!(task.backend_used().is_none());
        assert!(task.output_file().is_none());
    }

    let calls = calls.lock().unwrap();
    assert_eq!(calls.len(), 3);
    assert_eq!(calls.last().unwrap().0, 100.0);
    assert!(calls[0].1.starts_with("Failed"));
    assert!(std::fs::read_dir(out.path()).unwrap().next().is_none());
}

#[tokio::test]
async fn test_fallback_to_later_backend() {
    let out = tempfile::tempdir().unwrap();
    let pool = WorkerPool::new(
        BackendChain::new().with(Broken).with(Echo::new()),
        FixedProbe(false),
    );
    submit_docs(&pool, 1, out.path());

    let run = pool.run(1, DevicePreference::CpuFirst, |_, _| {}).await.unwrap();
    assert_eq!(run.succeeded, 1);
    let task = &pool.tasks()[0];
    assert_eq!(task.backend_used(), Some("echo"));
    assert_eq!(task.attempts().len(), 1);
    assert_eq!(task.attempts()[0].backend, "broken");
}

#[tokio::test]
async fn test_output_write_failure_marks_failed() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("not-a-dir");
    std::fs::write(&blocker, "file in the way").unwrap();

    let pool = WorkerPool::new(BackendChain::new().with(Echo::new()), FixedProbe(false));
    submit_docs(&pool, 1, &blocker);

    let run = pool.run(1, DevicePreference::CpuFirst, |_, _| {}).await.unwrap();
    assert_eq!(run.failed, 1);
    let task = &pool.tasks()[0];
    assert!(task.error().unwrap().starts_with("failed to write output"));
}

#[tokio::test]
async fn test_inputs_sharing_a_stem_keep_separate_outputs() {
    let out = tempfile::tempdir().unwrap();
    let pool = WorkerPool::new(BackendChain::new().with(Source), FixedProbe(false));
    for dir in ["a", "b"] {
        pool.submit_relative(
            format!("/in/{}/report.pdf", dir),
            format!("{}/report.pdf", dir),
            out.path(),
            ExtractOptions::default(),
        )
        .unwrap();
    }

    let run = pool.run(2, DevicePreference::CpuFirst, |_, _| {}).await.unwrap();
    assert_eq!(run.succeeded, 2);

    for dir in ["a", "b"] {
        let written = std::fs::read_to_string(out.path().join(dir).join("report.md")).unwrap();
        assert_eq!(written, format!("# report\n\nfrom /in/{}/report.pdf", dir));
    }
    let outputs: Vec<PathBuf> = pool
        .tasks()
        .iter()
        .map(|t| t.output_file().unwrap().to_path_buf())
        .collect();
    assert_ne!(outputs[0], outputs[1]);
}

#[tokio::test]
async fn test_submit_rejects_duplicate_output() {
    let out = tempfile::tempdir().unwrap();
    let pool = WorkerPool::new(BackendChain::new().with(Source), FixedProbe(false));
    pool.submit("/in/a/report.pdf", out.path(), ExtractOptions::default())
        .unwrap();

    let err = pool
        .submit("/in/b/report.pdf", out.path(), ExtractOptions::default())
        .unwrap_err();
    assert_eq!(err, PoolError::DuplicateOutput(out.path().join("report.md")));
    assert_eq!(pool.len(), 1);

    pool.submit_relative(
        "/in/b/report.pdf",
        "b/report.pdf",
        out.path(),
        ExtractOptions::default(),
    )
    .unwrap();
    assert_eq!(pool.len(), 2);
}

#[tokio::test]
async fn test_stop_before_run_stops_everything() {
    let out = tempfile::tempdir().unwrap();
    let backend = Echo::new();
    let backend_calls = backend.calls.clone();
    let pool = WorkerPool::new(BackendChain::new().with(backend), FixedProbe(false));
    submit_docs(&pool, 4, out.path());

    pool.stop();
    pool.stop();
    assert!(pool.is_stopped());

    let (calls, on_progress) = recorder();
    let run = pool.run(2, DevicePreference::CpuFirst, on_progress).await.unwrap();

    assert_eq!(run.stopped, 4);
    assert_eq!(run.succeeded + run.failed, 0);
    assert_eq!(backend_calls.load(Ordering::SeqCst), 0);
    assert!(calls.lock().unwrap().is_empty());
    for task in pool.tasks() {
        assert_eq!(task.status(), TaskStatus::Stopped);
        assert!(task.started_at().is_none());
    }
    assert!(std::fs::read_dir(out.path()).unwrap().next().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_aborts_in_flight_and_pending() {
    let out = tempfile::tempdir().unwrap();
    let started = Arc::new(AtomicUsize::new(0));
    let pool = WorkerPool::new(
        BackendChain::new().with(WaitForAbort {
            started: started.clone(),
        }),
        FixedProbe(false),
    );
    submit_docs(&pool, 5, out.path());

    let (calls, on_progress) = recorder();
    let runner = pool.clone();
    let handle =
        tokio::spawn(async move { runner.run(2, DevicePreference::CpuFirst, on_progress).await });

    wait_for(&started, 2).await;
    let stop_at = Instant::now();
    pool.stop();

    let run = handle.await.unwrap().unwrap();
    assert!(stop_at.elapsed() < Duration::from_secs(5));
    assert_eq!(run.stopped, 5);
    assert_eq!(run.succeeded + run.failed, 0);
    assert_eq!(started.load(Ordering::SeqCst), 2);
    assert!(calls.lock().unwrap().is_empty());

    let snapshot = pool.snapshot();
    assert_eq!(snapshot.stopped, 5);
    assert!(snapshot
        .tasks
        .iter()
        .all(|t| t.status == TaskStatus::Stopped && t.ended_at.is_some()));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_discards_result_of_non_abortable_backend() {
    let out = tempfile::tempdir().unwrap();
    let backend = Echo::slow(Duration::from_millis(300));
    let backend_calls = backend.calls.clone();
    let pool = WorkerPool::new(BackendChain::new().with(backend), FixedProbe(false));
    submit_docs(&pool, 1, out.path());

    let runner = pool.clone();
    let handle = tokio::spawn(async move { runner.run(1, DevicePreference::CpuFirst, |_, _| {}).await });

    wait_for(&backend_calls, 1).await;
    pool.stop();

    let run = handle.await.unwrap().unwrap();
    assert_eq!(run.stopped, 1);
    let task = &pool.tasks()[0];
    assert_eq!(task.status(), TaskStatus::Stopped);
    assert!(task.started_at().is_some());
    assert!(task.output_file().is_none());
    assert!(std::fs::read_dir(out.path()).unwrap().next().is_none());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_dropped_run_aborts_workers() {
    let out = tempfile::tempdir().unwrap();
    let started = Arc::new(AtomicUsize::new(0));
    let pool = WorkerPool::new(
        BackendChain::new().with(WaitForAbort {
            started: started.clone(),
        }),
        FixedProbe(false),
    );
    submit_docs(&pool, 3, out.path());

    let timed_out = tokio::time::timeout(
        Duration::from_millis(300),
        pool.run(1, DevicePreference::CpuFirst, |_, _| {}),
    )
    .await;
    assert!(timed_out.is_err());
    assert_eq!(started.load(Ordering::SeqCst), 1);
    assert!(pool.is_stopped());
    assert!(pool.tasks().iter().all(|t| t.status() == TaskStatus::Stopped));

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(started.load(Ordering::SeqCst), 1);
    assert!(pool.tasks().iter().all(|t| t.status() == TaskStatus::Stopped));
    assert!(std::fs::read_dir(out.path()).unwrap().next().is_none());

    let err = pool.run(1, DevicePreference::CpuFirst, |_, _| {}).await.unwrap_err();
    assert_eq!(err, PoolError::AlreadyFinished);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_concurrent_run_rejected() {
    let out = tempfile::tempdir().unwrap();
    let backend = Echo::slow(Duration::from_millis(100));
    let backend_calls = backend.calls.clone();
    let pool = WorkerPool::new(BackendChain::new().with(backend), FixedProbe(false));
    submit_docs(&pool, 3, out.path());

    let runner = pool.clone();
    let first = tokio::spawn(async move { runner.run(1, DevicePreference::CpuFirst, |_, _| {}).await });
    wait_for(&backend_calls, 1).await;

    let second = pool.run(1, DevicePreference::CpuFirst, |_, _| {}).await;
    assert_eq!(second.unwrap_err(), PoolError::ConcurrentRun);

    let run = first.await.unwrap().unwrap();
    assert_eq!(run.succeeded, 3);
}

#[tokio::test]
async fn test_run_control_errors_leave_tasks_untouched() {
    let out = tempfile::tempdir().unwrap();
    let pool = WorkerPool::new(BackendChain::new().with(Echo::new()), FixedProbe(false));
    submit_docs(&pool, 2, out.path());

    let err = pool.run(0, DevicePreference::CpuFirst, |_, _| {}).await.unwrap_err();
    assert_eq!(err, PoolError::InvalidWorkerCount);
    assert!(pool.tasks().iter().all(|t| t.status() == TaskStatus::Pending));

    pool.run(1, DevicePreference::CpuFirst, |_, _| {}).await.unwrap();

    let err = pool
        .submit("/inputs/late.pdf", out.path(), ExtractOptions::default())
        .unwrap_err();
    assert_eq!(err, PoolError::RunInProgress);
    assert_eq!(pool.len(), 2);

    let err = pool.run(1, DevicePreference::CpuFirst, |_, _| {}).await.unwrap_err();
    assert_eq!(err, PoolError::AlreadyFinished);
}

#[tokio::test]
async fn test_events_follow_run_lifecycle() {
    let out = tempfile::tempdir().unwrap();
    let (tx, mut rx) = mpsc::channel(64);
    let pool = WorkerPool::new(
        BackendChain::new().with(Echo::new()),
        FixedProbe(false),
    )
    .with_events(tx);
    submit_docs(&pool, 2, out.path());

    pool.run(1, DevicePreference::CpuFirst, |_, _| {}).await.unwrap();
    drop(pool);

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }

    assert!(matches!(events.first(), Some(PoolEvent::RunStarted { total: 2, workers: 1, .. })));
    assert!(matches!(events.last(), Some(PoolEvent::RunFinished { run }) if run.succeeded == 2));
    let started = events
        .iter()
        .filter(|e| matches!(e, PoolEvent::TaskStarted { .. }))
        .count();
    let succeeded = events
        .iter()
        .filter(|e| matches!(e, PoolEvent::TaskSucceeded { backend, .. } if backend == "echo"))
        .count();
    assert_eq!(started, 2);
    assert_eq!(succeeded, 2);
}
