//! Work queue shared by pool workers.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::task::ConversionTask;

/// A task shared between the pool and the worker executing it.
pub type SharedTask = Arc<Mutex<ConversionTask>>;

/// Lock a pool mutex, recovering the data if a worker panicked while holding it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Fixed list of tasks handed out once each through an atomic cursor.
pub struct TaskQueue {
    tasks: Vec<SharedTask>,
    cursor: AtomicUsize,
}

impl TaskQueue {
    pub fn new(tasks: Vec<SharedTask>) -> Self {
        Self {
            tasks,
            cursor: AtomicUsize::new(0),
        }
    }

    /// Claim the next unclaimed task.
    pub fn next(&self) -> Option<SharedTask> {
        let index = self.cursor.fetch_add(1, Ordering::SeqCst);
        self.tasks.get(index).cloned()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::ExtractOptions;
    use std::collections::HashSet;
    use std::path::PathBuf;

    fn shared(name: &str) -> SharedTask {
        Arc::new(Mutex::new(ConversionTask::new(
            PathBuf::from(name),
            PathBuf::from("out"),
            ExtractOptions::default(),
        )))
    }

    #[test]
    fn test_each_task_claimed_once() {
        let queue = Arc::new(TaskQueue::new((0..50).map(|i| shared(&format!("{i}.pdf"))).collect()));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let queue = queue.clone();
                std::thread::spawn(move || {
                    let mut ids = Vec::new();
                    while let Some(task) = queue.next() {
                        ids.push(lock(&task).id());
                    }
                    ids
                })
            })
            .collect();

        let mut seen = HashSet::new();
        for handle in handles {
            for id in handle.join().unwrap() {
                assert!(seen.insert(id));
            }
        }
        assert_eq!(seen.len(), 50);
        assert!(queue.next().is_none());
    }
}
