//! Registry of in-flight backend invocations.
//!
//! Registration and `abort_all` share one lock with the token flip, so an
//! invocation either sees the stop at registration or is reached by
//! `abort_all`. Nothing slips between the two.

use std::collections::HashMap;
use std::sync::Mutex;

use uuid::Uuid;

use super::queue::lock;
use crate::cancel::{AbortSignal, CancellationToken};

struct Invocation {
    task_id: Uuid,
    backend: String,
    signal: AbortSignal,
}

#[derive(Default)]
struct Entries {
    next_id: u64,
    active: HashMap<u64, Invocation>,
}

/// Tracks abortable backend calls currently running.
pub struct ActiveInvocations {
    token: CancellationToken,
    entries: Mutex<Entries>,
}

impl ActiveInvocations {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            entries: Mutex::new(Entries::default()),
        }
    }

    /// Register an invocation. The returned signal is already aborted when
    /// a stop was requested before registration.
    pub fn register(&self, task_id: Uuid, backend: &str) -> (u64, AbortSignal) {
        let signal = AbortSignal::new();
        let mut entries = lock(&self.entries);
        let id = entries.next_id;
        entries.next_id += 1;

        if self.token.is_cancelled() {
            signal.abort();
        } else {
            entries.active.insert(
                id,
                Invocation {
                    task_id,
                    backend: backend.to_string(),
                    signal: signal.clone(),
                },
            );
        }
        (id, signal)
    }

    pub fn unregister(&self, id: u64) {
        lock(&self.entries).active.remove(&id);
    }

    /// Flip the token and abort every registered invocation.
    /// Returns `true` for the call that performed the stop.
    pub fn abort_all(&self) -> bool {
        let entries = lock(&self.entries);
        let first = self.token.cancel();
        for invocation in entries.active.values() {
            tracing::debug!(
                "Aborting {} for task {}",
                invocation.backend,
                invocation.task_id
            );
            invocation.signal.abort();
        }
        first
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
