//! Ordered fallback over extraction backends.
//!
//! Backends are tried strictly in priority order. A failing backend (error,
//! unavailable, or blank output) is recorded and the next one is tried; the
//! chain only fails once every backend has been exhausted. There is no
//! same-backend retry.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use super::{Backend, BackendError, ExtractContext, ExtractOptions};
use crate::cancel::AbortSignal;
use crate::device::Device;

/// Error message of a chain whose backends all failed.
pub const EXHAUSTED: &str = "all backends exhausted";

/// One failed backend attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptFailure {
    pub backend: String,
    pub error: String,
    pub duration_ms: u64,
}

/// Outcome of resolving one document through the chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendResult {
    pub success: bool,
    pub text: Option<String>,
    /// Backend that produced `text`, or the last backend attempted on failure.
    pub backend_name: String,
    pub duration_ms: u64,
    pub error: Option<String>,
    /// Failures of the backends tried before the outcome was reached.
    pub details: Vec<AttemptFailure>,
}

impl BackendResult {
    fn failure(error: &str, backend_name: String, start: Instant, details: Vec<AttemptFailure>) -> Self {
        Self {
            success: false,
            text: None,
            backend_name,
            duration_ms: start.elapsed().as_millis() as u64,
            error: Some(error.to_string()),
            details,
        }
    }

    /// Human-readable summary including every per-backend error.
    pub fn describe_failure(&self) -> String {
        let base = self.error.as_deref().unwrap_or(EXHAUSTED);
        if self.details.is_empty() {
            return base.to_string();
        }
        let parts: Vec<String> = self
            .details
            .iter()
            .map(|d| format!("{}: {}", d.backend, d.error))
            .collect();
        format!("{} ({})", base, parts.join("; "))
    }
}

/// Hooks the chain calls around each attempt.
///
/// The worker pool uses these to stop advancing once a stop was requested,
/// to register in-flight invocations for abort, and to report progress.
pub trait ChainObserver: Send + Sync {
    /// Called before attempt `index` of `total`. Returning `None` ends the
    /// chain without trying this or any later backend.
    fn before_attempt(&self, index: usize, total: usize, backend: &dyn Backend) -> Option<AbortSignal>;

    /// Called after attempt `index` returned, whatever its outcome.
    fn after_attempt(&self, _index: usize, _backend: &dyn Backend) {}
}

/// Observer that never interrupts the chain.
pub struct Unobserved;

impl ChainObserver for Unobserved {
    fn before_attempt(&self, _index: usize, _total: usize, _backend: &dyn Backend) -> Option<AbortSignal> {
        Some(AbortSignal::new())
    }
}

/// Ordered list of backends.
#[derive(Clone, Default)]
pub struct BackendChain {
    backends: Vec<Arc<dyn Backend>>,
}

impl BackendChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a backend at the lowest priority.
    pub fn register(&mut self, backend: Box<dyn Backend>) {
        self.backends.push(Arc::from(backend));
    }

    /// Builder-style variant of [`register`](Self::register).
    pub fn with(mut self, backend: impl Backend + 'static) -> Self {
        self.backends.push(Arc::new(backend));
        self
    }

    pub fn len(&self) -> usize {
        self.backends.len()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    pub fn backends(&self) -> impl Iterator<Item = &dyn Backend> {
        self.backends.iter().map(|b| b.as_ref())
    }

    /// Resolve a document without any interruption hooks.
    pub fn resolve(&self, path: &Path, options: &ExtractOptions, device: Device) -> BackendResult {
        self.resolve_observed(path, options, device, &Unobserved)
    }

    /// Resolve a document, calling `observer` around every attempt.
    pub fn resolve_observed(
        &self,
        path: &Path,
        options: &ExtractOptions,
        device: Device,
        observer: &dyn ChainObserver,
    ) -> BackendResult {
        let start = Instant::now();
        let total = self.backends.len();
        let mut details = Vec::new();
        let mut last_backend = String::new();

        for (index, backend) in self.backends.iter().enumerate() {
            let backend = backend.as_ref();
            let name = backend.name().to_string();

            if !backend.is_available() {
                tracing::debug!("Skipping {}: {}", name, backend.availability_hint());
                details.push(AttemptFailure {
                    backend: name.clone(),
                    error: BackendError::NotAvailable(backend.availability_hint()).to_string(),
                    duration_ms: 0,
                });
                last_backend = name;
                continue;
            }

            let Some(abort) = observer.before_attempt(index, total, backend) else {
                tracing::debug!("Chain interrupted before {} for {}", name, path.display());
                return BackendResult::failure("stopped", last_backend, start, details);
            };

            tracing::debug!("Trying {} on {}", name, path.display());
            let ctx = ExtractContext::with_abort(device, abort);
            let attempt_start = Instant::now();
            let outcome = backend.extract(path, options, &ctx);
            let duration_ms = attempt_start.elapsed().as_millis() as u64;
            observer.after_attempt(index, backend);

            let error = match outcome {
                Ok(text) if !text.trim().is_empty() => {
                    tracing::debug!("{} succeeded on {} in {}ms", name, path.display(), duration_ms);
                    return BackendResult {
                        success: true,
                        text: Some(text),
                        backend_name: name,
                        duration_ms,
                        error: None,
                        details,
                    };
                }
                Ok(_) => BackendError::EmptyOutput,
                Err(e) => e,
            };

            tracing::warn!("{} failed on {}: {}", name, path.display(), error);
            details.push(AttemptFailure {
                backend: name.clone(),
                error: error.to_string(),
                duration_ms,
            });
            last_backend = name;
        }

        BackendResult::failure(EXHAUSTED, last_backend, start, details)
    }
}

impl std::fmt::Debug for BackendChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendChain")
            .field("backends", &self.names())
            .finish()
    }
}
