//! Cancellation primitives shared between the pool and backend invocations.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Observable state of a [`CancellationToken`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenState {
    Active,
    /// Terminal: a token never returns to `Active`.
    StopRequested,
}

/// Run-wide stop signal. Clones share the same underlying flag.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    stopped: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop. Returns `true` only for the call that flipped the token.
    pub fn cancel(&self) -> bool {
        !self.stopped.swap(true, Ordering::SeqCst)
    }

    pub fn is_cancelled(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> TokenState {
        if self.is_cancelled() {
            TokenState::StopRequested
        } else {
            TokenState::Active
        }
    }
}

/// Per-invocation abort request handed to a backend.
///
/// Backends that support cooperative abort poll this while they work;
/// everyone else ignores it.
#[derive(Debug, Clone, Default)]
pub struct AbortSignal {
    aborted: Arc<AtomicBool>,
}

impl AbortSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_starts_active() {
        let token = CancellationToken::new();
        assert_eq!(token.state(), TokenState::Active);
        assert!(!token.is_cancelled());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let token = CancellationToken::new();
        assert!(token.cancel());
        assert!(!token.cancel());
        assert_eq!(token.state(), TokenState::StopRequested);
    }

    #[test]
    fn test_clones_share_state() {
        let token = CancellationToken::new();
        let observer = token.clone();
        token.cancel();
        assert!(observer.is_cancelled());
    }

    #[test]
    fn test_abort_signal() {
        let signal = AbortSignal::new();
        let backend_side = signal.clone();
        assert!(!backend_side.is_aborted());
        signal.abort();
        assert!(backend_side.is_aborted());
    }
}
