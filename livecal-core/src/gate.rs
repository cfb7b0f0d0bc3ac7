//! Outbound forwarding gate.
//!
//! Local mutations performed while applying a remote change must not be sent
//! back upstream. The gate is shared between the scheduler's outbox and the
//! bridge; while any `SuppressGuard` is alive, the outbox drops mutations.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Shared handle deciding whether local mutations are forwarded.
#[derive(Debug, Clone, Default)]
pub struct ForwardingGate {
    depth: Arc<AtomicUsize>,
}

impl ForwardingGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stop forwarding until the returned guard is dropped.
    pub fn suppress(&self) -> SuppressGuard {
        self.depth.fetch_add(1, Ordering::SeqCst);
        SuppressGuard {
            depth: Arc::clone(&self.depth),
        }
    }

    pub fn is_suppressed(&self) -> bool {
        self.depth.load(Ordering::SeqCst) > 0
    }

    /// Run `f` with forwarding suppressed.
    pub fn ignore<T>(&self, f: impl FnOnce() -> T) -> T {
        let _guard = self.suppress();
        f()
    }
}

/// Keeps forwarding suppressed while alive.
#[must_use = "forwarding resumes as soon as the guard is dropped"]
#[derive(Debug)]
pub struct SuppressGuard {
    depth: Arc<AtomicUsize>,
}

impl Drop for SuppressGuard {
    fn drop(&mut self) {
        self.depth.fetch_sub(1, Ordering::SeqCst);
    }
}
