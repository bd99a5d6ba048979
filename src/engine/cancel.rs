//! Cancellable execution scope for external processes.
//!
//! A `CancelToken` owns the set of child processes started under it. Cancelling
//! kills every live child and every child scope. Cancelling twice is a no-op.

use std::collections::HashMap;
use std::io;
use std::process::{Child, ExitStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    cancelled: AtomicBool,
    registry: Mutex<Registry>,
}

#[derive(Debug, Default)]
struct Registry {
    next_id: u64,
    processes: HashMap<u64, Arc<Mutex<Child>>>,
    scopes: Vec<Weak<Inner>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a scope that is cancelled together with this token.
    /// Cancelling the child leaves the parent untouched.
    pub fn child(&self) -> CancelToken {
        let child = CancelToken::new();
        {
            let mut registry = lock(&self.inner.registry);
            if !self.is_cancelled() {
                registry.scopes.retain(|s| s.strong_count() > 0);
                registry.scopes.push(Arc::downgrade(&child.inner));
                return child;
            }
        }
        child.cancel();
        child
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Kill every process and child scope under this token
    pub fn cancel(&self) {
        if self.inner.cancelled.swap(true, Ordering::SeqCst) {
            return;
        }

        let (processes, scopes) = {
            let registry = lock(&self.inner.registry);
            (
                registry.processes.values().cloned().collect::<Vec<_>>(),
                registry.scopes.clone(),
            )
        };

        for process in processes {
            let mut child = lock(&process);
            let pid = child.id();
            if let Err(e) = child.kill() {
                tracing::debug!(pid, error = %e, "kill on cancel failed (process already exited?)");
            }
        }

        for scope in scopes.iter().filter_map(Weak::upgrade) {
            CancelToken { inner: scope }.cancel();
        }
    }

    /// Put a spawned child under this token.
    /// Hands the child back if the token is already cancelled.
    pub(crate) fn register(&self, child: Child) -> Result<ProcessGuard, Child> {
        let mut registry = lock(&self.inner.registry);
        if self.is_cancelled() {
            return Err(child);
        }

        let id = registry.next_id;
        registry.next_id += 1;
        let child = Arc::new(Mutex::new(child));
        registry.processes.insert(id, Arc::clone(&child));

        Ok(ProcessGuard {
            token: self.clone(),
            id,
            child,
        })
    }

    fn unregister(&self, id: u64) {
        lock(&self.inner.registry).processes.remove(&id);
    }

    #[cfg(test)]
    fn live_processes(&self) -> usize {
        lock(&self.inner.registry).processes.len()
    }
}

/// Registration of one child process; unregisters on drop
#[derive(Debug)]
pub(crate) struct ProcessGuard {
    token: CancelToken,
    id: u64,
    child: Arc<Mutex<Child>>,
}

impl ProcessGuard {
    /// Reap the child. Call only after its output pipes reached EOF so the
    /// lock is not held while the process is still running.
    pub(crate) fn wait(&self) -> io::Result<ExitStatus> {
        lock(&self.child).wait()
    }
}

impl Drop for ProcessGuard {
    fn drop(&mut self) {
        self.token.unregister(self.id);
    }
}
