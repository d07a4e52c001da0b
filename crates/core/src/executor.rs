//! Where change notifications run.

use tokio::runtime::Handle;
use tracing::trace;

/// One unit of notification work: fire the listeners of one result.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Accepts notification tasks. Every submitted task must eventually run
/// exactly once; no ordering between tasks is assumed.
pub trait Executor: Send + Sync {
    fn execute(&self, task: Task);
}

impl<F> Executor for F
where
    F: Fn(Task) + Send + Sync,
{
    fn execute(&self, task: Task) { self(task) }
}

/// Runs notifications on a tokio runtime's blocking pool (listeners are
/// synchronous and may take locks).
#[derive(Debug, Clone)]
pub struct TokioExecutor {
    handle: Handle,
}

impl TokioExecutor {
    pub fn new(handle: Handle) -> Self { Self { handle } }

    /// Executor for the runtime the caller runs in. Panics outside a runtime.
    pub fn current() -> Self { Self::new(Handle::current()) }
}

impl Executor for TokioExecutor {
    fn execute(&self, task: Task) {
        trace!("spawn_blocking notification");
        drop(self.handle.spawn_blocking(task));
    }
}
