use std::sync::Arc;

/// An opaque unit of work.
///
/// `Task` is the currency of every scheduling surface in the crate:
/// the worker pools, the reactor's timer queue, and the descriptor
/// upcalls all accept it. A task comes in two disposal disciplines:
///
/// - [`Task::once`] wraps a closure that is consumed by its single
///   invocation.
/// - [`Task::many`] wraps a shared closure. The registrar keeps its own
///   handle (see [`Task::handle`]) and may mint any number of tokens
///   from it; the handle outlives every pending invocation.
pub enum Task {
    /// A single-shot closure, consumed when run.
    Once(Box<dyn FnOnce() + Send + 'static>),

    /// A token minted from a shared multi-shot closure.
    Many(Arc<dyn Fn() + Send + Sync + 'static>),
}

/// A registrar-owned multi-shot closure.
///
/// Cloning is cheap; each clone can be turned into a [`Task`] or
/// invoked directly.
pub type TaskHandle = Arc<dyn Fn() + Send + Sync + 'static>;

impl Task {
    /// Wraps a closure that will run at most once.
    pub fn once<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Task::Once(Box::new(f))
    }

    /// Wraps a closure that may be scheduled repeatedly.
    pub fn many<F>(f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        Task::Many(Arc::new(f))
    }

    /// Creates a registrar handle for a multi-shot closure.
    pub fn handle<F>(f: F) -> TaskHandle
    where
        F: Fn() + Send + Sync + 'static,
    {
        Arc::new(f)
    }

    /// Runs the task, consuming this token.
    pub fn run(self) {
        match self {
            Task::Once(f) => f(),
            Task::Many(f) => f(),
        }
    }
}

impl From<TaskHandle> for Task {
    /// Mints a schedulable token from a registrar handle.
    fn from(handle: TaskHandle) -> Self {
        Task::Many(handle)
    }
}
