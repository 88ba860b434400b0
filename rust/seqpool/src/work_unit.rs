//! The unit of work submitted to an ordered pool.

use std::panic::{self, AssertUnwindSafe};

use crate::completion::{Completion, TaskError, panic_message};

/// A boxed callable executed by a worker thread with the unit's arguments.
pub type TaskFn<A, R> = Box<dyn FnOnce(A) -> R + Send + 'static>;

/// One caller-submitted job: a sequence id, an argument payload and the
/// callable to invoke with it.
///
/// Ids must form the gapless sequence `0, 1, 2, ...` in submission order; the
/// pool releases results in id order and cannot release past a missing id.
/// A unit is immutable once constructed and is consumed by the worker that
/// executes it.
pub struct WorkUnit<A, R> {
    id: u64,
    args: A,
    func: TaskFn<A, R>,
}

impl<A, R> WorkUnit<A, R> {
    pub fn new<F>(id: u64, args: A, f: F) -> Self
    where
        F: FnOnce(A) -> R + Send + 'static,
    {
        WorkUnit {
            id,
            args,
            func: Box::new(f),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn args(&self) -> &A {
        &self.args
    }

    /// Invokes the callable and wraps its outcome in a [`Completion`] with the
    /// same id. A panic inside the callable is caught and reported as
    /// [`TaskError::Panicked`].
    pub fn execute(self) -> Completion<R> {
        let WorkUnit { id, args, func } = self;
        match panic::catch_unwind(AssertUnwindSafe(move || func(args))) {
            Ok(value) => Completion::new(id, value),
            Err(payload) => {
                let message = panic_message(&*payload);
                log::warn!("work unit {id} panicked: {message}");
                Completion::failed(id, TaskError::Panicked { id, message })
            }
        }
    }
}

impl<A: std::fmt::Debug, R> std::fmt::Debug for WorkUnit<A, R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkUnit")
            .field("id", &self.id)
            .field("args", &self.args)
            .finish_non_exhaustive()
    }
}
