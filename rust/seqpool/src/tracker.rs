//! Closing the unordered completion channel once every worker is done.

use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};

use seqpool_workflow::simple_mpmc::SimpleMpmcQueue;

use crate::completion::Completion;

/// Counts worker terminations and closes the unordered completion channel on
/// the last one.
///
/// The tracker owns the channel's only producer registration. Workers push
/// completions through a [`WorkerRegistration`], which does not register as a
/// producer, so the channel stays open exactly until the tracker has seen
/// `expected` terminations, no matter in which order the workers finish.
pub(crate) struct CompletionTracker<R> {
    expected: usize,
    terminated: AtomicUsize,
    queue: SimpleMpmcQueue<Completion<R>>,
}

impl<R> CompletionTracker<R> {
    /// Creates a tracker for `expected` workers over a freshly created queue.
    ///
    /// The queue's initial producer registration is taken over by the tracker.
    pub fn new(expected: usize, queue: SimpleMpmcQueue<Completion<R>>) -> Arc<Self> {
        assert_ne!(expected, 0);
        Arc::new(CompletionTracker {
            expected,
            terminated: AtomicUsize::new(0),
            queue,
        })
    }

    /// Hands out the registration for one worker.
    ///
    /// Exactly `expected` registrations must be created; each one counts as a
    /// termination when dropped.
    pub fn register(self: &Arc<Self>) -> WorkerRegistration<R> {
        WorkerRegistration {
            tracker: self.clone(),
        }
    }

    /// The number of workers that have terminated so far.
    #[cfg(test)]
    pub fn terminated(&self) -> usize {
        self.terminated.load(Ordering::Acquire)
    }

    fn worker_terminated(&self) {
        let count = self.terminated.fetch_add(1, Ordering::AcqRel) + 1;
        debug_assert!(count <= self.expected);
        if count == self.expected {
            log::debug!("all {count} workers terminated, closing completion channel");
            self.queue.drop_producer();
        }
    }
}

/// A worker's handle for emitting completions.
///
/// Dropping it is the worker's termination signal. Since the registration is
/// the only way to emit, no completion can follow the signal.
pub(crate) struct WorkerRegistration<R> {
    tracker: Arc<CompletionTracker<R>>,
}

impl<R> WorkerRegistration<R> {
    /// Pushes a completion to the unordered channel, blocking while it is full.
    ///
    /// Hands the completion back if the reorder engine is gone.
    pub fn emit(&self, completion: Completion<R>) -> Result<(), Completion<R>> {
        self.tracker.queue.enqueue(completion)
    }
}

impl<R> Drop for WorkerRegistration<R> {
    fn drop(&mut self) {
        self.tracker.worker_terminated();
    }
}
