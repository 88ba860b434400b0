//! The execution worker loop.

use seqpool_workflow::simple_mpmc::Receiver;

use crate::{tracker::WorkerRegistration, work_unit::WorkUnit};

/// One of the pool's N worker threads.
pub(crate) struct Worker<A, R> {
    index: usize,
    intake: Receiver<WorkUnit<A, R>>,
    registration: WorkerRegistration<R>,
}

impl<A, R> Worker<A, R> {
    pub fn new(
        index: usize,
        intake: Receiver<WorkUnit<A, R>>,
        registration: WorkerRegistration<R>,
    ) -> Self {
        Worker {
            index,
            intake,
            registration,
        }
    }

    /// Executes work units until intake is closed and drained, or until the
    /// completion channel is gone. Consuming `self` drops the registration,
    /// which signals this worker's termination to the tracker.
    pub fn run(self) {
        let mut executed = 0u64;
        while let Ok(unit) = self.intake.recv() {
            let completion = unit.execute();
            if let Err(completion) = self.registration.emit(completion) {
                log::debug!(
                    "worker {}: completion channel closed, dropping result {}",
                    self.index,
                    completion.id()
                );
                break;
            }
            executed += 1;
        }
        log::trace!("worker {} terminating after {executed} unit(s)", self.index);
    }
}
