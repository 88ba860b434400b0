//! Pool construction and the caller-facing handles.
//!
//! A pool is created with [`create`] or [`PoolOptions::build`] and is
//! represented by two handles: an [`Intake`] for submitting work units and an
//! [`OrderedResults`] stream delivering their completions in id order. There is
//! no pool object to keep alive; closing the intake is the shutdown trigger,
//! and the ordered stream ends once everything submitted has been delivered.

use std::{
    sync::mpsc::{RecvTimeoutError, TryRecvError},
    thread,
    time::Duration,
};

use seqpool_common::{Result, error::Error, verify_arg};
use seqpool_workflow::simple_mpmc::{Receiver, Sender, SimpleMpmcQueue, sync_channel};

use crate::{
    completion::{Completion, panic_message},
    reorder::{ReorderEngine, ReorderStats},
    tracker::CompletionTracker,
    work_unit::WorkUnit,
    worker::Worker,
};

/// Capacity of the intake queue and of both completion channels, unless
/// configured otherwise.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 10;

/// Creates an ordered pool with `worker_count` worker threads and default
/// channel capacities.
///
/// Returns immediately. Fails with `InvalidArgument` if `worker_count` is 0.
pub fn create<A, R>(worker_count: usize) -> Result<(Intake<A, R>, OrderedResults<R>)>
where
    A: Send + 'static,
    R: Send + 'static,
{
    PoolOptions::new(worker_count).build()
}

/// The default number of worker threads: one and a half times the available
/// parallelism, or 8 if it cannot be determined.
pub fn default_worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| (n.get() * 3).div_ceil(2))
        .unwrap_or(8)
}

/// Configuration of an ordered pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolOptions {
    workers: usize,
    capacity: usize,
    thread_name_prefix: Option<String>,
}

impl PoolOptions {
    pub fn new(workers: usize) -> Self {
        PoolOptions {
            workers,
            capacity: DEFAULT_CHANNEL_CAPACITY,
            thread_name_prefix: None,
        }
    }

    /// Sets the capacity shared by the intake queue and both completion channels.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Names the pool's threads `{prefix}-worker-{i}` and `{prefix}-reorder`.
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = Some(prefix.into());
        self
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Starts the reorder engine and the worker threads, and returns the
    /// intake and ordered output handles.
    ///
    /// If a thread cannot be spawned, the threads started so far wind down on
    /// their own and the spawn error is returned.
    pub fn build<A, R>(&self) -> Result<(Intake<A, R>, OrderedResults<R>)>
    where
        A: Send + 'static,
        R: Send + 'static,
    {
        verify_arg!(workers, self.workers > 0);
        verify_arg!(capacity, self.capacity > 0);

        let (intake_tx, intake_rx) = sync_channel::<WorkUnit<A, R>>(self.capacity);
        let unordered = SimpleMpmcQueue::<Completion<R>>::new(self.capacity);
        let unordered_rx = Receiver::from_queue(unordered.clone());
        let (ordered_tx, ordered_rx) = sync_channel::<Completion<R>>(self.capacity);

        let tracker = CompletionTracker::new(self.workers, unordered);
        let registrations: Vec<_> = (0..self.workers).map(|_| tracker.register()).collect();

        let engine = ReorderEngine::new(unordered_rx, ordered_tx);
        let engine = self
            .thread_builder("reorder")
            .spawn(move || engine.run())
            .map_err(|e| Error::io("spawn reorder engine thread", e))?;

        // Unspawned registrations are dropped on early return and count as
        // terminated, so the engine still sees the completion channel close.
        for (index, registration) in registrations.into_iter().enumerate() {
            let worker = Worker::new(index, intake_rx.clone(), registration);
            self.thread_builder(&format!("worker-{index}"))
                .spawn(move || worker.run())
                .map_err(|e| Error::io("spawn worker thread", e))?;
        }

        log::debug!(
            "ordered pool started: {} workers, channel capacity {}",
            self.workers,
            self.capacity
        );

        Ok((
            Intake {
                tx: intake_tx,
                next_id: 0,
            },
            OrderedResults {
                rx: ordered_rx,
                engine,
            },
        ))
    }

    fn thread_builder(&self, role: &str) -> thread::Builder {
        match &self.thread_name_prefix {
            Some(prefix) => thread::Builder::new().name(format!("{prefix}-{role}")),
            None => thread::Builder::new(),
        }
    }
}

impl Default for PoolOptions {
    /// Options with [`default_worker_count`] workers.
    fn default() -> Self {
        Self::new(default_worker_count())
    }
}

/// The submitting side of an ordered pool.
///
/// Work unit ids must be `0, 1, 2, ...` in submission order; [`submit`](Self::submit)
/// enforces this. Dropping the intake (or calling [`close`](Self::close))
/// closes the intake queue; the workers then drain it and stop.
pub struct Intake<A, R> {
    tx: Sender<WorkUnit<A, R>>,
    next_id: u64,
}

impl<A, R> Intake<A, R> {
    /// The id the next submitted unit must carry.
    pub fn next_id(&self) -> u64 {
        self.next_id
    }

    /// Submits a work unit, blocking while the intake queue is full.
    ///
    /// Fails with `OutOfSequence` if the unit's id is not [`next_id`](Self::next_id),
    /// and with `PoolClosed` if no worker will ever pick it up because the
    /// ordered stream's consumer went away.
    pub fn submit(&mut self, unit: WorkUnit<A, R>) -> Result<()> {
        if unit.id() != self.next_id {
            log::warn!(
                "rejecting work unit {}, expected id {}",
                unit.id(),
                self.next_id
            );
            return Err(Error::out_of_sequence(self.next_id, unit.id()));
        }
        self.tx.send(unit).map_err(|_| Error::pool_closed())?;
        self.next_id += 1;
        Ok(())
    }

    /// Submits `f(args)` under the next id and returns that id.
    pub fn submit_with<F>(&mut self, args: A, f: F) -> Result<u64>
    where
        F: FnOnce(A) -> R + Send + 'static,
    {
        let id = self.next_id;
        self.submit(WorkUnit::new(id, args, f))?;
        Ok(id)
    }

    /// Closes the intake queue. No more work can be submitted.
    pub fn close(self) {
        log::debug!("intake closed after {} unit(s)", self.next_id);
    }
}

/// The ordered output stream of a pool.
///
/// Yields one [`Completion`] per submitted unit, in id order, and ends once
/// the intake is closed and every submitted unit has been delivered.
///
/// Consume it on a different thread than the one submitting whenever more
/// than a few channel capacities of work are in flight: the channels are
/// bounded, so an unconsumed stream eventually blocks submission.
pub struct OrderedResults<R> {
    rx: Receiver<Completion<R>>,
    engine: thread::JoinHandle<Result<ReorderStats>>,
}

impl<R> OrderedResults<R> {
    /// Blocks until the next completion in order is available. Returns `None`
    /// once the stream has ended.
    pub fn recv(&self) -> Option<Completion<R>> {
        self.rx.recv().ok()
    }

    pub fn try_recv(&self) -> std::result::Result<Completion<R>, TryRecvError> {
        self.rx.try_recv()
    }

    /// Waits at most `timeout` for the next completion.
    ///
    /// A `Timeout` is the stall signal: the next id is still running, or was
    /// never submitted.
    pub fn recv_timeout(
        &self,
        timeout: Duration,
    ) -> std::result::Result<Completion<R>, RecvTimeoutError> {
        self.rx.recv_timeout(timeout)
    }

    /// Stops consuming and waits for the reorder engine to exit.
    ///
    /// Completions not yet received are discarded. The engine exits once the
    /// intake is closed and drained, or as soon as it tries to deliver another
    /// completion; while the intake is open and nothing is running this call
    /// blocks.
    ///
    /// When called after the stream has ended this reports the engine's final
    /// statistics, or the error that ended the stream (a duplicate id, or
    /// records stranded behind a missing id).
    pub fn finish(self) -> Result<ReorderStats> {
        let OrderedResults { rx, engine } = self;
        drop(rx);
        match engine.join() {
            Ok(res) => res,
            Err(payload) => Err(Error::engine_failed(panic_message(&*payload))),
        }
    }
}

impl<R> Iterator for OrderedResults<R> {
    type Item = Completion<R>;

    fn next(&mut self) -> Option<Self::Item> {
        self.recv()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seqpool_common::error::ErrorKind;

    #[test]
    fn test_zero_workers_rejected() {
        let err = create::<(), ()>(0).err().unwrap();
        match err.kind() {
            ErrorKind::InvalidArgument { name, .. } => assert_eq!(name, "workers"),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_zero_capacity_rejected() {
        let err = PoolOptions::new(2)
            .with_capacity(0)
            .build::<(), ()>()
            .err()
            .unwrap();
        assert!(matches!(err.kind(), ErrorKind::InvalidArgument { .. }));
    }

    #[test]
    fn test_default_options() {
        let options = PoolOptions::default();
        assert!(options.workers() >= 1);
        assert_eq!(options.capacity(), DEFAULT_CHANNEL_CAPACITY);
    }

    #[test]
    fn test_out_of_sequence_rejected() {
        let (mut intake, results) = create::<u64, u64>(2).unwrap();
        intake.submit(WorkUnit::new(0, 0, |x| x)).unwrap();

        let err = intake.submit(WorkUnit::new(2, 2, |x| x)).unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::OutOfSequence {
                expected: 1,
                actual: 2
            }
        ));
        let err = intake.submit(WorkUnit::new(0, 0, |x| x)).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::OutOfSequence { .. }));
        assert_eq!(intake.next_id(), 1);

        intake.close();
        let ids: Vec<u64> = results.map(|c| c.id()).collect();
        assert_eq!(ids, vec![0]);
    }

    #[test]
    fn test_submit_with_assigns_ids() {
        let (mut intake, results) = create::<&'static str, usize>(3).unwrap();
        assert_eq!(intake.submit_with("a", |s| s.len()).unwrap(), 0);
        assert_eq!(intake.submit_with("bb", |s| s.len()).unwrap(), 1);
        assert_eq!(intake.submit_with("ccc", |s| s.len()).unwrap(), 2);
        drop(intake);

        let values: Vec<usize> = results.map(|c| c.into_value().unwrap()).collect();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[test]
    fn test_named_threads() {
        let (mut intake, results) = PoolOptions::new(2)
            .with_thread_name_prefix("named")
            .build::<(), Option<String>>()
            .unwrap();
        intake
            .submit_with((), |_| thread::current().name().map(str::to_string))
            .unwrap();
        intake.close();

        let name = results.recv().unwrap().into_value().unwrap().unwrap();
        assert!(name.starts_with("named-worker-"), "{name}");
        assert!(results.recv().is_none());
        assert_eq!(results.finish().unwrap().released, 1);
    }
}
