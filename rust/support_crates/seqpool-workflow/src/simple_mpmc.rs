//! A bounded, blocking multi-producer, multi-consumer (MPMC) channel.
//!
//! The API mirrors `std::sync::mpsc::sync_channel`, with two additions the
//! ordered pool relies on: receivers can be cloned, and the underlying
//! [`SimpleMpmcQueue`] exposes its producer/consumer registrations so that the
//! moment a channel closes can be decided by its owner rather than by the last
//! dropped handle.
//!
//! **Note**: only the bounded flavor exists. Every queue inside a pool has a
//! fixed capacity, and a zero capacity (rendezvous) queue is not supported.

use std::collections::VecDeque;
use std::sync::mpsc::{RecvError, RecvTimeoutError, SendError, TryRecvError};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Creates a bounded channel holding at most `bound` messages.
///
/// [`send`](Sender::send) blocks while the buffer is full, [`recv`](Receiver::recv)
/// blocks while it is empty and at least one [`Sender`] is alive. Both halves
/// can be cloned.
///
/// Once every [`Receiver`] is dropped, buffered messages are discarded and
/// `send` fails with [`SendError`]. Once every [`Sender`] is dropped, receivers
/// drain what is buffered and then fail with [`RecvError`].
///
/// # Panics
///
/// Panics if `bound` is 0.
pub fn sync_channel<T>(bound: usize) -> (Sender<T>, Receiver<T>) {
    assert_ne!(bound, 0, "sync_channel does not support zero bound");
    let queue = SimpleMpmcQueue::<T>::new(bound);
    (Sender(queue.clone()), Receiver(queue))
}

/// The sending half of a [`sync_channel`].
pub struct Sender<T>(SimpleMpmcQueue<T>);

impl<T> Sender<T> {
    /// Sends a value, blocking while the channel is full.
    ///
    /// Fails, handing the value back, if all receivers are gone or go away
    /// while this call is blocked.
    pub fn send(&self, msg: T) -> Result<(), SendError<T>> {
        self.0.enqueue(msg).map_err(SendError)
    }
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        self.0.add_producer();
        Self(self.0.clone())
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        self.0.drop_producer();
    }
}

/// The receiving half of a [`sync_channel`].
///
/// Clones share the same buffer; each message is received by exactly one of them.
pub struct Receiver<T>(SimpleMpmcQueue<T>);

impl<T> Receiver<T> {
    /// Wraps a queue handle, taking over the consumer registration the queue
    /// was created with.
    ///
    /// This is the way to build a channel whose producer side is managed
    /// manually through [`SimpleMpmcQueue::enqueue`] and
    /// [`SimpleMpmcQueue::drop_producer`].
    pub fn from_queue(queue: SimpleMpmcQueue<T>) -> Self {
        Receiver(queue)
    }

    /// Blocks until a message is available or the channel is closed and empty.
    pub fn recv(&self) -> Result<T, RecvError> {
        self.0.dequeue().map_err(|_| RecvError)
    }

    /// Returns a buffered message without blocking.
    pub fn try_recv(&self) -> Result<T, TryRecvError> {
        match self.0.try_dequeue() {
            Ok(value) => Ok(value),
            Err(TryDequeueError::Empty) => Err(TryRecvError::Empty),
            Err(TryDequeueError::Disconnected) => Err(TryRecvError::Disconnected),
        }
    }

    /// Like [`recv`](Self::recv), but gives up after `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<T, RecvTimeoutError> {
        match self.0.dequeue_timeout(timeout) {
            Ok(value) => Ok(value),
            Err(DequeueTimeoutError::Timeout) => Err(RecvTimeoutError::Timeout),
            Err(DequeueTimeoutError::Disconnected) => Err(RecvTimeoutError::Disconnected),
        }
    }

    /// Returns a blocking iterator that ends once the channel is closed and drained.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        std::iter::from_fn(move || self.recv().ok())
    }
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        self.0.add_consumer();
        Self(self.0.clone())
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        self.0.drop_consumer();
    }
}

/// Returned by [`SimpleMpmcQueue::dequeue`] once the queue is empty and has no producers.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct DequeueError;

impl std::fmt::Display for DequeueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "queue is empty and disconnected")
    }
}

impl std::error::Error for DequeueError {}

/// An error returned from [`SimpleMpmcQueue::try_dequeue`].
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum TryDequeueError {
    /// Nothing is buffered, but producers are still registered.
    Empty,
    /// Nothing is buffered and no producer remains.
    Disconnected,
}

impl std::fmt::Display for TryDequeueError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TryDequeueError::Empty => write!(f, "queue is empty"),
            TryDequeueError::Disconnected => write!(f, "queue is empty and disconnected"),
        }
    }
}

impl std::error::Error for TryDequeueError {}

/// An error returned from [`SimpleMpmcQueue::dequeue_timeout`].
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum DequeueTimeoutError {
    /// No item arrived before the deadline.
    Timeout,
    /// Nothing is buffered and no producer remains.
    Disconnected,
}

impl std::fmt::Display for DequeueTimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DequeueTimeoutError::Timeout => write!(f, "timed out waiting on queue"),
            DequeueTimeoutError::Disconnected => write!(f, "queue is empty and disconnected"),
        }
    }
}

impl std::error::Error for DequeueTimeoutError {}

/// A bounded, blocking MPMC queue with explicit producer and consumer counts.
///
/// Cloning a `SimpleMpmcQueue` creates another handle to the same queue and
/// does NOT register a producer or consumer; use [`add_producer`](Self::add_producer)
/// and [`add_consumer`](Self::add_consumer) for that. A queue starts with one
/// producer and one consumer registered.
///
/// - Producer count reaching zero half-closes the queue: consumers drain the
///   buffer, then observe disconnection.
/// - Consumer count reaching zero closes it: the buffer is cleared and every
///   enqueue fails.
pub struct SimpleMpmcQueue<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for SimpleMpmcQueue<T> {
    fn clone(&self) -> Self {
        SimpleMpmcQueue {
            inner: self.inner.clone(),
        }
    }
}

impl<T> SimpleMpmcQueue<T> {
    /// Creates a queue holding at most `capacity` items.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is 0.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity >= 1, "SimpleMpmcQueue does not support zero capacity");

        let inner = Inner {
            state: Mutex::new(InnerState {
                queue: VecDeque::with_capacity(capacity),
                capacity,
                producers: 1,
                consumers: 1,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
        };

        SimpleMpmcQueue {
            inner: Arc::new(inner),
        }
    }

    /// The maximum number of buffered items.
    pub fn capacity(&self) -> usize {
        self.lock().capacity
    }

    /// The number of currently buffered items.
    pub fn len(&self) -> usize {
        self.lock().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` once no producer is registered.
    pub fn is_half_closed(&self) -> bool {
        self.lock().producers == 0
    }

    /// Registers an additional producer.
    ///
    /// # Panics
    ///
    /// Panics if the queue is already half-closed.
    pub fn add_producer(&self) {
        let mut state = self.lock();
        assert!(
            state.producers != 0,
            "Attempt to add producer when the queue is half-closed"
        );
        state.producers += 1;
    }

    /// De-registers a producer, waking blocked consumers when it was the last one.
    pub fn drop_producer(&self) {
        let mut state = self.lock();
        assert!(
            state.producers >= 1,
            "drop_producer is called more times than add_producer"
        );

        state.producers -= 1;
        if state.producers == 0 {
            self.inner.not_empty.notify_all();
        }
    }

    /// Registers an additional consumer.
    ///
    /// # Panics
    ///
    /// Panics if the queue is already closed.
    pub fn add_consumer(&self) {
        let mut state = self.lock();
        assert!(
            state.consumers > 0,
            "Attempt to add consumer when the queue is closed"
        );
        state.consumers += 1;
    }

    /// De-registers a consumer. The last one closes the queue, dropping
    /// buffered items and waking blocked producers.
    pub fn drop_consumer(&self) {
        let mut state = self.lock();
        assert!(
            state.consumers > 0,
            "drop_consumer is called more times than add_consumer"
        );

        state.consumers -= 1;
        if state.consumers == 0 {
            let dropped = std::mem::take(&mut state.queue);
            drop(state);
            self.inner.not_full.notify_all();
            // Item destructors run outside the lock.
            drop(dropped);
        }
    }

    /// Enqueues an item, blocking while the queue is full.
    ///
    /// Returns the item back if the queue is (or becomes) closed.
    pub fn enqueue(&self, item: T) -> Result<(), T> {
        let mut state = self.lock();
        loop {
            if state.consumers == 0 {
                return Err(item);
            }
            if state.queue.len() < state.capacity {
                break;
            }
            state = self
                .inner
                .not_full
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }

        state.queue.push_back(item);
        drop(state);
        self.inner.not_empty.notify_one();
        Ok(())
    }

    /// Dequeues an item, blocking while the queue is empty and producers remain.
    pub fn dequeue(&self) -> Result<T, DequeueError> {
        let mut state = self.lock();
        loop {
            if let Some(item) = state.queue.pop_front() {
                drop(state);
                self.inner.not_full.notify_one();
                return Ok(item);
            }
            if state.producers == 0 {
                return Err(DequeueError);
            }
            state = self
                .inner
                .not_empty
                .wait(state)
                .unwrap_or_else(|e| e.into_inner());
        }
    }

    /// Dequeues an item, waiting at most `timeout` for one to arrive.
    pub fn dequeue_timeout(&self, timeout: Duration) -> Result<T, DequeueTimeoutError> {
        let deadline = Instant::now() + timeout;
        let mut state = self.lock();
        loop {
            if let Some(item) = state.queue.pop_front() {
                drop(state);
                self.inner.not_full.notify_one();
                return Ok(item);
            }
            if state.producers == 0 {
                return Err(DequeueTimeoutError::Disconnected);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(DequeueTimeoutError::Timeout);
            }
            state = self
                .inner
                .not_empty
                .wait_timeout(state, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }
    }

    /// Dequeues an item without blocking.
    pub fn try_dequeue(&self) -> Result<T, TryDequeueError> {
        let mut state = self.lock();
        if let Some(item) = state.queue.pop_front() {
            drop(state);
            self.inner.not_full.notify_one();
            return Ok(item);
        }
        if state.producers == 0 {
            Err(TryDequeueError::Disconnected)
        } else {
            Err(TryDequeueError::Empty)
        }
    }

    /// Queue state is a plain buffer plus counters and stays consistent even if
    /// a holder of the lock panicked, so poisoning is ignored.
    fn lock(&self) -> MutexGuard<'_, InnerState<T>> {
        self.inner.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

struct InnerState<T> {
    queue: VecDeque<T>,
    capacity: usize,
    producers: usize,
    consumers: usize,
}

struct Inner<T> {
    state: Mutex<InnerState<T>>,
    not_empty: Condvar, // signalled when an item is pushed or the last producer leaves
    not_full: Condvar,  // signalled when an item is popped or the last consumer leaves
}
