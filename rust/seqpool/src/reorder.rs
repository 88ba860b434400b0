//! Restoring submission order over an unordered stream of completions.
//!
//! [`ReorderBuffer`] is the single-threaded state machine: it tracks the cursor
//! (the id of the last released record), parks records that arrive ahead of
//! the cursor and hands back the contiguous run that becomes releasable when a
//! missing id shows up.
//!
//! [`ReorderEngine`] drives a buffer from the pool's unordered completion
//! channel into its ordered output channel on a dedicated thread. The buffer is
//! owned by that thread alone; nothing else ever observes or mutates it.

use std::collections::BTreeMap;

use seqpool_common::{Result, error::Error};
use seqpool_workflow::simple_mpmc::{Receiver, Sender};

use crate::completion::Completion;

/// Counters describing the work done by a [`ReorderBuffer`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReorderStats {
    /// Records accepted into the buffer (fast path included).
    pub received: u64,
    /// Records released in order.
    pub released: u64,
    /// Records released on arrival, without being parked.
    pub fast_path: u64,
    /// The largest number of records parked at the same time.
    pub peak_pending: usize,
}

/// Re-establishes id order over completions arriving in arbitrary order.
///
/// Every id must arrive exactly once, and the ids must be the gapless sequence
/// `0, 1, 2, ...`. Under that contract each record is released exactly once,
/// release order is strictly increasing with no gaps, and id `k` is released
/// only after ids `0..k`.
///
/// Parked records live in a `BTreeMap` keyed by id, so insertion is
/// logarithmic and the minimum is always at hand. In near-order completion
/// patterns the map stays small; if the lowest outstanding unit is slow it may
/// hold nearly every completion.
pub struct ReorderBuffer<R> {
    next_expected: u64,
    pending: BTreeMap<u64, Completion<R>>,
    stats: ReorderStats,
}

impl<R> ReorderBuffer<R> {
    pub fn new() -> Self {
        ReorderBuffer {
            next_expected: 0,
            pending: BTreeMap::new(),
            stats: ReorderStats::default(),
        }
    }

    /// The id of the last released record, or `None` if nothing has been
    /// released yet.
    pub fn cursor(&self) -> Option<u64> {
        self.next_expected.checked_sub(1)
    }

    /// The id that must arrive next for the buffer to make progress.
    pub fn next_expected(&self) -> u64 {
        self.next_expected
    }

    /// The number of parked records.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Ids of the parked records, ascending.
    pub fn pending_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.pending.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn stats(&self) -> &ReorderStats {
        &self.stats
    }

    /// Accepts one completion.
    ///
    /// If it carries the next expected id it is released right away and
    /// returned; otherwise it is parked and `None` is returned. Either way the
    /// caller should follow up with [`pop_ready`](Self::pop_ready) until it
    /// yields `None`, since a released record may unblock parked ones.
    ///
    /// A record whose id was already released or is already parked is
    /// rejected with `DuplicateCompletion` and the buffer is left unchanged.
    pub fn accept(&mut self, completion: Completion<R>) -> Result<Option<Completion<R>>> {
        let id = completion.id();
        if id < self.next_expected || self.pending.contains_key(&id) {
            return Err(Error::duplicate_completion(id));
        }

        self.stats.received += 1;
        if id == self.next_expected {
            self.stats.fast_path += 1;
            return Ok(Some(self.release(completion)));
        }

        log::trace!(
            "parking completion {id}, waiting for {}",
            self.next_expected
        );
        self.pending.insert(id, completion);
        self.stats.peak_pending = self.stats.peak_pending.max(self.pending.len());
        Ok(None)
    }

    /// Releases the lowest parked record if it is the next expected one.
    pub fn pop_ready(&mut self) -> Option<Completion<R>> {
        let entry = self.pending.first_entry()?;
        if *entry.key() != self.next_expected {
            return None;
        }
        let completion = entry.remove();
        Some(self.release(completion))
    }

    /// Consumes the buffer once no more completions can arrive.
    ///
    /// Fails with `UndeliveredCompletions` if records are still parked, which
    /// means some id before them never arrived.
    pub fn finish(self) -> Result<ReorderStats> {
        if self.pending.is_empty() {
            Ok(self.stats)
        } else {
            Err(Error::undelivered(
                self.cursor(),
                self.pending.keys().copied().collect(),
            ))
        }
    }

    fn release(&mut self, completion: Completion<R>) -> Completion<R> {
        debug_assert_eq!(completion.id(), self.next_expected);
        self.next_expected += 1;
        self.stats.released += 1;
        completion
    }
}

impl<R> Default for ReorderBuffer<R> {
    fn default() -> Self {
        Self::new()
    }
}

/// Moves completions from the unordered channel to the ordered one.
///
/// The engine runs until the unordered channel is closed and drained, which
/// the completion tracker does once every worker has terminated. It then
/// closes the ordered channel by dropping its sender.
pub(crate) struct ReorderEngine<R> {
    input: Receiver<Completion<R>>,
    output: Sender<Completion<R>>,
    buffer: ReorderBuffer<R>,
}

impl<R> ReorderEngine<R> {
    pub fn new(input: Receiver<Completion<R>>, output: Sender<Completion<R>>) -> Self {
        ReorderEngine {
            input,
            output,
            buffer: ReorderBuffer::new(),
        }
    }

    /// Runs the engine to completion.
    ///
    /// Returns early, with the statistics gathered so far, if the consumer of
    /// the ordered channel goes away. Dropping the input receiver on return
    /// closes the unordered channel, which in turn stops the workers.
    pub fn run(self) -> Result<ReorderStats> {
        let ReorderEngine {
            input,
            output,
            mut buffer,
        } = self;

        while let Ok(completion) = input.recv() {
            let mut ready = buffer.accept(completion).inspect_err(|e| {
                log::error!("reorder engine stopped: {e}");
            })?;

            loop {
                let Some(completion) = ready.take().or_else(|| buffer.pop_ready()) else {
                    break;
                };
                if output.send(completion).is_err() {
                    log::debug!(
                        "ordered output dropped by consumer at cursor {:?}, stopping",
                        buffer.cursor()
                    );
                    return Ok(*buffer.stats());
                }
            }
        }

        drop(output);
        match buffer.finish() {
            Ok(stats) => {
                log::debug!(
                    "reorder engine finished: {} released, {} on fast path, peak pending {}",
                    stats.released,
                    stats.fast_path,
                    stats.peak_pending
                );
                Ok(stats)
            }
            Err(e) => {
                log::error!("{e}");
                Err(e)
            }
        }
    }
}
