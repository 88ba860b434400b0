//! An order-restoring worker pool.
//!
//! Work units tagged with a gapless sequence id are executed in parallel by a
//! fixed set of worker threads, in whatever order the threads get to them.
//! Their results come back on a single stream strictly in id order, so the
//! caller never has to buffer or sort anything.
//!
//! ```
//! let (mut intake, results) = seqpool::create::<u64, u64>(4)?;
//!
//! let submitter = std::thread::spawn(move || -> seqpool::Result<()> {
//!     for i in 0..100 {
//!         intake.submit_with(i, |x| x * 2)?;
//!     }
//!     intake.close();
//!     Ok(())
//! });
//!
//! for (i, completion) in results.enumerate() {
//!     assert_eq!(completion.id(), i as u64);
//!     assert_eq!(completion.into_value().unwrap(), i as u64 * 2);
//! }
//! submitter.join().unwrap()?;
//! # Ok::<(), seqpool::Error>(())
//! ```
//!
//! # Components
//!
//! - [`WorkUnit`] - an id, an argument payload and a callable
//! - [`Completion`] - the `(id, value)` outcome of one unit; a panicking
//!   callable yields a [`TaskError`] instead of a value
//! - worker threads pull units from the bounded intake queue and push
//!   completions to an unordered channel
//! - a completion tracker closes that channel once every worker has
//!   terminated
//! - the reorder engine, built around [`ReorderBuffer`], parks early
//!   completions and releases contiguous runs onto the ordered stream
//!
//! # Shutdown
//!
//! Closing the [`Intake`] is the only shutdown trigger. Workers drain the
//! intake and terminate, the tracker closes the unordered channel after the
//! last one, and the engine closes [`OrderedResults`] once it has released
//! everything. [`OrderedResults::finish`] then reports whether the stream
//! ended cleanly.

pub mod completion;
pub mod pool;
pub mod reorder;
mod tracker;
pub mod work_unit;
mod worker;

pub use completion::{Completion, TaskError};
pub use pool::{
    DEFAULT_CHANNEL_CAPACITY, Intake, OrderedResults, PoolOptions, create, default_worker_count,
};
pub use reorder::{ReorderBuffer, ReorderStats};
pub use seqpool_common::{Result, error::Error, error::ErrorKind};
pub use work_unit::{TaskFn, WorkUnit};
