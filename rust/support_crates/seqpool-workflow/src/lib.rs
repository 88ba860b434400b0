//! Blocking communication primitives for the seqpool threads.
//!
//! - [`simple_mpmc`] - Bounded multi-producer, multi-consumer channels. The
//!   intake queue of an ordered pool is drained by many worker threads at once,
//!   which `std::sync::mpsc` cannot express.
//!
//! Producer and consumer registrations are explicit on the underlying
//! [`simple_mpmc::SimpleMpmcQueue`], so a component may hold the sole producer
//! registration on behalf of a group of threads and decide on its own when the
//! channel closes.

pub mod simple_mpmc;
