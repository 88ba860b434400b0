use std::time::Duration;

use anyhow::{Result, bail};
use seqpool::{PoolOptions, default_worker_count};

use crate::commands::{drive, print_report};

/// Unit `i` sleeps `(count - i) * step_us`, so with enough workers the
/// completions arrive in exactly reverse order and the whole stream is
/// released in one run when unit 0 finishes.
pub fn run(workers: Option<usize>, count: u64, step_us: u64) -> Result<()> {
    let options = reverse_options(workers, count, step_us)?;
    println!(
        "running {count} units on {} workers in reverse completion order",
        options.workers()
    );

    let report = drive(options, count, move |id| {
        Duration::from_micros((count - id) * step_us)
    })?;
    print_report(&report);
    Ok(())
}

/// Validates the arguments of a reverse run and picks the pool options.
///
/// Without `--workers` the pool gets one worker per unit, capped at eight
/// times the default worker count.
fn reverse_options(workers: Option<usize>, count: u64, step_us: u64) -> Result<PoolOptions> {
    if count == 0 {
        bail!("--count must be positive for a reverse run");
    }
    if count.checked_mul(step_us).is_none() {
        bail!("--count ({count}) times --step-us ({step_us}) overflows the longest delay");
    }

    let per_unit = usize::try_from(count).unwrap_or(usize::MAX);
    let workers = workers.unwrap_or_else(|| per_unit.min(default_worker_count() * 8));
    Ok(PoolOptions::new(workers).with_capacity(per_unit.min(workers.max(1))))
}
