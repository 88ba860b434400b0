use std::time::Duration;

use anyhow::{Result, bail};
use seqpool::{PoolOptions, default_worker_count};

use crate::commands::{drive, print_report};

pub fn run(
    workers: Option<usize>,
    count: u64,
    min_delay_us: u64,
    max_delay_us: u64,
    capacity: Option<usize>,
) -> Result<()> {
    if min_delay_us > max_delay_us {
        bail!("--min-delay-us ({min_delay_us}) exceeds --max-delay-us ({max_delay_us})");
    }

    let mut options = PoolOptions::new(workers.unwrap_or_else(default_worker_count));
    if let Some(capacity) = capacity {
        options = options.with_capacity(capacity);
    }
    println!(
        "running {count} units on {} workers, delay {min_delay_us}..={max_delay_us}us",
        options.workers()
    );

    let report = drive(options, count, move |_| {
        Duration::from_micros(fastrand::u64(min_delay_us..=max_delay_us))
    })?;
    print_report(&report);
    Ok(())
}
