//! Command implementations for seqpool-cmd

use std::{
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result, bail};
use seqpool::{PoolOptions, ReorderStats};

pub mod reverse;
pub mod run;

/// What a drive over the pool observed.
pub struct DriveReport {
    pub delivered: u64,
    pub elapsed: Duration,
    pub stats: ReorderStats,
}

/// Submits `count` units from a dedicated thread, each sleeping for
/// `delay(id)` and returning its id, and checks that the ordered stream yields
/// exactly `0..count`.
pub fn drive(
    options: PoolOptions,
    count: u64,
    delay: impl Fn(u64) -> Duration + Send + 'static,
) -> Result<DriveReport> {
    let (mut intake, results) = options
        .with_thread_name_prefix("seqpool")
        .build::<u64, u64>()
        .context("Failed to start the pool")?;

    let start = Instant::now();
    let submitter = thread::Builder::new()
        .name("seqpool-submit".to_string())
        .spawn(move || -> seqpool::Result<()> {
            for id in 0..count {
                let pause = delay(id);
                intake.submit_with(id, move |x| {
                    thread::sleep(pause);
                    x
                })?;
            }
            intake.close();
            Ok(())
        })
        .context("Failed to spawn the submitting thread")?;

    let mut results = results;
    let mut delivered = 0u64;
    for completion in results.by_ref() {
        let value = completion
            .into_value()
            .with_context(|| format!("Unit {delivered} failed"))?;
        if value != delivered {
            bail!("Out of order delivery: position {delivered} carried value {value}");
        }
        delivered += 1;
    }
    let elapsed = start.elapsed();

    match submitter.join() {
        Ok(res) => res.context("Submission failed")?,
        Err(_) => bail!("Submitting thread panicked"),
    }
    let stats = results.finish().context("Ordered stream ended abnormally")?;

    if delivered != count {
        bail!("Expected {count} completions, received {delivered}");
    }
    log::debug!("drive finished in {elapsed:?}");

    Ok(DriveReport {
        delivered,
        elapsed,
        stats,
    })
}

pub fn print_report(report: &DriveReport) {
    let secs = report.elapsed.as_secs_f64();
    let rate = if secs > 0.0 {
        report.delivered as f64 / secs
    } else {
        f64::INFINITY
    };
    println!("delivered:     {} (in order)", report.delivered);
    println!("elapsed:       {:.3}s ({rate:.0} units/s)", secs);
    println!("fast path:     {}", report.stats.fast_path);
    println!("peak parked:   {}", report.stats.peak_pending);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drive_verifies_order() {
        let report = drive(PoolOptions::new(4), 300, |id| {
            Duration::from_micros((id * 37) % 200)
        })
        .unwrap();
        assert_eq!(report.delivered, 300);
        assert_eq!(report.stats.released, 300);
    }

    #[test]
    fn test_drive_rejects_invalid_options() {
        let err = drive(PoolOptions::new(0), 10, |_| Duration::ZERO)
            .err()
            .unwrap();
        assert!(err.to_string().contains("Failed to start the pool"));
    }
}
