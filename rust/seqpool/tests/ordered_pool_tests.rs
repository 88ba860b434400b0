use std::{
    sync::mpsc::RecvTimeoutError,
    thread,
    time::{Duration, Instant},
};

use seqpool::{ErrorKind, Intake, OrderedResults, PoolOptions, TaskError, WorkUnit};

/// Submits `count` units from a separate thread and collects the ordered output.
fn run_pool<F>(
    (intake, results): (Intake<u64, u64>, OrderedResults<u64>),
    count: u64,
    make_unit: F,
) -> Vec<u64>
where
    F: Fn(u64) -> WorkUnit<u64, u64> + Send + 'static,
{
    let submitter = thread::spawn(move || {
        let mut intake = intake;
        for id in 0..count {
            intake.submit(make_unit(id)).unwrap();
        }
        intake.close();
    });

    let mut ids = Vec::with_capacity(count as usize);
    let mut output = Vec::with_capacity(count as usize);
    let mut results = results;
    for completion in results.by_ref() {
        ids.push(completion.id());
        output.push(completion.into_value().unwrap());
    }
    submitter.join().unwrap();

    let stats = results.finish().unwrap();
    assert_eq!(stats.released, count);
    assert_eq!(ids, (0..count).collect::<Vec<_>>());
    output
}

#[test]
fn test_hundred_thousand_units_in_order() {
    const COUNT: u64 = 100_000;

    let pool = seqpool::create(4).unwrap();
    let output = run_pool(pool, COUNT, |id| {
        let delay = Duration::from_micros(fastrand::u64(0..=20));
        WorkUnit::new(id, id, move |x| {
            thread::sleep(delay);
            x
        })
    });

    assert_eq!(output.len(), COUNT as usize);
    for (i, value) in output.iter().enumerate() {
        assert_eq!(*value, i as u64);
    }
}

#[test]
fn test_millisecond_tasks_many_workers() {
    const COUNT: u64 = 2_000;

    let pool = seqpool::create(16).unwrap();
    let output = run_pool(pool, COUNT, |id| {
        WorkUnit::new(id, id, |x| {
            thread::sleep(Duration::from_millis(1 + x % 3));
            x * 3
        })
    });
    assert_eq!(output, (0..COUNT).map(|x| x * 3).collect::<Vec<_>>());
}

#[test]
fn test_reverse_completion_order() {
    const COUNT: u64 = 32;

    // Every unit runs at once and finishes in reverse submission order.
    let pool = PoolOptions::new(COUNT as usize)
        .with_capacity(COUNT as usize)
        .build()
        .unwrap();
    let output = run_pool(pool, COUNT, |id| {
        WorkUnit::new(id, id, |x| {
            thread::sleep(Duration::from_millis(2 * (COUNT - x)));
            x
        })
    });
    assert_eq!(output, (0..COUNT).collect::<Vec<_>>());
}

#[test]
fn test_reverse_completion_reports_parking() {
    const COUNT: u64 = 16;

    let (mut intake, results) = PoolOptions::new(COUNT as usize)
        .with_capacity(COUNT as usize)
        .build::<u64, u64>()
        .unwrap();
    for id in 0..COUNT {
        intake
            .submit_with(id, |x| {
                thread::sleep(Duration::from_millis(10 * (COUNT - x)));
                x
            })
            .unwrap();
    }
    intake.close();

    let mut results = results;
    let ids: Vec<u64> = results.by_ref().map(|c| c.id()).collect();
    assert_eq!(ids, (0..COUNT).collect::<Vec<_>>());

    let stats = results.finish().unwrap();
    assert_eq!(stats.received, COUNT);
    assert!(stats.peak_pending > 0);
}

#[test]
fn test_empty_pool_closes_immediately() {
    let (intake, results) = seqpool::create::<u64, u64>(4).unwrap();
    intake.close();

    let mut results = results;
    assert!(results.next().is_none());
    let stats = results.finish().unwrap();
    assert_eq!(stats.released, 0);
    assert_eq!(stats.received, 0);
}

#[test]
fn test_single_unit() {
    let (mut intake, results) = seqpool::create::<u64, u64>(4).unwrap();
    intake.submit(WorkUnit::new(0, 41, |x| x + 1)).unwrap();
    intake.close();

    let output: Vec<_> = results.map(|c| c.into_parts()).collect();
    assert_eq!(output, vec![(0, Ok(42))]);
}

#[test]
fn test_single_worker() {
    let pool = seqpool::create(1).unwrap();
    let output = run_pool(pool, 500, |id| WorkUnit::new(id, id, |x| x + 1));
    assert_eq!(output, (1..=500).collect::<Vec<_>>());
}

#[test]
fn test_panicking_units_keep_their_slot() {
    let (mut intake, results) = seqpool::create::<u64, u64>(3).unwrap();
    for id in 0..20 {
        intake
            .submit_with(id, |x| {
                if x % 7 == 3 {
                    panic!("unit {x} refuses to run");
                }
                x
            })
            .unwrap();
    }
    intake.close();

    let mut results = results;
    let mut seen = 0;
    for completion in results.by_ref() {
        let id = completion.id();
        assert_eq!(id, seen);
        match completion.into_value() {
            Ok(value) => assert_eq!(value, id),
            Err(TaskError::Panicked { id: failed, message }) => {
                assert_eq!(failed, id);
                assert_eq!(id % 7, 3);
                assert_eq!(message, format!("unit {id} refuses to run"));
            }
        }
        seen += 1;
    }
    assert_eq!(seen, 20);
    assert_eq!(results.finish().unwrap().released, 20);
}

#[test]
fn test_stall_is_observable_with_timeout() {
    let (mut intake, results) = seqpool::create::<u64, u64>(2).unwrap();
    intake
        .submit_with(0, |x| {
            thread::sleep(Duration::from_millis(300));
            x
        })
        .unwrap();
    intake.submit_with(1, |x| x).unwrap();

    // Id 1 completes right away but must wait behind the slow id 0.
    assert_eq!(
        results.recv_timeout(Duration::from_millis(20)).err(),
        Some(RecvTimeoutError::Timeout)
    );

    intake.close();
    let first = results.recv_timeout(Duration::from_secs(10)).unwrap();
    assert_eq!(first.id(), 0);
    assert_eq!(results.recv().map(|c| c.id()), Some(1));
    assert!(results.recv().is_none());
    assert_eq!(
        results.recv_timeout(Duration::from_millis(1)).err(),
        Some(RecvTimeoutError::Disconnected)
    );
}

#[test]
fn test_stream_does_not_end_while_work_is_outstanding() {
    let (mut intake, results) = seqpool::create::<u64, u64>(2).unwrap();
    let start = Instant::now();
    intake
        .submit_with(0, |x| {
            thread::sleep(Duration::from_millis(100));
            x
        })
        .unwrap();
    intake.close();

    assert_eq!(results.recv().map(|c| c.id()), Some(0));
    assert!(start.elapsed() >= Duration::from_millis(100));
    assert!(results.recv().is_none());
}

#[test]
fn test_dropped_results_close_the_pool() {
    let (mut intake, results) = seqpool::create::<u64, u64>(2).unwrap();
    drop(results);

    let mut outcome = Ok(());
    for _ in 0..10_000 {
        outcome = intake.submit_with(0, |x| x).map(|_| ());
        if outcome.is_err() {
            break;
        }
    }
    let err = outcome.unwrap_err();
    assert!(matches!(err.kind(), ErrorKind::PoolClosed));
}

#[test]
fn test_finish_before_end_discards_rest() {
    let (mut intake, results) = seqpool::create::<u64, u64>(2).unwrap();
    let submitter = thread::spawn(move || {
        for id in 0..1_000 {
            if intake.submit_with(id, |x| x).is_err() {
                return;
            }
        }
        intake.close();
    });

    assert_eq!(results.recv().map(|c| c.id()), Some(0));
    let stats = results.finish().unwrap();
    assert!(stats.released >= 1);
    submitter.join().unwrap();
}

static BOMB_ARMED: std::sync::atomic::AtomicBool = std::sync::atomic::AtomicBool::new(true);

/// Panics once when dropped on the reorder engine thread of an `engine`-prefixed pool.
struct Bomb(u64);

impl Drop for Bomb {
    fn drop(&mut self) {
        if thread::current().name() == Some("engine-reorder")
            && BOMB_ARMED.swap(false, std::sync::atomic::Ordering::SeqCst)
        {
            panic!("bomb {}", self.0);
        }
    }
}

#[test]
fn test_engine_panic_reported_by_finish() {
    let (mut intake, results) = PoolOptions::new(1)
        .with_capacity(1)
        .with_thread_name_prefix("engine")
        .build::<u64, Bomb>()
        .unwrap();
    let submitter = thread::spawn(move || {
        for id in 0..8 {
            if intake.submit_with(id, Bomb).is_err() {
                return;
            }
        }
        intake.close();
    });

    assert_eq!(results.recv().map(|c| c.id()), Some(0));
    // The engine's next delivery fails and drops the record on its own thread.
    let err = results.finish().unwrap_err();
    match err.kind() {
        ErrorKind::EngineFailed { .. } => assert!(err.to_string().contains("bomb")),
        other => panic!("unexpected error: {other:?}"),
    }
    submitter.join().unwrap();
}
