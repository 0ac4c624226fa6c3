//! Concurrent recording from handler and reporter threads.

use super::common::activated;
use kernel_runtime::metrics::Series;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[test]
fn test_concurrent_handlers_share_inbound_series() {
    let (_clock, metrics) = activated(1.0, &[10, 1_000]);
    let protocols = ["block", "transaction", "consensus"];

    let handles: Vec<_> = (0..12)
        .map(|i| {
            let metrics = Arc::clone(&metrics);
            let protocol = protocols[i % protocols.len()];
            thread::spawn(move || {
                for depth in 0..250 {
                    metrics.record_inbound_queue_depth(protocol, depth % 10);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }

    let depths = metrics.inbound_queue_depths();
    assert_eq!(depths.len(), protocols.len());
    for protocol in protocols {
        assert_eq!(metrics.inbound_queue_sample_count(protocol), Some(1_000));
        assert!((depths[protocol][1] - 4.5).abs() < 1e-9);
    }
}

#[test]
fn test_reporter_reads_while_cycle_records() {
    let (clock, metrics) = activated(1_000.0, &[1, 10, 100]);
    let done = Arc::new(AtomicBool::new(false));

    let reporter = {
        let metrics = Arc::clone(&metrics);
        let done = Arc::clone(&done);
        thread::spawn(move || {
            let mut reports = 0usize;
            while !done.load(Ordering::Acquire) {
                let report = metrics.report();
                assert!(report.contains("Cycle number:"));
                for series in Series::ALL {
                    assert!(metrics.averages(series).iter().all(|v| v.is_finite()));
                }
                reports += 1;
            }
            reports
        })
    };

    for i in 0..2_000u64 {
        clock.start_cycle(&*metrics);
        metrics.record_maintenance_time(Duration::from_micros(100 + i % 50));
        let budget = metrics.compute_scheduled_budget();
        assert!(budget <= clock.block_interval());
        metrics.record_processing_time(budget / 2);
        metrics.record_inbound_queue_depth("block", (i % 8) as usize);
    }
    done.store(true, Ordering::Release);

    assert!(reporter.join().unwrap() > 0);
    assert_eq!(clock.cycle_number(), 2_000);
    assert_eq!(metrics.sample_count(Series::ComputedProcessingTime), 2_000);
    assert_eq!(metrics.overrun_count(), 0);
}
