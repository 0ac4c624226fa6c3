//! Processing budget and utilization tests driven through the clock.

use super::common::{activated, approx_eq};
use kernel_common::movavg::{MovingAverage, SmaSet};
use kernel_runtime::metrics::Series;
use std::time::Duration;

#[test]
fn test_budget_follows_smoothed_maintenance() {
    // 2 cycles/s: 500ms interval
    let (clock, metrics) = activated(2.0, &[1, 10]);
    assert_eq!(clock.block_interval(), Duration::from_millis(500));

    metrics.record_maintenance_time(Duration::from_millis(100));
    assert_eq!(metrics.compute_scheduled_budget(), Duration::from_millis(400));

    metrics.record_maintenance_time(Duration::from_millis(600));
    assert_eq!(metrics.compute_scheduled_budget(), Duration::ZERO);
    assert_eq!(metrics.overrun_count(), 1);
    assert_eq!(metrics.last_overrun(), Some(Duration::from_millis(100)));

    let scheduled = metrics.computed_processing_time();
    assert_eq!(scheduled[0], -100_000_000.0);
    // Window 10 averages 400ms and -100ms
    assert_eq!(scheduled[1], 150_000_000.0);
    assert_eq!(metrics.computed_processing_time_percent()[0], -20.0);
}

#[test]
fn test_cycle_number_counts_started_cycles() {
    let (clock, metrics) = activated(10.0, &[1, 100]);
    let start = clock.start_time();

    for k in 1..=25u64 {
        let elapsed = clock.start_cycle_at(start + Duration::from_millis(100 * k), &*metrics);
        assert_eq!(elapsed, Duration::from_millis(100));
        assert_eq!(clock.cycle_number(), k);
    }

    assert_eq!(metrics.sample_count(Series::CycleTime), 25);
    assert!(approx_eq(metrics.cycle_time()[1], 100_000_000.0));
}

#[test]
fn test_utilization_over_cycles() {
    let (clock, metrics) = activated(1.0, &[1, 3]);
    let start = clock.start_time();

    // Cycle k records maintenance after it starts; the next start pairs it
    // with that cycle's length.
    let maintenance_ms = [100u64, 200, 300];
    for (i, &ms) in maintenance_ms.iter().enumerate() {
        let at = start + Duration::from_secs(i as u64 + 1);
        clock.start_cycle_at(at, &*metrics);
        metrics.record_maintenance_time(Duration::from_millis(ms));
        metrics.record_processing_time(Duration::from_millis(500));
    }
    clock.start_cycle_at(start + Duration::from_secs(4), &*metrics);

    let maint = metrics.maintenance_time_percent();
    assert!(approx_eq(maint[0], 30.0));
    // Samples: 0 (no maintenance yet), 10, 20, 30; window 3 keeps the last three
    assert!(approx_eq(maint[1], 20.0));
    assert!(approx_eq(metrics.processing_time_percent()[0], 50.0));
}

#[test]
fn test_describe_tracks_cycles() {
    let (clock, metrics) = activated(2.0, &[1]);
    for _ in 0..1_234 {
        clock.start_cycle(&*metrics);
    }
    let description = clock.describe();
    // 500ms interval: six microsecond digits
    let (cycle, micros) = description.split_once('.').expect("cycle.micros");
    assert_eq!(cycle, "1,234");
    assert_eq!(micros.len(), 6);
    assert!(micros.chars().all(|c| c.is_ascii_digit()));
}

#[test]
fn test_sma_windows_match_brute_force() {
    let windows = [1, 7, 64, 500];
    let series = SmaSet::with_windows(&windows).unwrap();
    let mut samples = Vec::new();

    for i in 0..2_000u32 {
        let value = f64::from((i * 37) % 101) - 20.0;
        series.add(value);
        samples.push(value);

        if i % 97 == 0 || i == 1_999 {
            for (w, avg) in windows.iter().zip(series.averages()) {
                let tail = &samples[samples.len().saturating_sub(*w)..];
                let expected = tail.iter().sum::<f64>() / tail.len() as f64;
                assert!(
                    (avg - expected).abs() < 1e-9,
                    "window {w} after {} samples: {avg} != {expected}",
                    samples.len()
                );
            }
        }
    }
}
