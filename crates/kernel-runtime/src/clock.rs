//! Wall-clock cycle bookkeeping.
//!
//! The clock translates a target block frequency into a block interval and
//! tracks the cycle counter and the start of the current cycle. Cycle state
//! is held in atomics relative to the activation instant, so a single loop
//! thread can advance cycles while reporters read through a shared `Arc`.

use crate::metrics::KernelMetrics;
use kernel_common::config::validate_frequency;
use kernel_common::error::{KernelError, KernelResult};
use kernel_common::movavg::MovingAverage;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{info, trace};

/// Nanoseconds per second, as a float for rate arithmetic.
pub(crate) const NANOS_PER_SEC: f64 = 1_000_000_000.0;

/// Cycle clock for the block production loop.
#[derive(Debug)]
pub struct CycleClock {
    /// Target cycles per second.
    block_frequency: f64,
    /// Target cycle length derived from the frequency.
    block_interval: Duration,
    /// Width of the microsecond field in [`CycleClock::describe`].
    offset_width: usize,
    /// Activation instant; uptime reference.
    start_time: Instant,
    /// Cycles started since activation.
    cycle_number: AtomicU64,
    /// Start of the current cycle, in nanoseconds since activation.
    cycle_start_ns: AtomicU64,
}

impl CycleClock {
    /// Configure a clock for the given target frequency (cycles per second).
    ///
    /// # Errors
    ///
    /// Returns [`KernelError::Config`] if the frequency is not positive and
    /// finite, or if the derived interval does not fit in whole nanoseconds.
    pub fn new(block_frequency: f64) -> KernelResult<Self> {
        validate_frequency(block_frequency)?;

        let interval_ns = NANOS_PER_SEC / block_frequency;
        if interval_ns < 1.0 {
            return Err(KernelError::Config(format!(
                "block frequency {block_frequency} yields a sub-nanosecond interval"
            )));
        }
        if interval_ns >= u64::MAX as f64 {
            return Err(KernelError::Config(format!(
                "block frequency {block_frequency} yields an unrepresentable interval"
            )));
        }

        let block_interval = Duration::from_nanos(interval_ns as u64);
        let offset_width = block_interval.as_micros().to_string().len();

        Ok(Self {
            block_frequency,
            block_interval,
            offset_width,
            start_time: Instant::now(),
            cycle_number: AtomicU64::new(0),
            cycle_start_ns: AtomicU64::new(0),
        })
    }

    /// Mark the clock as running. Uptime and the first cycle are measured
    /// from this instant.
    pub fn activate(&mut self) {
        self.start_time = Instant::now();
        *self.cycle_start_ns.get_mut() = 0;
        info!(
            block_frequency = self.block_frequency,
            block_interval = %humantime::format_duration(self.block_interval),
            "Cycle clock activated"
        );
    }

    /// Start a new cycle now.
    ///
    /// Reports the elapsed time of the previous cycle (or of the time since
    /// activation, for the first cycle) to `metrics` and returns it.
    pub fn start_cycle<A: MovingAverage>(&self, metrics: &KernelMetrics<A>) -> Duration {
        self.start_cycle_at(Instant::now(), metrics)
    }

    /// Start a new cycle at `now`.
    ///
    /// An instant earlier than the current cycle start counts as a zero-length
    /// cycle and leaves the cycle start where it is.
    pub fn start_cycle_at<A: MovingAverage>(
        &self,
        now: Instant,
        metrics: &KernelMetrics<A>,
    ) -> Duration {
        let now_ns = self.nanos_since_start(now);
        let previous_ns = self.cycle_start_ns.fetch_max(now_ns, Ordering::AcqRel);
        let elapsed = Duration::from_nanos(now_ns.saturating_sub(previous_ns));

        metrics.record_cycle_time(elapsed);
        let cycle = self.cycle_number.fetch_add(1, Ordering::AcqRel) + 1;

        trace!(cycle, elapsed_ns = elapsed.as_nanos(), "Cycle started");
        elapsed
    }

    /// Target cycles per second.
    #[must_use]
    pub fn block_frequency(&self) -> f64 {
        self.block_frequency
    }

    /// Target cycle length.
    #[must_use]
    pub fn block_interval(&self) -> Duration {
        self.block_interval
    }

    /// Cycles started since activation.
    #[must_use]
    pub fn cycle_number(&self) -> u64 {
        self.cycle_number.load(Ordering::Acquire)
    }

    /// Activation instant.
    #[must_use]
    pub fn start_time(&self) -> Instant {
        self.start_time
    }

    /// Time since activation.
    #[must_use]
    pub fn uptime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Time since the current cycle started.
    #[must_use]
    pub fn cycle_offset(&self) -> Duration {
        let now_ns = self.nanos_since_start(Instant::now());
        let start_ns = self.cycle_start_ns.load(Ordering::Acquire);
        Duration::from_nanos(now_ns.saturating_sub(start_ns))
    }

    /// Status string `"<cycle>.<micros into cycle>"`, e.g. `"1,204.031337"`.
    #[must_use]
    pub fn describe(&self) -> String {
        self.describe_offset(self.cycle_offset())
    }

    fn describe_offset(&self, offset: Duration) -> String {
        format!(
            "{}.{}",
            group_thousands(self.cycle_number()),
            left_pad_zeroes(offset.as_micros(), self.offset_width)
        )
    }

    fn nanos_since_start(&self, now: Instant) -> u64 {
        u64::try_from(now.saturating_duration_since(self.start_time).as_nanos())
            .unwrap_or(u64::MAX)
    }
}

impl fmt::Display for CycleClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.describe())
    }
}

/// Format an integer with comma thousands separators.
fn group_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Render `value` in exactly `width` digits: zero-padded on the left, or
/// cut to its leading digits when too long.
fn left_pad_zeroes(value: u128, width: usize) -> String {
    let mut digits = value.to_string();
    digits.truncate(width);
    format!("{digits:0>width$}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::Series;
    use std::sync::Arc;

    fn activated(frequency: f64) -> (Arc<CycleClock>, KernelMetrics) {
        let mut clock = CycleClock::new(frequency).unwrap();
        clock.activate();
        let clock = Arc::new(clock);
        let metrics = KernelMetrics::new(Arc::clone(&clock), &[1, 10]).unwrap();
        (clock, metrics)
    }

    #[test]
    fn test_interval_from_frequency() {
        let clock = CycleClock::new(2.0).unwrap();
        assert_eq!(clock.block_interval(), Duration::from_millis(500));

        for frequency in [0.5, 1.0, 3.0, 60.0, 1000.0] {
            let clock = CycleClock::new(frequency).unwrap();
            let expected = NANOS_PER_SEC / clock.block_frequency();
            let actual = clock.block_interval().as_nanos() as f64;
            assert!((actual - expected).abs() <= 1.0, "{frequency} Hz");
        }
    }

    #[test]
    fn test_invalid_frequency_rejected() {
        for frequency in [0.0, -1.0, f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            assert!(
                matches!(CycleClock::new(frequency), Err(KernelError::Config(_))),
                "{frequency} should be rejected"
            );
        }
        // Interval would round below one nanosecond
        assert!(CycleClock::new(2e9).is_err());
        // Interval would overflow u64 nanoseconds
        assert!(CycleClock::new(1e-12).is_err());
    }

    #[test]
    fn test_cycle_number_counts_starts() {
        let (clock, metrics) = activated(1000.0);
        assert_eq!(clock.cycle_number(), 0);

        for k in 1..=5 {
            clock.start_cycle(&metrics);
            assert_eq!(clock.cycle_number(), k);
        }
        assert_eq!(metrics.sample_count(Series::CycleTime), 5);
    }

    #[test]
    fn test_first_cycle_measured_from_activation() {
        let (clock, metrics) = activated(2.0);
        let t1 = clock.start_time() + Duration::from_millis(250);
        let elapsed = clock.start_cycle_at(t1, &metrics);
        assert_eq!(elapsed, Duration::from_millis(250));

        let t2 = t1 + Duration::from_millis(500);
        let elapsed = clock.start_cycle_at(t2, &metrics);
        assert_eq!(elapsed, Duration::from_millis(500));
        assert_eq!(metrics.cycle_time()[0], 500_000_000.0);
    }

    #[test]
    fn test_stale_instant_does_not_rewind() {
        let (clock, metrics) = activated(2.0);
        let t1 = clock.start_time() + Duration::from_millis(400);
        clock.start_cycle_at(t1, &metrics);

        let stale = clock.start_time() + Duration::from_millis(100);
        assert_eq!(clock.start_cycle_at(stale, &metrics), Duration::ZERO);

        let t2 = t1 + Duration::from_millis(100);
        assert_eq!(clock.start_cycle_at(t2, &metrics), Duration::from_millis(100));
        assert_eq!(clock.cycle_number(), 3);
    }

    #[test]
    fn test_describe_format() {
        let (clock, metrics) = activated(2.0);
        for _ in 0..1234 {
            clock.start_cycle_at(clock.start_time(), &metrics);
        }

        // 500ms interval = 500000us, six digit offset field
        assert_eq!(
            clock.describe_offset(Duration::from_micros(31_337)),
            "1,234.031337"
        );
        // Overlong offsets keep their leading digits
        assert_eq!(
            clock.describe_offset(Duration::from_micros(1_234_567)),
            "1,234.123456"
        );

        let live = clock.to_string();
        let (cycle, offset) = live.split_once('.').unwrap();
        assert_eq!(cycle, "1,234");
        assert_eq!(offset.len(), 6);
    }

    #[test]
    fn test_group_thousands() {
        assert_eq!(group_thousands(0), "0");
        assert_eq!(group_thousands(999), "999");
        assert_eq!(group_thousands(1_000), "1,000");
        assert_eq!(group_thousands(1_234_567), "1,234,567");
    }

    #[test]
    fn test_left_pad_zeroes() {
        assert_eq!(left_pad_zeroes(42, 6), "000042");
        assert_eq!(left_pad_zeroes(0, 3), "000");
        assert_eq!(left_pad_zeroes(9_876_543, 4), "9876");
    }
}
