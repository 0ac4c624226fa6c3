//! Kernel performance metrics and processing budget derivation.
//!
//! Every phase of a cycle feeds one multi-window moving average. Two
//! scalars hold the latest raw maintenance and processing durations; they
//! are paired with the following cycle's length to produce utilization
//! percentages.
//!
//! The scheduled processing budget is the block interval minus the
//! shortest-window average of maintenance time. When maintenance alone
//! overruns the interval the budget is clamped to zero and the overrun is
//! logged at error level.
//!
//! # Threading Model
//!
//! - **Cycle loop**: records phase durations and computes the budget
//! - **Protocol handlers**: record inbound queue depths by name
//! - **Reporters**: read averages and build reports
//!
//! All of these may run concurrently on a shared `Arc<KernelMetrics>`.

use crate::clock::{CycleClock, NANOS_PER_SEC};
use crossbeam_utils::CachePadded;
use dashmap::DashMap;
use kernel_common::error::KernelResult;
use kernel_common::movavg::{normalize_windows, MovingAverage, SmaSet};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, trace};

/// Fixed series tracked by [`KernelMetrics`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Series {
    /// Wall time between consecutive cycle starts (ns).
    CycleTime,
    /// Maintenance phase duration (ns).
    MaintenanceTime,
    /// Previous maintenance duration as a percent of this cycle.
    MaintenanceTimePercent,
    /// Block generation duration (ns).
    BlockGenerationTime,
    /// Block add duration (ns).
    BlockAddTime,
    /// Block confirmation duration (ns).
    BlockConfirmationTime,
    /// Head block evaluation duration (ns).
    HeadEvaluationTime,
    /// Scheduled processing budget (ns, may be negative).
    ComputedProcessingTime,
    /// Scheduled processing budget as a percent of the block interval.
    ComputedProcessingTimePercent,
    /// Actual processing phase duration (ns).
    ProcessingTime,
    /// Previous processing duration as a percent of this cycle.
    ProcessingTimePercent,
    /// Outbound block queue depth.
    OutboundQueueDepth,
}

impl Series {
    /// Every fixed series, in report order.
    pub const ALL: [Series; 12] = [
        Series::CycleTime,
        Series::MaintenanceTime,
        Series::MaintenanceTimePercent,
        Series::BlockGenerationTime,
        Series::BlockAddTime,
        Series::BlockConfirmationTime,
        Series::HeadEvaluationTime,
        Series::ComputedProcessingTime,
        Series::ComputedProcessingTimePercent,
        Series::ProcessingTime,
        Series::ProcessingTimePercent,
        Series::OutboundQueueDepth,
    ];

    /// Snake-case metric name, suitable for exporters.
    #[must_use]
    pub fn metric_name(self) -> &'static str {
        match self {
            Series::CycleTime => "cycle_time_ns",
            Series::MaintenanceTime => "maintenance_time_ns",
            Series::MaintenanceTimePercent => "maintenance_time_percent",
            Series::BlockGenerationTime => "block_generation_time_ns",
            Series::BlockAddTime => "block_add_time_ns",
            Series::BlockConfirmationTime => "block_confirmation_time_ns",
            Series::HeadEvaluationTime => "head_evaluation_time_ns",
            Series::ComputedProcessingTime => "scheduled_processing_time_ns",
            Series::ComputedProcessingTimePercent => "scheduled_processing_time_percent",
            Series::ProcessingTime => "processing_time_ns",
            Series::ProcessingTimePercent => "processing_time_percent",
            Series::OutboundQueueDepth => "outbound_queue_depth",
        }
    }
}

/// Multi-window performance metrics for the kernel cycle.
pub struct KernelMetrics<A: MovingAverage = SmaSet> {
    clock: Arc<CycleClock>,
    cycle_time: A,
    maint_time: A,
    maint_time_percent: A,
    gen_block_time: A,
    add_block_time: A,
    conf_block_time: A,
    eval_time: A,
    computed_proc_time: A,
    computed_proc_time_percent: A,
    actual_proc_time: A,
    actual_proc_time_percent: A,
    outbound_queue_depth: A,
    /// Inbound receive-queue depth per protocol, created on first use.
    inbound_queue_depths: DashMap<String, A>,
    /// Latest maintenance duration (ns), not averaged.
    last_maint_ns: CachePadded<AtomicU64>,
    /// Latest processing duration (ns), not averaged.
    last_proc_ns: CachePadded<AtomicU64>,
    overrun_count: AtomicU64,
    last_overrun_ns: AtomicU64,
    windows: Vec<usize>,
}

impl KernelMetrics {
    /// Create metrics backed by [`SmaSet`] series.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an empty or zero window list.
    pub fn new(clock: Arc<CycleClock>, windows: &[usize]) -> KernelResult<Self> {
        Self::with_series(clock, windows)
    }
}

impl<A: MovingAverage> KernelMetrics<A> {
    /// Create metrics backed by any [`MovingAverage`] implementation.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an empty or zero window list.
    pub fn with_series(clock: Arc<CycleClock>, windows: &[usize]) -> KernelResult<Self> {
        let windows = normalize_windows(windows)?;
        Ok(Self {
            clock,
            cycle_time: A::with_windows(&windows)?,
            maint_time: A::with_windows(&windows)?,
            maint_time_percent: A::with_windows(&windows)?,
            gen_block_time: A::with_windows(&windows)?,
            add_block_time: A::with_windows(&windows)?,
            conf_block_time: A::with_windows(&windows)?,
            eval_time: A::with_windows(&windows)?,
            computed_proc_time: A::with_windows(&windows)?,
            computed_proc_time_percent: A::with_windows(&windows)?,
            actual_proc_time: A::with_windows(&windows)?,
            actual_proc_time_percent: A::with_windows(&windows)?,
            outbound_queue_depth: A::with_windows(&windows)?,
            inbound_queue_depths: DashMap::new(),
            last_maint_ns: CachePadded::new(AtomicU64::new(0)),
            last_proc_ns: CachePadded::new(AtomicU64::new(0)),
            overrun_count: AtomicU64::new(0),
            last_overrun_ns: AtomicU64::new(0),
            windows,
        })
    }

    /// Record the length of the cycle that just ended.
    ///
    /// Also samples the utilization percentages, pairing this cycle's length
    /// with the most recently recorded maintenance and processing durations.
    /// Those were recorded during the previous cycle, so the percentages lag
    /// by one cycle. A zero-length cycle skips the percentage samples.
    pub fn record_cycle_time(&self, duration: Duration) {
        self.cycle_time.add(duration.as_nanos() as f64);

        if duration.is_zero() {
            trace!("Zero-length cycle, utilization samples skipped");
            return;
        }

        let cycle_ns = duration.as_nanos() as f64;
        let maint_ns = self.last_maint_ns.load(Ordering::Acquire) as f64;
        let proc_ns = self.last_proc_ns.load(Ordering::Acquire) as f64;
        self.maint_time_percent.add(100.0 * maint_ns / cycle_ns);
        self.actual_proc_time_percent.add(100.0 * proc_ns / cycle_ns);
    }

    /// Record the maintenance phase duration.
    pub fn record_maintenance_time(&self, duration: Duration) {
        self.maint_time.add(duration.as_nanos() as f64);
        self.last_maint_ns.store(nanos(duration), Ordering::Release);
    }

    /// Record the block generation duration.
    pub fn record_block_generation_time(&self, duration: Duration) {
        self.gen_block_time.add(duration.as_nanos() as f64);
    }

    /// Record the block add duration.
    pub fn record_block_add_time(&self, duration: Duration) {
        self.add_block_time.add(duration.as_nanos() as f64);
    }

    /// Record the block confirmation duration.
    pub fn record_block_confirmation_time(&self, duration: Duration) {
        self.conf_block_time.add(duration.as_nanos() as f64);
    }

    /// Record the head block evaluation duration.
    pub fn record_head_evaluation_time(&self, duration: Duration) {
        self.eval_time.add(duration.as_nanos() as f64);
    }

    /// Record the actual processing phase duration.
    pub fn record_processing_time(&self, duration: Duration) {
        self.actual_proc_time.add(duration.as_nanos() as f64);
        self.last_proc_ns.store(nanos(duration), Ordering::Release);
    }

    /// Record the outbound block queue depth.
    pub fn record_outbound_queue_depth(&self, count: usize) {
        self.outbound_queue_depth.add(count as f64);
    }

    /// Record the inbound receive-queue depth for `name`, creating its
    /// series on first use.
    pub fn record_inbound_queue_depth(&self, name: &str, count: usize) {
        if let Some(series) = self.inbound_queue_depths.get(name) {
            series.add(count as f64);
            return;
        }

        // The entry holds its shard lock, so concurrent first use of a name
        // creates exactly one series.
        match self
            .inbound_queue_depths
            .entry(name.to_owned())
            .or_try_insert_with(|| A::with_windows(&self.windows))
        {
            Ok(series) => series.add(count as f64),
            Err(e) => error!(queue = name, error = %e, "Failed to create inbound queue series"),
        }
    }

    /// Compute the processing budget for the upcoming production phase.
    ///
    /// `budget = block interval - shortest-window maintenance average`. The
    /// raw budget, negative or not, is appended to the scheduled processing
    /// series. A negative budget is an overrun: it is logged and counted,
    /// and zero is returned.
    pub fn compute_scheduled_budget(&self) -> Duration {
        let smoothed_maint_ns = self.maint_time.averages().first().copied().unwrap_or(0.0);
        let interval_ns = self.clock.block_interval().as_nanos() as f64;
        let budget_ns = interval_ns - smoothed_maint_ns;

        self.computed_proc_time.add(budget_ns);
        self.computed_proc_time_percent
            .add(budget_ns * self.clock.block_frequency() * 100.0 / NANOS_PER_SEC);

        if budget_ns < 0.0 {
            let overrun_ns = -budget_ns;
            self.overrun_count.fetch_add(1, Ordering::Relaxed);
            self.last_overrun_ns
                .store(overrun_ns as u64, Ordering::Relaxed);
            error!(
                kernel_time = %self.clock,
                overrun_ns,
                smoothed_maintenance_ns = smoothed_maint_ns,
                interval_ns,
                "Processing time overrun"
            );
            return Duration::ZERO;
        }

        Duration::from_nanos(budget_ns as u64)
    }

    /// Per-window averages of a fixed series, shortest window first.
    #[must_use]
    pub fn averages(&self, series: Series) -> Vec<f64> {
        self.series(series).averages()
    }

    /// Number of samples appended to a fixed series.
    #[must_use]
    pub fn sample_count(&self, series: Series) -> u64 {
        self.series(series).count()
    }

    /// Cycle time averages (ns).
    #[must_use]
    pub fn cycle_time(&self) -> Vec<f64> {
        self.cycle_time.averages()
    }

    /// Maintenance time averages (ns).
    #[must_use]
    pub fn maintenance_time(&self) -> Vec<f64> {
        self.maint_time.averages()
    }

    /// Maintenance time as a percent of cycle time.
    #[must_use]
    pub fn maintenance_time_percent(&self) -> Vec<f64> {
        self.maint_time_percent.averages()
    }

    /// Block generation time averages (ns).
    #[must_use]
    pub fn block_generation_time(&self) -> Vec<f64> {
        self.gen_block_time.averages()
    }

    /// Block add time averages (ns).
    #[must_use]
    pub fn block_add_time(&self) -> Vec<f64> {
        self.add_block_time.averages()
    }

    /// Block confirmation time averages (ns).
    #[must_use]
    pub fn block_confirmation_time(&self) -> Vec<f64> {
        self.conf_block_time.averages()
    }

    /// Head block evaluation time averages (ns).
    #[must_use]
    pub fn head_evaluation_time(&self) -> Vec<f64> {
        self.eval_time.averages()
    }

    /// Scheduled processing budget averages (ns).
    #[must_use]
    pub fn computed_processing_time(&self) -> Vec<f64> {
        self.computed_proc_time.averages()
    }

    /// Scheduled processing budget as a percent of the block interval.
    #[must_use]
    pub fn computed_processing_time_percent(&self) -> Vec<f64> {
        self.computed_proc_time_percent.averages()
    }

    /// Actual processing time averages (ns).
    #[must_use]
    pub fn processing_time(&self) -> Vec<f64> {
        self.actual_proc_time.averages()
    }

    /// Actual processing time as a percent of cycle time.
    #[must_use]
    pub fn processing_time_percent(&self) -> Vec<f64> {
        self.actual_proc_time_percent.averages()
    }

    /// Outbound block queue depth averages.
    #[must_use]
    pub fn outbound_queue_depth(&self) -> Vec<f64> {
        self.outbound_queue_depth.averages()
    }

    /// Inbound queue depth averages for one protocol, if it has reported.
    #[must_use]
    pub fn inbound_queue_depth(&self, name: &str) -> Option<Vec<f64>> {
        self.inbound_queue_depths.get(name).map(|s| s.averages())
    }

    /// Number of samples recorded for one inbound queue.
    #[must_use]
    pub fn inbound_queue_sample_count(&self, name: &str) -> Option<u64> {
        self.inbound_queue_depths.get(name).map(|s| s.count())
    }

    /// Inbound queue depth averages for every protocol, keyed by name.
    #[must_use]
    pub fn inbound_queue_depths(&self) -> BTreeMap<String, Vec<f64>> {
        self.inbound_queue_depths
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().averages()))
            .collect()
    }

    /// Most recent raw maintenance duration.
    #[must_use]
    pub fn last_maintenance_time(&self) -> Duration {
        Duration::from_nanos(self.last_maint_ns.load(Ordering::Acquire))
    }

    /// Most recent raw processing duration.
    #[must_use]
    pub fn last_processing_time(&self) -> Duration {
        Duration::from_nanos(self.last_proc_ns.load(Ordering::Acquire))
    }

    /// Number of budget computations that overran the block interval.
    #[must_use]
    pub fn overrun_count(&self) -> u64 {
        self.overrun_count.load(Ordering::Relaxed)
    }

    /// Magnitude of the most recent overrun.
    #[must_use]
    pub fn last_overrun(&self) -> Option<Duration> {
        if self.overrun_count() == 0 {
            return None;
        }
        Some(Duration::from_nanos(
            self.last_overrun_ns.load(Ordering::Relaxed),
        ))
    }

    /// Window sizes shared by every series, ascending.
    #[must_use]
    pub fn windows(&self) -> &[usize] {
        &self.windows
    }

    /// Clock these metrics are bound to.
    #[must_use]
    pub fn clock(&self) -> &Arc<CycleClock> {
        &self.clock
    }

    /// Multi-line operator report of clock state and every series.
    #[must_use]
    pub fn report(&self) -> String {
        let clock = &self.clock;
        let mut b = String::new();

        // Writing to a String cannot fail.
        let _ = writeln!(b, "Kernel time (cycle.micros): {clock}");
        let _ = writeln!(
            b,
            "Kernel uptime: {}",
            humantime::format_duration(truncate_to_millis(clock.uptime()))
        );
        let _ = writeln!(b, "Moving average windows (num cycles): {:?}", self.windows);
        let _ = writeln!(
            b,
            "Block queue depth: {}",
            format_averages(&self.outbound_queue_depth())
        );
        let _ = writeln!(b, "Receive queue depth:");
        for (name, averages) in self.inbound_queue_depths() {
            let _ = writeln!(b, "  {name}: {}", format_averages(&averages));
        }

        let _ = writeln!(b, "--- Cycles ---");
        let _ = writeln!(b, "Cycle number: {}", clock.cycle_number());
        let _ = writeln!(
            b,
            "Configured cycle time (block interval): {}",
            humantime::format_duration(clock.block_interval())
        );
        let _ = writeln!(b, "Budget overruns: {}", self.overrun_count());
        let _ = writeln!(
            b,
            "Actual cycle time (ns): {}",
            format_averages(&self.cycle_time())
        );

        let _ = writeln!(b, "--- Process Timeslice ---");
        let _ = writeln!(
            b,
            "Process timeslice time (ns): {}",
            format_averages(&self.processing_time())
        );
        let _ = writeln!(
            b,
            "Process timeslice % of cycle time: {}",
            format_averages(&self.processing_time_percent())
        );
        let _ = writeln!(
            b,
            "Scheduled process timeslice time (ns): {}",
            format_averages(&self.computed_processing_time())
        );
        let _ = writeln!(
            b,
            "Scheduled process timeslice % of block interval: {}",
            format_averages(&self.computed_processing_time_percent())
        );
        let _ = writeln!(
            b,
            "Block generation time (ns): {}",
            format_averages(&self.block_generation_time())
        );
        let _ = writeln!(
            b,
            "Block add time (ns): {}",
            format_averages(&self.block_add_time())
        );

        let _ = writeln!(b, "--- Maintenance Timeslice ---");
        let _ = writeln!(
            b,
            "Maintenance timeslice time (ns): {}",
            format_averages(&self.maintenance_time())
        );
        let _ = writeln!(
            b,
            "Maintenance timeslice % of cycle time: {}",
            format_averages(&self.maintenance_time_percent())
        );
        let _ = writeln!(
            b,
            "Block confirmation time (ns): {}",
            format_averages(&self.block_confirmation_time())
        );
        let _ = writeln!(
            b,
            "Head block evaluation time (ns): {}",
            format_averages(&self.head_evaluation_time())
        );

        b
    }

    fn series(&self, series: Series) -> &A {
        match series {
            Series::CycleTime => &self.cycle_time,
            Series::MaintenanceTime => &self.maint_time,
            Series::MaintenanceTimePercent => &self.maint_time_percent,
            Series::BlockGenerationTime => &self.gen_block_time,
            Series::BlockAddTime => &self.add_block_time,
            Series::BlockConfirmationTime => &self.conf_block_time,
            Series::HeadEvaluationTime => &self.eval_time,
            Series::ComputedProcessingTime => &self.computed_proc_time,
            Series::ComputedProcessingTimePercent => &self.computed_proc_time_percent,
            Series::ProcessingTime => &self.actual_proc_time,
            Series::ProcessingTimePercent => &self.actual_proc_time_percent,
            Series::OutboundQueueDepth => &self.outbound_queue_depth,
        }
    }
}

impl<A: MovingAverage> std::fmt::Debug for KernelMetrics<A> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KernelMetrics")
            .field("clock", &self.clock)
            .field("windows", &self.windows)
            .field("inbound_queues", &self.inbound_queue_depths.len())
            .field("overrun_count", &self.overrun_count())
            .finish_non_exhaustive()
    }
}

/// Render window averages as `[a, b, c]` with two decimals.
fn format_averages(averages: &[f64]) -> String {
    let parts: Vec<String> = averages.iter().map(|v| format!("{v:.2}")).collect();
    format!("[{}]", parts.join(", "))
}

fn truncate_to_millis(duration: Duration) -> Duration {
    Duration::from_millis(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
}

fn nanos(duration: Duration) -> u64 {
    u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX)
}
