//! Cycle driver for the block production kernel.
//!
//! Each cycle runs the same sequence:
//! 1. Start the cycle (records the previous cycle's length)
//! 2. Run maintenance and record its duration
//! 3. Derive the processing budget from smoothed maintenance time
//! 4. Run production within the budget and record its duration
//! 5. Sleep until the next cycle deadline
//!
//! The kernel only times the work. What maintenance and production do is
//! up to the [`CycleWork`] implementation.

use crate::clock::CycleClock;
use crate::metrics::KernelMetrics;
use kernel_common::config::KernelConfig;
use kernel_common::error::KernelResult;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// Work performed inside each kernel cycle.
pub trait CycleWork {
    /// Maintenance phase: confirmation, head evaluation, housekeeping.
    ///
    /// Sub-phase timings may be recorded on `metrics`.
    fn maintain(&mut self, metrics: &KernelMetrics) -> KernelResult<()>;

    /// Production phase. `budget` is the time the kernel scheduled for it;
    /// the kernel reports but does not enforce it.
    fn produce(&mut self, budget: Duration, metrics: &KernelMetrics) -> KernelResult<()>;
}

/// Timings of a single completed cycle.
#[derive(Debug, Clone)]
pub struct CycleReport {
    /// Cycle number after this cycle started.
    pub cycle_number: u64,
    /// Length of the previous cycle, as recorded at this cycle's start.
    pub cycle_time: Duration,
    /// Duration of this cycle's maintenance phase.
    pub maintenance_time: Duration,
    /// Processing budget scheduled for this cycle.
    pub budget: Duration,
    /// Duration of this cycle's production phase.
    pub processing_time: Duration,
}

impl CycleReport {
    /// Whether production ran past its scheduled budget.
    #[must_use]
    pub fn exceeded_budget(&self) -> bool {
        self.processing_time > self.budget
    }
}

/// Periodic block production kernel.
pub struct Kernel<W: CycleWork> {
    /// Cycle work implementation.
    pub work: W,
    clock: Arc<CycleClock>,
    metrics: Arc<KernelMetrics>,
    /// Status line cadence in cycles (0 disables).
    report_every: u64,
    stop: Arc<AtomicBool>,
}

impl<W: CycleWork> Kernel<W> {
    /// Create a kernel: configure and activate the clock, then build the
    /// metrics bound to it.
    ///
    /// # Errors
    ///
    /// Returns a configuration error for an invalid frequency or window list.
    pub fn new(work: W, config: &KernelConfig) -> KernelResult<Self> {
        let mut clock = CycleClock::new(config.block_frequency)?;
        clock.activate();
        let clock = Arc::new(clock);
        let metrics = Arc::new(KernelMetrics::new(Arc::clone(&clock), &config.sma_windows)?);

        info!(
            block_frequency = config.block_frequency,
            windows = ?metrics.windows(),
            "Kernel initialized"
        );

        Ok(Self {
            work,
            clock,
            metrics,
            report_every: config.report_every,
            stop: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Create a kernel with default configuration.
    ///
    /// # Errors
    ///
    /// See [`Kernel::new`].
    pub fn with_defaults(work: W) -> KernelResult<Self> {
        Self::new(work, &KernelConfig::default())
    }

    /// Shared handle to the cycle clock.
    pub fn clock(&self) -> &Arc<CycleClock> {
        &self.clock
    }

    /// Shared handle to the metrics.
    pub fn metrics(&self) -> &Arc<KernelMetrics> {
        &self.metrics
    }

    /// Flag that stops [`Kernel::run`] after the current cycle when set.
    pub fn stop_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.stop)
    }

    /// Execute one cycle and sleep until its deadline.
    ///
    /// # Errors
    ///
    /// Propagates maintenance or production failures from the work.
    pub fn run_cycle(&mut self) -> KernelResult<CycleReport> {
        let cycle_start = Instant::now();
        let metrics: &KernelMetrics = &self.metrics;
        let cycle_time = self.clock.start_cycle_at(cycle_start, metrics);
        let cycle_number = self.clock.cycle_number();

        // Maintenance
        let maint_start = Instant::now();
        if let Err(e) = self.work.maintain(metrics) {
            error!(cycle = cycle_number, error = %e, "Maintenance phase failed");
            return Err(e);
        }
        let maintenance_time = maint_start.elapsed();
        metrics.record_maintenance_time(maintenance_time);

        // Production
        let budget = metrics.compute_scheduled_budget();
        let proc_start = Instant::now();
        if let Err(e) = self.work.produce(budget, metrics) {
            error!(cycle = cycle_number, error = %e, "Production phase failed");
            return Err(e);
        }
        let processing_time = proc_start.elapsed();
        metrics.record_processing_time(processing_time);

        let report = CycleReport {
            cycle_number,
            cycle_time,
            maintenance_time,
            budget,
            processing_time,
        };

        if report.exceeded_budget() {
            warn!(
                cycle = cycle_number,
                budget_us = budget.as_micros(),
                processing_us = processing_time.as_micros(),
                "Production exceeded scheduled budget"
            );
        }

        wait_until(cycle_start + self.clock.block_interval());

        trace!(
            cycle = cycle_number,
            maintenance_us = maintenance_time.as_micros(),
            processing_us = processing_time.as_micros(),
            "Cycle complete"
        );

        Ok(report)
    }

    /// Run cycles until `max_cycles` have completed (0 = unbounded) or the
    /// stop handle is set. Returns the number of cycles run.
    ///
    /// # Errors
    ///
    /// Stops at and returns the first work failure.
    pub fn run(&mut self, max_cycles: u64) -> KernelResult<u64> {
        info!(max_cycles, "Entering kernel loop");

        let mut cycles_run = 0u64;
        while !self.stop.load(Ordering::Acquire) {
            let report = self.run_cycle()?;
            cycles_run += 1;

            if self.report_every > 0 && cycles_run % self.report_every == 0 {
                let avg_cycle_ns = self.metrics.cycle_time().first().copied().unwrap_or(0.0);
                info!(
                    cycle = report.cycle_number,
                    avg_cycle_us = avg_cycle_ns / 1_000.0,
                    budget_us = report.budget.as_micros(),
                    overruns = self.metrics.overrun_count(),
                    "Periodic status"
                );
                debug!("Kernel metrics\n{}", self.metrics.report());
            }

            if max_cycles > 0 && cycles_run >= max_cycles {
                info!(cycles = cycles_run, "Maximum cycle count reached");
                break;
            }
        }

        info!(
            cycles = cycles_run,
            kernel_time = %self.clock,
            "Kernel loop exited"
        );
        Ok(cycles_run)
    }
}

/// Sleep until `deadline`; returns immediately if it has passed.
fn wait_until(deadline: Instant) {
    let now = Instant::now();
    if deadline > now {
        std::thread::sleep(deadline - now);
    }
}

/// Builder for configuring the kernel.
pub struct KernelBuilder<W: CycleWork> {
    work: W,
    config: KernelConfig,
}

impl<W: CycleWork> KernelBuilder<W> {
    /// Create a new builder with the given work.
    pub fn new(work: W) -> Self {
        Self {
            work,
            config: KernelConfig::default(),
        }
    }

    /// Set the target block frequency (cycles per second).
    #[must_use]
    pub fn block_frequency(mut self, frequency: f64) -> Self {
        self.config.block_frequency = frequency;
        self
    }

    /// Set the moving average windows.
    #[must_use]
    pub fn windows(mut self, windows: &[usize]) -> Self {
        self.config.sma_windows = windows.to_vec();
        self
    }

    /// Set the status line cadence.
    #[must_use]
    pub fn report_every(mut self, cycles: u64) -> Self {
        self.config.report_every = cycles;
        self
    }

    /// Set the full kernel configuration.
    #[must_use]
    pub fn config(mut self, config: KernelConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the kernel.
    ///
    /// # Errors
    ///
    /// See [`Kernel::new`].
    pub fn build(self) -> KernelResult<Kernel<W>> {
        Kernel::new(self.work, &self.config)
    }
}
