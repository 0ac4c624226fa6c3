//! Simulated cycle work for running the kernel without a real chain.
//!
//! Maintenance sleeps for a fixed duration split between block confirmation
//! and head evaluation. Production fills a fraction of the scheduled budget,
//! split between block generation and block add. Queue depths follow a
//! deterministic sawtooth so reports show movement.

use kernel_common::config::SimulationConfig;
use kernel_common::error::KernelResult;
use kernel_runtime::kernel::CycleWork;
use kernel_runtime::metrics::KernelMetrics;
use std::thread;
use std::time::{Duration, Instant};

/// Share of maintenance spent confirming blocks; the rest evaluates heads.
const CONFIRMATION_SHARE: f64 = 0.6;

/// Share of production spent generating blocks; the rest adds them.
const GENERATION_SHARE: f64 = 0.7;

/// Sleep-based stand-in for block production work.
#[derive(Debug)]
pub struct SimulatedWork {
    maintenance_time: Duration,
    production_fill: f64,
    protocols: Vec<String>,
    max_queue_depth: usize,
    tick: usize,
}

impl SimulatedWork {
    /// Create simulated work from its configuration section.
    pub fn new(config: &SimulationConfig) -> Self {
        Self {
            maintenance_time: config.maintenance_time,
            production_fill: config.production_fill,
            protocols: config.protocols.clone(),
            max_queue_depth: config.max_queue_depth,
            tick: 0,
        }
    }

    fn queue_depth(&self, offset: usize) -> usize {
        let step = self.tick.wrapping_mul(7).wrapping_add(offset.wrapping_mul(13));
        step % self.max_queue_depth.saturating_add(1)
    }
}

/// Sleep for `duration` and return how long it actually took.
fn timed_sleep(duration: Duration) -> Duration {
    let start = Instant::now();
    if !duration.is_zero() {
        thread::sleep(duration);
    }
    start.elapsed()
}

impl CycleWork for SimulatedWork {
    fn maintain(&mut self, metrics: &KernelMetrics) -> KernelResult<()> {
        let confirm = self.maintenance_time.mul_f64(CONFIRMATION_SHARE);
        let eval = self.maintenance_time.saturating_sub(confirm);

        metrics.record_block_confirmation_time(timed_sleep(confirm));
        metrics.record_head_evaluation_time(timed_sleep(eval));

        for (i, protocol) in self.protocols.iter().enumerate() {
            metrics.record_inbound_queue_depth(protocol, self.queue_depth(i));
        }
        Ok(())
    }

    fn produce(&mut self, budget: Duration, metrics: &KernelMetrics) -> KernelResult<()> {
        let target = budget.mul_f64(self.production_fill);
        let generate = target.mul_f64(GENERATION_SHARE);
        let add = target.saturating_sub(generate);

        metrics.record_block_generation_time(timed_sleep(generate));
        metrics.record_block_add_time(timed_sleep(add));
        metrics.record_outbound_queue_depth(self.queue_depth(self.protocols.len()));

        self.tick = self.tick.wrapping_add(1);
        Ok(())
    }
}
