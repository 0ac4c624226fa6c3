//! Common utilities for integration tests.

#![allow(dead_code)]

use kernel_common::error::KernelResult;
use kernel_runtime::clock::CycleClock;
use kernel_runtime::kernel::CycleWork;
use kernel_runtime::metrics::KernelMetrics;
use std::sync::Arc;
use std::time::Duration;

/// Build an activated clock and metrics bound to it.
pub fn activated(frequency: f64, windows: &[usize]) -> (Arc<CycleClock>, Arc<KernelMetrics>) {
    let mut clock = CycleClock::new(frequency).expect("valid frequency");
    clock.activate();
    let clock = Arc::new(clock);
    let metrics = KernelMetrics::new(Arc::clone(&clock), windows).expect("valid windows");
    (clock, Arc::new(metrics))
}

/// Relative float comparison for averaged nanosecond values.
pub fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9 * a.abs().max(b.abs()).max(1.0)
}

/// Work that replays a scripted maintenance duration per cycle.
///
/// Durations are recorded directly instead of slept, except for a short
/// real sleep so the kernel's own timing stays plausible.
#[derive(Debug, Default)]
pub struct ScriptedWork {
    /// Maintenance sleep per cycle; the last entry repeats.
    pub maintenance: Vec<Duration>,
    /// Budgets handed to production, in cycle order.
    pub budgets: Vec<Duration>,
    cycle: usize,
}

impl ScriptedWork {
    /// Create work with the given maintenance script.
    pub fn new(maintenance: Vec<Duration>) -> Self {
        Self {
            maintenance,
            budgets: Vec::new(),
            cycle: 0,
        }
    }
}

impl CycleWork for ScriptedWork {
    fn maintain(&mut self, metrics: &KernelMetrics) -> KernelResult<()> {
        let idx = self.cycle.min(self.maintenance.len().saturating_sub(1));
        if let Some(&d) = self.maintenance.get(idx) {
            std::thread::sleep(d);
        }
        metrics.record_inbound_queue_depth("block", self.cycle);
        Ok(())
    }

    fn produce(&mut self, budget: Duration, metrics: &KernelMetrics) -> KernelResult<()> {
        self.budgets.push(budget);
        metrics.record_outbound_queue_depth(self.cycle);
        self.cycle += 1;
        Ok(())
    }
}
