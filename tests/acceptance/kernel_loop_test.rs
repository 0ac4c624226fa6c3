//! End-to-end runs of the kernel loop.

use super::common::ScriptedWork;
use kernel_common::config::KernelConfig;
use kernel_runtime::kernel::{Kernel, KernelBuilder};
use kernel_runtime::metrics::Series;
use std::time::Duration;

#[test]
fn test_kernel_runs_bounded_cycles() {
    let work = ScriptedWork::new(vec![Duration::from_millis(1)]);
    let mut kernel = KernelBuilder::new(work)
        .block_frequency(200.0)
        .windows(&[1, 10])
        .report_every(5)
        .build()
        .unwrap();

    assert_eq!(kernel.run(10).unwrap(), 10);
    assert_eq!(kernel.clock().cycle_number(), 10);

    let metrics = kernel.metrics();
    assert_eq!(metrics.sample_count(Series::CycleTime), 10);
    assert_eq!(metrics.sample_count(Series::ComputedProcessingTime), 10);
    assert_eq!(metrics.inbound_queue_sample_count("block"), Some(10));
    assert_eq!(kernel.work.budgets.len(), 10);

    // Steady-state cycles are paced to the 5ms interval
    assert!(metrics.cycle_time()[0] >= 5_000_000.0);
    for budget in &kernel.work.budgets {
        assert!(*budget < Duration::from_millis(5));
    }
}

#[test]
fn test_kernel_recovers_after_maintenance_spike() {
    // 20ms interval; one 30ms maintenance spike, then short cycles
    let mut script = vec![Duration::from_millis(30)];
    script.extend(std::iter::repeat(Duration::ZERO).take(4));
    let config = KernelConfig {
        block_frequency: 50.0,
        sma_windows: vec![1, 100],
        report_every: 0,
        ..Default::default()
    };
    let mut kernel = Kernel::new(ScriptedWork::new(script), &config).unwrap();

    kernel.run(5).unwrap();

    let budgets = &kernel.work.budgets;
    assert_eq!(budgets[0], Duration::ZERO);
    assert!(budgets[1..].iter().all(|b| *b > Duration::from_millis(15)));
    assert_eq!(kernel.metrics().overrun_count(), 1);

    let report = kernel.metrics().report();
    assert!(report.contains("Budget overruns: 1"));
    assert!(report.contains("Cycle number: 5"));
}

#[test]
fn test_kernel_from_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    std::io::Write::write_all(
        &mut file,
        br#"
block_frequency = 250.0
sma_windows = [100, 1, 10, 10]
report_every = 0

[simulation]
maintenance_time = "1ms"
"#,
    )
    .unwrap();

    let config = KernelConfig::from_file(file.path()).unwrap();
    config.validate().unwrap();
    assert_eq!(config.simulation.maintenance_time, Duration::from_millis(1));

    let mut kernel = Kernel::new(ScriptedWork::new(vec![Duration::ZERO]), &config).unwrap();
    assert_eq!(kernel.clock().block_interval(), Duration::from_millis(4));
    // Windows are normalized: sorted and deduplicated
    assert_eq!(kernel.metrics().windows(), &[1, 10, 100]);

    kernel.run(3).unwrap();
    assert_eq!(kernel.metrics().averages(Series::CycleTime).len(), 3);
}
