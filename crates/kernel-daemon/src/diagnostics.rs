//! Metrics export for external monitoring systems (e.g., Prometheus).

use kernel_runtime::metrics::{KernelMetrics, Series};
use std::fmt::Write as _;

/// Metric name prefix.
const PREFIX: &str = "kernel";

/// Format kernel metrics in Prometheus text exposition format.
///
/// Every series is exported as a gauge with one sample per moving average
/// window, labelled `window="<size>"`. Inbound queue depths carry an extra
/// `protocol` label.
pub fn format_prometheus_metrics(metrics: &KernelMetrics) -> String {
    let clock = metrics.clock();
    let mut output = String::new();

    // Writing to a String cannot fail.
    let _ = writeln!(output, "# HELP {PREFIX}_cycle_number Cycles started since activation");
    let _ = writeln!(output, "# TYPE {PREFIX}_cycle_number counter");
    let _ = writeln!(output, "{PREFIX}_cycle_number {}", clock.cycle_number());

    let _ = writeln!(output, "# HELP {PREFIX}_uptime_seconds Kernel uptime in seconds");
    let _ = writeln!(output, "# TYPE {PREFIX}_uptime_seconds gauge");
    let _ = writeln!(
        output,
        "{PREFIX}_uptime_seconds {:.3}",
        clock.uptime().as_secs_f64()
    );

    let _ = writeln!(output, "# HELP {PREFIX}_block_interval_seconds Target cycle time");
    let _ = writeln!(output, "# TYPE {PREFIX}_block_interval_seconds gauge");
    let _ = writeln!(
        output,
        "{PREFIX}_block_interval_seconds {:.9}",
        clock.block_interval().as_secs_f64()
    );

    let _ = writeln!(output, "# HELP {PREFIX}_overruns_total Processing budget overruns");
    let _ = writeln!(output, "# TYPE {PREFIX}_overruns_total counter");
    let _ = writeln!(output, "{PREFIX}_overruns_total {}", metrics.overrun_count());

    for series in Series::ALL {
        let name = series.metric_name();
        let _ = writeln!(output, "# TYPE {PREFIX}_{name} gauge");
        for (window, avg) in metrics.windows().iter().zip(metrics.averages(series)) {
            let _ = writeln!(output, "{PREFIX}_{name}{{window=\"{window}\"}} {avg}");
        }
    }

    let inbound = metrics.inbound_queue_depths();
    if !inbound.is_empty() {
        let _ = writeln!(output, "# TYPE {PREFIX}_inbound_queue_depth gauge");
        for (protocol, averages) in inbound {
            for (window, avg) in metrics.windows().iter().zip(averages) {
                let _ = writeln!(
                    output,
                    "{PREFIX}_inbound_queue_depth{{protocol=\"{protocol}\",window=\"{window}\"}} {avg}"
                );
            }
        }
    }

    output
}
