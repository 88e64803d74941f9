use std::{sync::Arc, time::Duration};

use appdx_common::error::Result;

use crate::registry::{CounterMetric, GaugeMetric, HistogramMetric, MetricsRegistry};

/// Metrics describing the exporter itself rather than the controllers it polls.
pub struct ExporterMetrics {
    cycles_total: Arc<CounterMetric>,
    cycle_duration_seconds: Arc<HistogramMetric>,
    controller_calls: Arc<GaugeMetric>,
}

impl ExporterMetrics {
    pub fn register(registry: &MetricsRegistry) -> Result<Self> {
        let cycles_total = registry.register_counter(
            "appdx_cycles_total",
            "Total number of completed collection cycles",
            &[],
        )?;

        let cycle_duration_seconds = registry.register_histogram(
            "appdx_cycle_duration_seconds",
            "Duration of collection cycles in seconds",
            &[],
            &[1.0, 5.0, 15.0, 30.0, 60.0, 120.0, 300.0, 600.0],
        )?;

        let controller_calls = registry.register_gauge(
            "appdx_controller_calls",
            "Successful controller responses processed by the session",
            &["controller"],
        )?;

        Ok(Self {
            cycles_total,
            cycle_duration_seconds,
            controller_calls,
        })
    }

    pub fn record_cycle(&self, duration: Duration) {
        self.cycles_total.inc_one::<&str>(&[]);
        self.cycle_duration_seconds
            .observe::<&str>(&[], duration.as_secs_f64());
    }

    pub fn record_controller_calls(&self, controller: &str, calls: u64) {
        self.controller_calls.set(&[controller], calls as f64);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::registry::MetricsRegistry;

    use super::ExporterMetrics;

    #[test]
    fn records_cycles_and_calls() {
        let registry = MetricsRegistry::new();
        let metrics = ExporterMetrics::register(&registry).unwrap();

        metrics.record_cycle(Duration::from_secs(3));
        metrics.record_controller_calls("ctl.example.com", 12);

        let rendered = registry.render_prometheus();
        assert!(rendered.contains("appdx_cycles_total 1\n"));
        assert!(rendered.contains("appdx_cycle_duration_seconds_bucket{le=\"5\"} 1\n"));
        assert!(rendered.contains("appdx_controller_calls{controller=\"ctl.example.com\"} 12\n"));
    }
}
