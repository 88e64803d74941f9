pub mod exporter;
pub mod handlers;
pub mod registry;
pub mod router;
pub mod types;

pub use exporter::ExporterMetrics;
pub use registry::{CounterMetric, GaugeMetric, HistogramMetric, MetricsRegistry};
pub use router::{MetricsState, metrics_router};
pub use types::{
    MetricDescriptor, MetricType, MetricValue, is_valid_label_name, is_valid_metric_name,
};
