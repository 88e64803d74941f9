use std::{
    collections::{HashMap, HashSet},
    sync::{
        Arc, Mutex, RwLock,
        atomic::{AtomicU64, Ordering},
    },
};

use appdx_common::error::{AppdError, Result};

use crate::types::{
    CollectedMetric, MetricDescriptor, MetricSample, MetricType, MetricValue, is_valid_label_name,
    is_valid_metric_name,
};

type LabelValues = Vec<String>;

trait RegisteredMetric: Send + Sync {
    fn descriptor(&self) -> &MetricDescriptor;
    fn collect(&self) -> Vec<MetricSample>;
}

/// Process-wide metric store rendered on every scrape.
pub struct MetricsRegistry {
    metrics: RwLock<HashMap<String, Arc<dyn RegisteredMetric>>>,
}

impl MetricsRegistry {
    pub fn new() -> Self {
        Self {
            metrics: RwLock::new(HashMap::new()),
        }
    }

    pub fn register_counter(
        &self,
        name: &str,
        help: &str,
        variable_labels: &[&str],
    ) -> Result<Arc<CounterMetric>> {
        let metric = Arc::new(CounterMetric {
            descriptor: MetricDescriptor::new(name, help, MetricType::Counter, variable_labels),
            series: SeriesMap::new(),
        });
        self.register(metric.clone())?;
        Ok(metric)
    }

    pub fn register_gauge(
        &self,
        name: &str,
        help: &str,
        variable_labels: &[&str],
    ) -> Result<Arc<GaugeMetric>> {
        let metric = Arc::new(GaugeMetric {
            descriptor: MetricDescriptor::new(name, help, MetricType::Gauge, variable_labels),
            series: SeriesMap::new(),
        });
        self.register(metric.clone())?;
        Ok(metric)
    }

    pub fn register_histogram(
        &self,
        name: &str,
        help: &str,
        variable_labels: &[&str],
        buckets: &[f64],
    ) -> Result<Arc<HistogramMetric>> {
        let mut sorted_buckets = buckets.to_vec();
        sorted_buckets.sort_by(|left, right| left.total_cmp(right));

        let metric = Arc::new(HistogramMetric {
            descriptor: MetricDescriptor::new(name, help, MetricType::Histogram, variable_labels),
            buckets: sorted_buckets,
            series: SeriesMap::new(),
        });
        self.register(metric.clone())?;
        Ok(metric)
    }

    pub fn len(&self) -> usize {
        self.metrics.read().map(|guard| guard.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn collect_all(&self) -> Vec<CollectedMetric> {
        let metrics = match self.metrics.read() {
            Ok(guard) => guard,
            Err(_) => return Vec::new(),
        };

        let mut collected = metrics
            .values()
            .map(|metric| {
                let mut samples = metric.collect();
                samples.sort_by(|left, right| left.labels.cmp(&right.labels));
                CollectedMetric {
                    descriptor: metric.descriptor().clone(),
                    samples,
                }
            })
            .collect::<Vec<_>>();

        collected.sort_by(|left, right| left.descriptor.name.cmp(&right.descriptor.name));
        collected
    }

    pub fn render_prometheus(&self) -> String {
        let mut output = String::new();

        for metric in self.collect_all() {
            let name = &metric.descriptor.name;
            output.push_str(&format!("# HELP {name} {}\n", escape_help(&metric.descriptor.help)));
            output.push_str(&format!(
                "# TYPE {name} {}\n",
                metric.descriptor.metric_type.as_prometheus_type()
            ));

            for sample in metric.samples {
                match sample.value {
                    MetricValue::Counter(value) | MetricValue::Gauge(value) => {
                        output.push_str(&render_sample_line(name, &sample.labels, value));
                    }
                    MetricValue::Histogram {
                        buckets,
                        count,
                        sum,
                    } => {
                        let mut cumulative = 0_u64;
                        for (bound, bucket_count) in buckets {
                            cumulative = cumulative.saturating_add(bucket_count);
                            let mut labels = sample.labels.clone();
                            labels.push(("le".to_string(), format_bucket_bound(bound)));
                            output.push_str(&render_sample_line(
                                &format!("{name}_bucket"),
                                &labels,
                                cumulative as f64,
                            ));
                        }

                        output.push_str(&render_sample_line(
                            &format!("{name}_sum"),
                            &sample.labels,
                            sum,
                        ));
                        output.push_str(&render_sample_line(
                            &format!("{name}_count"),
                            &sample.labels,
                            count as f64,
                        ));
                    }
                }
            }
        }

        output
    }

    fn register<M: RegisteredMetric + 'static>(&self, metric: Arc<M>) -> Result<()> {
        validate_descriptor(metric.descriptor())?;
        let name = metric.descriptor().name.clone();
        let mut metrics = self.metrics.write().map_err(|_| {
            AppdError::Internal("failed to acquire metrics registry lock".to_string())
        })?;

        if metrics.contains_key(&name) {
            return Err(AppdError::InvalidArgument(format!(
                "metric already registered: {name}"
            )));
        }

        metrics.insert(name, metric);
        Ok(())
    }
}

impl Default for MetricsRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-label-tuple storage shared by every metric kind.
struct SeriesMap<T> {
    series: RwLock<HashMap<LabelValues, Arc<T>>>,
}

impl<T> SeriesMap<T> {
    fn new() -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
        }
    }

    fn get_or_create(&self, label_values: LabelValues, init: impl FnOnce() -> T) -> Arc<T> {
        if let Ok(guard) = self.series.read()
            && let Some(existing) = guard.get(&label_values)
        {
            return existing.clone();
        }

        match self.series.write() {
            Ok(mut guard) => guard
                .entry(label_values)
                .or_insert_with(|| Arc::new(init()))
                .clone(),
            Err(_) => Arc::new(init()),
        }
    }

    fn snapshot(&self) -> Vec<(LabelValues, Arc<T>)> {
        match self.series.read() {
            Ok(guard) => guard
                .iter()
                .map(|(labels, value)| (labels.clone(), value.clone()))
                .collect(),
            Err(_) => Vec::new(),
        }
    }
}

pub struct CounterMetric {
    descriptor: MetricDescriptor,
    series: SeriesMap<AtomicU64>,
}

impl CounterMetric {
    pub fn inc<S: AsRef<str>>(&self, labels: &[S], value: u64) {
        let series = self
            .series
            .get_or_create(normalize_labels(&self.descriptor, labels), || AtomicU64::new(0));
        series.fetch_add(value, Ordering::Relaxed);
    }

    pub fn inc_one<S: AsRef<str>>(&self, labels: &[S]) {
        self.inc(labels, 1);
    }
}

impl RegisteredMetric for CounterMetric {
    fn descriptor(&self) -> &MetricDescriptor {
        &self.descriptor
    }

    fn collect(&self) -> Vec<MetricSample> {
        self.series
            .snapshot()
            .into_iter()
            .map(|(label_values, value)| MetricSample {
                labels: materialize_labels(&self.descriptor, &label_values),
                value: MetricValue::Counter(value.load(Ordering::Relaxed) as f64),
            })
            .collect()
    }
}

/// Gauge whose series hold the bit pattern of an `f64`.
pub struct GaugeMetric {
    descriptor: MetricDescriptor,
    series: SeriesMap<AtomicU64>,
}

impl GaugeMetric {
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn set<S: AsRef<str>>(&self, labels: &[S], value: f64) {
        let series = self.series.get_or_create(normalize_labels(&self.descriptor, labels), || {
            AtomicU64::new(0_f64.to_bits())
        });
        series.store(value.to_bits(), Ordering::Relaxed);
    }

    pub fn get<S: AsRef<str>>(&self, labels: &[S]) -> Option<f64> {
        let label_values = normalize_labels(&self.descriptor, labels);
        let guard = self.series.series.read().ok()?;
        guard
            .get(&label_values)
            .map(|value| f64::from_bits(value.load(Ordering::Relaxed)))
    }
}

impl RegisteredMetric for GaugeMetric {
    fn descriptor(&self) -> &MetricDescriptor {
        &self.descriptor
    }

    fn collect(&self) -> Vec<MetricSample> {
        self.series
            .snapshot()
            .into_iter()
            .map(|(label_values, value)| MetricSample {
                labels: materialize_labels(&self.descriptor, &label_values),
                value: MetricValue::Gauge(f64::from_bits(value.load(Ordering::Relaxed))),
            })
            .collect()
    }
}

pub struct HistogramMetric {
    descriptor: MetricDescriptor,
    buckets: Vec<f64>,
    series: SeriesMap<HistogramSeries>,
}

struct HistogramSeries {
    bucket_counts: Vec<AtomicU64>,
    count: AtomicU64,
    sum: Mutex<f64>,
}

impl HistogramMetric {
    pub fn observe<S: AsRef<str>>(&self, labels: &[S], value: f64) {
        let bucket_len = self.buckets.len();
        let series = self
            .series
            .get_or_create(normalize_labels(&self.descriptor, labels), || HistogramSeries {
                bucket_counts: (0..bucket_len + 1).map(|_| AtomicU64::new(0)).collect(),
                count: AtomicU64::new(0),
                sum: Mutex::new(0.0),
            });

        let bucket_index = self
            .buckets
            .iter()
            .position(|bucket| value <= *bucket)
            .unwrap_or(bucket_len);

        if let Some(bucket) = series.bucket_counts.get(bucket_index) {
            bucket.fetch_add(1, Ordering::Relaxed);
        }

        series.count.fetch_add(1, Ordering::Relaxed);
        if let Ok(mut sum) = series.sum.lock() {
            *sum += value;
        }
    }
}

impl RegisteredMetric for HistogramMetric {
    fn descriptor(&self) -> &MetricDescriptor {
        &self.descriptor
    }

    fn collect(&self) -> Vec<MetricSample> {
        self.series
            .snapshot()
            .into_iter()
            .map(|(label_values, entry)| {
                let mut buckets = self
                    .buckets
                    .iter()
                    .zip(entry.bucket_counts.iter())
                    .map(|(bound, count)| (*bound, count.load(Ordering::Relaxed)))
                    .collect::<Vec<_>>();

                let inf_count = entry
                    .bucket_counts
                    .last()
                    .map(|count| count.load(Ordering::Relaxed))
                    .unwrap_or_default();
                buckets.push((f64::INFINITY, inf_count));

                let sum = entry.sum.lock().map(|value| *value).unwrap_or(0.0);

                MetricSample {
                    labels: materialize_labels(&self.descriptor, &label_values),
                    value: MetricValue::Histogram {
                        buckets,
                        count: entry.count.load(Ordering::Relaxed),
                        sum,
                    },
                }
            })
            .collect()
    }
}

fn normalize_labels<S: AsRef<str>>(descriptor: &MetricDescriptor, labels: &[S]) -> LabelValues {
    (0..descriptor.variable_labels.len())
        .map(|index| {
            labels
                .get(index)
                .map(|value| value.as_ref().to_string())
                .unwrap_or_default()
        })
        .collect()
}

fn materialize_labels(descriptor: &MetricDescriptor, values: &[String]) -> Vec<(String, String)> {
    descriptor
        .variable_labels
        .iter()
        .zip(values.iter())
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect()
}

fn render_sample_line(name: &str, labels: &[(String, String)], value: f64) -> String {
    let mut rendered = String::from(name);

    if !labels.is_empty() {
        let pairs = labels
            .iter()
            .map(|(key, value)| format!("{key}=\"{}\"", escape_label_value(value)))
            .collect::<Vec<_>>();
        rendered.push('{');
        rendered.push_str(&pairs.join(","));
        rendered.push('}');
    }

    rendered.push(' ');
    rendered.push_str(&format_metric_value(value));
    rendered.push('\n');
    rendered
}

fn validate_descriptor(descriptor: &MetricDescriptor) -> Result<()> {
    let name = &descriptor.name;
    if !is_valid_metric_name(name) {
        return Err(AppdError::InvalidArgument(format!(
            "invalid metric name: {name:?}"
        )));
    }

    let mut seen = HashSet::new();
    for label in &descriptor.variable_labels {
        if !is_valid_label_name(label) {
            return Err(AppdError::InvalidArgument(format!(
                "invalid label name {label:?} on metric {name}"
            )));
        }
        if descriptor.metric_type == MetricType::Histogram && label == "le" {
            return Err(AppdError::InvalidArgument(format!(
                "label \"le\" is reserved on histogram {name}"
            )));
        }
        if !seen.insert(label.as_str()) {
            return Err(AppdError::InvalidArgument(format!(
                "duplicate label name {label:?} on metric {name}"
            )));
        }
    }
    Ok(())
}

fn format_metric_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        let rendered = if value.is_sign_positive() { "+Inf" } else { "-Inf" };
        rendered.to_string()
    } else if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

fn format_bucket_bound(value: f64) -> String {
    if value.is_infinite() {
        "+Inf".to_string()
    } else {
        value.to_string()
    }
}

fn escape_help(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\n', "\\n")
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('\n', "\\n")
        .replace('"', "\\\"")
}
