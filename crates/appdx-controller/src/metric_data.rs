use serde::Deserialize;

/// One series returned by the metric-data endpoint. `metric_path` echoes the
/// requested path with every wildcard replaced by a concrete segment.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricDataPoint {
    #[serde(default)]
    pub metric_id: Option<i64>,
    #[serde(default)]
    pub metric_name: Option<String>,
    pub metric_path: String,
    #[serde(default)]
    pub frequency: Option<String>,
    #[serde(default)]
    pub metric_values: Vec<MetricValueSample>,
}

impl MetricDataPoint {
    /// Rolled-up reading of the series, if the controller returned one.
    pub fn first_value(&self) -> Option<f64> {
        self.metric_values.first().map(|sample| sample.value)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricValueSample {
    pub value: f64,
    #[serde(default)]
    pub start_time_in_millis: Option<i64>,
    #[serde(default)]
    pub count: Option<i64>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
    #[serde(default)]
    pub sum: Option<f64>,
}
