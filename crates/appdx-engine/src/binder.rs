use appdx_config::mapping::{MetricDefinition, PATH_DELIMITER};
use appdx_controller::MetricDataPoint;
use tracing::debug;

/// A reading ready for the gauge sink, labels in the definition's order.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledValue {
    pub controller: String,
    pub entity: String,
    pub labels: Vec<String>,
    pub value: f64,
}

impl LabeledValue {
    /// Full label tuple for the gauge: controller, entity, then path labels.
    pub fn label_values(&self) -> Vec<&str> {
        [self.controller.as_str(), self.entity.as_str()]
            .into_iter()
            .chain(self.labels.iter().map(String::as_str))
            .collect()
    }
}

/// Binds each returned series to the definition's labels by reading the
/// echoed metric path at the template's wildcard positions.
pub fn bind(
    definition: &MetricDefinition,
    controller: &str,
    entity: &str,
    points: &[MetricDataPoint],
) -> Vec<LabeledValue> {
    let positions = definition.wildcard_positions();

    points
        .iter()
        .filter_map(|point| {
            let value = point.first_value()?;
            let segments: Vec<&str> = point.metric_path.split(PATH_DELIMITER).collect();
            let labels = positions
                .iter()
                .map(|&index| segments.get(index).map(|segment| segment.to_string()))
                .collect::<Option<Vec<_>>>();

            let Some(labels) = labels else {
                debug!(
                    controller,
                    application = entity,
                    metric_path = %point.metric_path,
                    template = %definition.metric_path,
                    "returned metric path is shorter than the template, skipping"
                );
                return None;
            };

            Some(LabeledValue {
                controller: controller.to_string(),
                entity: entity.to_string(),
                labels,
                value,
            })
        })
        .collect()
}
