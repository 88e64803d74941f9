use std::{collections::HashSet, fmt, path::Path, str::FromStr};

use appdx_common::{
    error::{AppdError, Result},
    types::EntityType,
};
use appdx_metrics::is_valid_label_name;
use tokio::fs;
use tracing::{debug, warn};

pub const PATH_DELIMITER: char = '|';
pub const WILDCARD: &str = "*";

/// Labels every gauge carries ahead of the mapping's own labels.
pub const RESERVED_LABELS: [&str; 2] = ["controller", "application"];

const MIN_COLUMNS: usize = 4;

/// Entity type column of a mapping row. Unrecognised values are kept so the
/// collector can report and skip them instead of refusing to start.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityTarget {
    Known(EntityType),
    Unknown(String),
}

impl EntityTarget {
    pub fn parse(raw: &str) -> Self {
        match EntityType::from_str(raw) {
            Ok(entity_type) => Self::Known(entity_type),
            Err(_) => Self::Unknown(raw.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Known(entity_type) => entity_type.as_str(),
            Self::Unknown(raw) => raw,
        }
    }
}

impl fmt::Display for EntityTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One row of the mapping file: which controller metric to poll and how its
/// wildcard segments become gauge labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDefinition {
    pub entity: EntityTarget,
    pub metric_path: String,
    pub metric_name: String,
    pub labels: Vec<String>,
}

impl MetricDefinition {
    pub fn new(
        entity: EntityTarget,
        metric_path: impl Into<String>,
        metric_name: impl Into<String>,
        labels: Vec<String>,
    ) -> Result<Self> {
        let definition = Self {
            entity,
            metric_path: metric_path.into(),
            metric_name: metric_name.into(),
            labels,
        };
        definition.validate()?;
        Ok(definition)
    }

    /// Zero-based positions of the wildcard segments in the path template.
    pub fn wildcard_positions(&self) -> Vec<usize> {
        self.metric_path
            .split(PATH_DELIMITER)
            .enumerate()
            .filter(|(_, segment)| *segment == WILDCARD)
            .map(|(index, _)| index)
            .collect()
    }

    pub fn validate(&self) -> Result<()> {
        let wildcards = self.wildcard_positions().len();
        if wildcards != self.labels.len() {
            return Err(AppdError::Config(format!(
                "metric path {} has {wildcards} wildcard(s) but {} label(s)",
                self.metric_path,
                self.labels.len()
            )));
        }

        let mut seen: HashSet<&str> = RESERVED_LABELS.into_iter().collect();
        for label in &self.labels {
            if !is_valid_label_name(label) {
                return Err(AppdError::Config(format!(
                    "label {label:?} is not a valid metric label name"
                )));
            }
            if !seen.insert(label.as_str()) {
                return Err(AppdError::Config(format!(
                    "label {label:?} is reserved or repeated"
                )));
            }
        }
        Ok(())
    }

    /// Exposition name: `<entity>:<path>` with wildcards replaced by the
    /// upper-cased label names and everything except alphanumerics and `:`
    /// mapped to `_`.
    pub fn gauge_name(&self) -> String {
        let mut labels = self.labels.iter();
        let path = self
            .metric_path
            .split(PATH_DELIMITER)
            .map(|segment| {
                if segment == WILDCARD {
                    labels
                        .next()
                        .map(|label| label.to_uppercase())
                        .unwrap_or_default()
                } else {
                    segment.to_lowercase()
                }
            })
            .collect::<Vec<_>>()
            .join(&PATH_DELIMITER.to_string());

        format!("{}:{path}", self.entity.as_str().to_lowercase())
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == ':' { c } else { '_' })
            .collect()
    }

    pub fn gauge_label_names(&self) -> Vec<String> {
        RESERVED_LABELS
            .into_iter()
            .map(str::to_string)
            .chain(self.labels.iter().cloned())
            .collect()
    }
}

pub fn parse_mapping(text: &str) -> Result<Vec<MetricDefinition>> {
    let mut definitions = Vec::new();

    // The first line is a header.
    for (index, line) in text.lines().enumerate().skip(1) {
        let line_number = index + 1;
        let line = line.trim_end_matches('\r').replace('"', "");
        if line.trim().is_empty() {
            continue;
        }

        let columns: Vec<&str> = line.split('\t').collect();
        if columns.len() < MIN_COLUMNS {
            return Err(AppdError::Config(format!(
                "mapping line {line_number}: expected {MIN_COLUMNS} tab-separated columns, found {}",
                columns.len()
            )));
        }
        if columns.len() > MIN_COLUMNS {
            warn!(line = line_number, columns = columns.len(), "ignoring extra mapping columns");
        }

        let labels = if columns[3].trim().is_empty() {
            Vec::new()
        } else {
            columns[3]
                .split(',')
                .map(|label| label.trim().to_string())
                .collect()
        };

        let definition = MetricDefinition::new(
            EntityTarget::parse(columns[0].trim()),
            columns[1],
            columns[2],
            labels,
        )
        .map_err(|err| match err {
            AppdError::Config(reason) => {
                AppdError::Config(format!("mapping line {line_number}: {reason}"))
            }
            other => other,
        })?;
        definitions.push(definition);
    }

    Ok(definitions)
}

pub async fn load_mapping(path: impl AsRef<Path>) -> Result<Vec<MetricDefinition>> {
    let path = path.as_ref();
    let text = match fs::read_to_string(path).await {
        Ok(text) => text,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            return Err(AppdError::Config(format!(
                "mapping file {} does not exist",
                path.display()
            )));
        }
        Err(err) => return Err(err.into()),
    };

    let definitions = parse_mapping(&text)?;
    debug!(path = %path.display(), definitions = definitions.len(), "loaded mapping file");
    Ok(definitions)
}

#[cfg(test)]
mod tests {
    use appdx_common::types::EntityType;

    use super::{EntityTarget, MetricDefinition, load_mapping, parse_mapping};

    const MAPPING: &str = "entityType\tmetricPath\tmetricName\tlabels\n\
        \"APM\"\t\"Business Transaction Performance|Business Transactions|*|*|Calls per Minute\"\t\"BT calls\"\t\"tier,bt\"\n\
        \n\
        BRUM\tEnd User Experience|App|Page Requests per Minute\tPage requests\t\n\
        LEGACY\tSomething|*\tLegacy thing\tkind\n";

    #[test]
    fn parses_rows_and_skips_header_and_blank_lines() {
        let definitions = parse_mapping(MAPPING).unwrap();
        assert_eq!(definitions.len(), 3);

        let calls = &definitions[0];
        assert_eq!(calls.entity, EntityTarget::Known(EntityType::Apm));
        assert_eq!(calls.labels, vec!["tier", "bt"]);
        assert_eq!(calls.wildcard_positions(), vec![2, 3]);
        assert_eq!(
            calls.gauge_label_names(),
            vec!["controller", "application", "tier", "bt"]
        );

        assert!(definitions[1].labels.is_empty());
        assert_eq!(definitions[2].entity, EntityTarget::Unknown("LEGACY".to_string()));
    }

    #[test]
    fn gauge_name_uses_upper_cased_label_placeholders() {
        let definition = MetricDefinition::new(
            EntityTarget::Known(EntityType::Apm),
            "Business Transaction Performance|Business Transactions|*|*|Calls per Minute",
            "BT calls",
            vec!["tier".to_string(), "bt".to_string()],
        )
        .unwrap();

        assert_eq!(
            definition.gauge_name(),
            "apm:business_transaction_performance_business_transactions_TIER_BT_calls_per_minute"
        );
    }

    #[test]
    fn wildcard_label_mismatch_reports_line() {
        let text = "header\nAPM\ta|*|b|*\tname\tonly_one\n";
        let err = parse_mapping(text).unwrap_err();
        assert_eq!(err.kind(), "config");
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn short_rows_are_rejected() {
        let err = parse_mapping("header\nAPM\ta|b\n").unwrap_err();
        assert!(err.to_string().contains("line 2"));
    }

    #[test]
    fn label_whitespace_is_trimmed() {
        let definitions = parse_mapping("header\nAPM\ta|*|*\tname\ttier, bt\n").unwrap();
        assert_eq!(definitions[0].labels, vec!["tier", "bt"]);
    }

    #[test]
    fn malformed_labels_are_rejected_with_line() {
        for labels in ["tier,bt name", "controller", "tier,tier", "__tier", "9tier", "tier,"] {
            let wildcards = vec!["*"; labels.split(',').count()].join("|");
            let text = format!("header\nAPM\tPerf|{wildcards}\tname\t{labels}\n");
            let err = parse_mapping(&text).unwrap_err();
            assert_eq!(err.kind(), "config", "{labels}");
            assert!(err.to_string().contains("line 2"), "{labels}");
        }
    }

    #[test]
    fn application_label_collides_with_gauge_labels() {
        let err = MetricDefinition::new(
            EntityTarget::Known(EntityType::Apm),
            "Perf|*",
            "name",
            vec!["application".to_string()],
        )
        .unwrap_err();
        assert!(err.to_string().contains("application"));
    }

    #[tokio::test]
    async fn load_mapping_reads_file_and_reports_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("DefaultMapping.tsv");
        tokio::fs::write(&path, MAPPING).await.unwrap();

        assert_eq!(load_mapping(&path).await.unwrap().len(), 3);

        let err = load_mapping(dir.path().join("Missing.tsv")).await.unwrap_err();
        assert_eq!(err.kind(), "config");
    }
}
