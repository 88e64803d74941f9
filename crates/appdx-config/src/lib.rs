pub mod credential;
pub mod job;
pub mod mapping;

pub use job::{JobEntry, JobFile};
pub use mapping::{EntityTarget, MetricDefinition, PATH_DELIMITER, WILDCARD, load_mapping, parse_mapping};
