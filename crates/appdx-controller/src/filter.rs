use appdx_common::{
    error::{AppdError, Result},
    types::{ApplicationFilter, EntityType},
};
use regex::Regex;

use crate::entity::EntityRecord;

/// Compiled application filter of one controller.
#[derive(Debug, Clone)]
pub struct FilterSet {
    apm: Option<Regex>,
    brum: Option<Regex>,
    mrum: Option<Regex>,
}

#[derive(Debug)]
pub enum FilterDecision<'a> {
    /// No pattern configured for this type: collect nothing.
    Exclude,
    Match(&'a Regex),
}

impl FilterSet {
    pub fn compile(filter: &ApplicationFilter) -> Result<Self> {
        Ok(Self {
            apm: compile_pattern(filter, EntityType::Apm)?,
            brum: compile_pattern(filter, EntityType::Brum)?,
            mrum: compile_pattern(filter, EntityType::Mrum)?,
        })
    }

    /// `None` for types the filter does not govern.
    pub fn decision(&self, entity_type: EntityType) -> Option<FilterDecision<'_>> {
        let pattern = match entity_type {
            EntityType::Apm => &self.apm,
            EntityType::Brum => &self.brum,
            EntityType::Mrum => &self.mrum,
            EntityType::Analytics | EntityType::Database | EntityType::Sim => return None,
        };

        Some(match pattern {
            Some(regex) => FilterDecision::Match(regex),
            None => FilterDecision::Exclude,
        })
    }
}

/// Keeps the records whose display name matches anywhere in `pattern`.
pub fn retain_matching(records: &mut Vec<EntityRecord>, pattern: &Regex) -> Vec<EntityRecord> {
    let (kept, dropped): (Vec<_>, Vec<_>) = records
        .drain(..)
        .partition(|record| pattern.is_match(&record.name));
    *records = kept;
    dropped
}

fn compile_pattern(filter: &ApplicationFilter, entity_type: EntityType) -> Result<Option<Regex>> {
    filter
        .pattern_for(entity_type)
        .map(|pattern| {
            Regex::new(pattern).map_err(|err| {
                AppdError::Config(format!(
                    "invalid {entity_type} application filter {pattern:?}: {err}"
                ))
            })
        })
        .transpose()
}
