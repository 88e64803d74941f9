use appdx_common::types::EntityType;
use appdx_config::mapping::{EntityTarget, MetricDefinition};
use appdx_controller::{AllApplicationTypes, EntityRecord};
use tracing::error;

/// Entity lists fetched from one controller during the current cycle.
#[derive(Debug, Clone, Default)]
pub struct ControllerApplications {
    pub apm: Vec<EntityRecord>,
    pub brum: Vec<EntityRecord>,
    pub mrum: Vec<EntityRecord>,
    pub bundle: AllApplicationTypes,
}

impl ControllerApplications {
    pub fn entities_for(&self, entity_type: EntityType) -> Vec<&EntityRecord> {
        match entity_type {
            EntityType::Apm => self.apm.iter().collect(),
            EntityType::Brum => self.brum.iter().collect(),
            EntityType::Mrum => self.mrum.iter().collect(),
            EntityType::Analytics | EntityType::Database | EntityType::Sim => {
                self.bundle.get(entity_type).into_iter().collect()
            }
        }
    }

    /// Entities a definition should be polled for. Unknown entity types are
    /// reported and yield nothing.
    pub fn resolve(&self, definition: &MetricDefinition, controller: &str) -> Vec<&EntityRecord> {
        match &definition.entity {
            EntityTarget::Known(entity_type) => self.entities_for(*entity_type),
            EntityTarget::Unknown(raw) => {
                error!(
                    controller,
                    entity_type = %raw,
                    metric = %definition.metric_path,
                    "unknown entity type, skipping metric"
                );
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use appdx_common::types::EntityType;
    use appdx_config::mapping::{EntityTarget, MetricDefinition};
    use appdx_controller::{AllApplicationTypes, EntityRecord};

    use super::ControllerApplications;

    fn applications() -> ControllerApplications {
        ControllerApplications {
            apm: vec![
                EntityRecord::new(1, Some("shop".to_string())),
                EntityRecord::new(2, None),
            ],
            brum: vec![EntityRecord::new(10, Some("web".to_string()))],
            mrum: vec![EntityRecord {
                id: 7,
                name: "app1".to_string(),
                tagged_name: Some("G1-app1".to_string()),
            }],
            bundle: AllApplicationTypes {
                analytics: None,
                database: Some(EntityRecord::new(30, Some("Database Monitoring".to_string()))),
                sim: Some(EntityRecord::new(40, Some("Server Monitoring".to_string()))),
            },
        }
    }

    #[test]
    fn lists_and_singletons_resolve_by_type() {
        let apps = applications();

        let apm = apps.entities_for(EntityType::Apm);
        assert_eq!(apm.iter().map(|e| e.id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(apm[1].name, "null");

        let mrum = apps.entities_for(EntityType::Mrum);
        assert_eq!(mrum[0].id, 7);
        assert_eq!(mrum[0].tagged_name.as_deref(), Some("G1-app1"));

        assert_eq!(apps.entities_for(EntityType::Database)[0].id, 30);
        assert_eq!(apps.entities_for(EntityType::Sim)[0].id, 40);
        assert!(apps.entities_for(EntityType::Analytics).is_empty());
    }

    #[test]
    fn unknown_entity_type_resolves_to_nothing() {
        let apps = applications();
        let definition = MetricDefinition::new(
            EntityTarget::Unknown("LEGACY".to_string()),
            "Overall Application Performance|Calls per Minute",
            "calls",
            Vec::new(),
        )
        .unwrap();

        assert!(apps.resolve(&definition, "ctl.example.com").is_empty());
    }
}
