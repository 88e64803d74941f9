use appdx_common::types::EntityType;
use serde::Deserialize;

/// The controller reports applications without a name as `null`; so do we.
pub const NULL_NAME: &str = "null";

/// Canonical application record, whatever endpoint it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRecord {
    pub id: i64,
    pub name: String,
    pub tagged_name: Option<String>,
}

impl EntityRecord {
    pub fn new(id: i64, name: Option<String>) -> Self {
        Self {
            id,
            name: normalize_name(name),
            tagged_name: None,
        }
    }
}

pub fn normalize_name(name: Option<String>) -> String {
    name.unwrap_or_else(|| NULL_NAME.to_string())
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawApplication {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
}

impl From<RawApplication> for EntityRecord {
    fn from(raw: RawApplication) -> Self {
        Self::new(raw.id, raw.name)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMobileGroup {
    #[serde(default)]
    pub app_key: Option<String>,
    #[serde(default)]
    pub children: Vec<RawMobileApplication>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawMobileApplication {
    pub application_id: i64,
    #[serde(default)]
    pub internal_name: Option<String>,
}

/// Flattens mobile application groups into one list.
///
/// Internal names repeat across groups, so each record also gets a tagged name
/// of `<group key>-<internal name>`.
pub fn flatten_mobile_groups(groups: Vec<RawMobileGroup>) -> Vec<EntityRecord> {
    groups
        .into_iter()
        .flat_map(|group| {
            let app_key = normalize_name(group.app_key);
            group.children.into_iter().map(move |child| {
                let name = normalize_name(child.internal_name);
                EntityRecord {
                    id: child.application_id,
                    tagged_name: Some(format!("{app_key}-{name}")),
                    name,
                }
            })
        })
        .collect()
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawApplicationBundle {
    #[serde(default)]
    pub analytics_application: Option<RawApplication>,
    #[serde(default)]
    pub db_mon_application: Option<RawApplication>,
    #[serde(default)]
    pub sim_application: Option<RawApplication>,
}

/// Singleton applications from the "all types" bundle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllApplicationTypes {
    pub analytics: Option<EntityRecord>,
    pub database: Option<EntityRecord>,
    pub sim: Option<EntityRecord>,
}

impl AllApplicationTypes {
    pub fn get(&self, entity_type: EntityType) -> Option<&EntityRecord> {
        match entity_type {
            EntityType::Analytics => self.analytics.as_ref(),
            EntityType::Database => self.database.as_ref(),
            EntityType::Sim => self.sim.as_ref(),
            EntityType::Apm | EntityType::Brum | EntityType::Mrum => None,
        }
    }
}

impl From<RawApplicationBundle> for AllApplicationTypes {
    fn from(raw: RawApplicationBundle) -> Self {
        Self {
            analytics: raw.analytics_application.map(EntityRecord::from),
            database: raw.db_mon_application.map(EntityRecord::from),
            sim: raw.sim_application.map(EntityRecord::from),
        }
    }
}

#[cfg(test)]
mod tests {
    use appdx_common::types::EntityType;

    use super::{
        AllApplicationTypes, EntityRecord, RawApplication, RawApplicationBundle, RawMobileGroup,
        flatten_mobile_groups,
    };

    #[test]
    fn mobile_groups_flatten_with_tagged_names() {
        let groups: Vec<RawMobileGroup> = serde_json::from_str(
            r#"[
                {"appKey": "G1", "children": [{"internalName": "app1", "applicationId": 7}]},
                {"appKey": "G2", "children": [
                    {"internalName": "app1", "applicationId": 8},
                    {"internalName": null, "applicationId": 9}
                ]}
            ]"#,
        )
        .unwrap();

        let records = flatten_mobile_groups(groups);
        assert_eq!(
            records,
            vec![
                EntityRecord {
                    id: 7,
                    name: "app1".to_string(),
                    tagged_name: Some("G1-app1".to_string()),
                },
                EntityRecord {
                    id: 8,
                    name: "app1".to_string(),
                    tagged_name: Some("G2-app1".to_string()),
                },
                EntityRecord {
                    id: 9,
                    name: "null".to_string(),
                    tagged_name: Some("G2-null".to_string()),
                },
            ]
        );
    }

    #[test]
    fn null_application_name_becomes_literal_null() {
        let raw: Vec<RawApplication> =
            serde_json::from_str(r#"[{"id": 1, "name": null}, {"id": 2}]"#).unwrap();
        let records = raw.into_iter().map(EntityRecord::from).collect::<Vec<_>>();

        assert_eq!(records[0].name, "null");
        assert_eq!(records[1].name, "null");
    }

    #[test]
    fn bundle_exposes_singletons_by_type() {
        let raw: RawApplicationBundle = serde_json::from_str(
            r#"{
                "analyticsApplication": {"id": 11, "name": "Analytics"},
                "dbMonApplication": {"id": 12, "name": "Database Monitoring"},
                "apmApplications": []
            }"#,
        )
        .unwrap();
        let bundle = AllApplicationTypes::from(raw);

        assert_eq!(bundle.get(EntityType::Analytics).map(|record| record.id), Some(11));
        assert_eq!(bundle.get(EntityType::Database).map(|record| record.id), Some(12));
        assert!(bundle.get(EntityType::Sim).is_none());
        assert!(bundle.get(EntityType::Apm).is_none());
    }
}
