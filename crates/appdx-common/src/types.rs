use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::AppdError;

/// Hostname suffix of the multi-tenant controller service.
pub const SAAS_HOST_SUFFIX: &str = "saas.appdynamics.com";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityType {
    Apm,
    Analytics,
    Database,
    Brum,
    Mrum,
    Sim,
}

impl EntityType {
    pub const ALL: [EntityType; 6] = [
        Self::Apm,
        Self::Analytics,
        Self::Database,
        Self::Brum,
        Self::Mrum,
        Self::Sim,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Apm => "APM",
            Self::Analytics => "ANALYTICS",
            Self::Database => "DATABASE",
            Self::Brum => "BRUM",
            Self::Mrum => "MRUM",
            Self::Sim => "SIM",
        }
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = AppdError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let value = value.trim();
        Self::ALL
            .into_iter()
            .find(|entity_type| entity_type.as_str().eq_ignore_ascii_case(value))
            .ok_or_else(|| AppdError::InvalidArgument(format!("unknown entity type: {value}")))
    }
}

/// Per-type application name filters.
///
/// A filter map that is present but has no pattern for a type means "collect
/// nothing" for that type. Leaving the whole map out collects everything.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApplicationFilter {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub apm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub brum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mrum: Option<String>,
}

impl ApplicationFilter {
    pub fn pattern_for(&self, entity_type: EntityType) -> Option<&str> {
        match entity_type {
            EntityType::Apm => self.apm.as_deref(),
            EntityType::Brum => self.brum.as_deref(),
            EntityType::Mrum => self.mrum.as_deref(),
            EntityType::Analytics | EntityType::Database | EntityType::Sim => None,
        }
    }
}

#[derive(Clone)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(***)")
    }
}

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    pub host: String,
    pub port: u16,
    pub ssl: bool,
    pub account: String,
    pub username: String,
    pub password: Secret,
    pub verify_ssl: bool,
    pub use_proxy: bool,
    pub application_filter: Option<ApplicationFilter>,
    pub refresh_interval_minutes: u32,
}

impl ControllerConfig {
    pub fn scheme(&self) -> &'static str {
        if self.ssl { "https" } else { "http" }
    }

    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme(), self.host, self.port)
    }

    pub fn login_user(&self) -> String {
        format!("{}@{}", self.username, self.account)
    }

    pub fn is_saas(&self) -> bool {
        self.host.trim_end_matches('.').ends_with(SAAS_HOST_SUFFIX)
    }
}
