use std::path::{Path, PathBuf};

use appdx_common::{
    error::{AppdError, Result},
    types::{ApplicationFilter, ControllerConfig, Secret},
};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tracing::{debug, info};

use crate::credential;

/// One controller record of a job file, as stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobEntry {
    pub host: String,
    pub port: u16,
    pub ssl: bool,
    pub account: String,
    pub username: String,
    pub pwd: String,
    #[serde(default = "default_verify_ssl")]
    pub verify_ssl: bool,
    #[serde(default)]
    pub use_proxy: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_filter: Option<ApplicationFilter>,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_minutes: u32,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

fn default_verify_ssl() -> bool {
    true
}

fn default_refresh_interval() -> u32 {
    1
}

impl JobEntry {
    pub fn to_controller_config(&self) -> Result<ControllerConfig> {
        let password = credential::decode(&self.pwd).map_err(|_| {
            AppdError::Config(format!(
                "credential for {} is not encoded, run credential encoding first",
                self.host
            ))
        })?;

        Ok(ControllerConfig {
            host: self.host.clone(),
            port: self.port,
            ssl: self.ssl,
            account: self.account.clone(),
            username: self.username.clone(),
            password: Secret::new(password),
            verify_ssl: self.verify_ssl,
            use_proxy: self.use_proxy,
            application_filter: self.application_filter.clone(),
            refresh_interval_minutes: self.refresh_interval_minutes,
        })
    }
}

#[derive(Debug, Clone)]
pub struct JobFile {
    path: PathBuf,
    entries: Vec<JobEntry>,
}

impl JobFile {
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let bytes = match fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(AppdError::Config(format!(
                    "job file {} does not exist",
                    path.display()
                )));
            }
            Err(err) => return Err(err.into()),
        };

        let entries: Vec<JobEntry> = serde_json::from_slice(&bytes).map_err(|err| {
            AppdError::Config(format!("failed to parse job file {}: {err}", path.display()))
        })?;
        if entries.is_empty() {
            return Err(AppdError::Config(format!(
                "job file {} lists no controllers",
                path.display()
            )));
        }
        if let Some(entry) = entries.iter().find(|entry| entry.refresh_interval_minutes == 0) {
            return Err(AppdError::Config(format!(
                "refreshIntervalMinutes for {} must be at least 1",
                entry.host
            )));
        }

        debug!(path = %path.display(), controllers = entries.len(), "loaded job file");
        Ok(Self { path, entries })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn entries(&self) -> &[JobEntry] {
        &self.entries
    }

    /// Rewrites every plain credential into its encoded form. Returns the number changed.
    pub fn encode_credentials(&mut self) -> usize {
        let mut changed = 0;
        for entry in &mut self.entries {
            let encoded = credential::ensure_encoded(&entry.pwd);
            if encoded != entry.pwd {
                entry.pwd = encoded;
                changed += 1;
            }
        }
        changed
    }

    pub async fn save(&self) -> Result<()> {
        let data = serde_json::to_vec_pretty(&self.entries).map_err(|err| {
            AppdError::Internal(format!(
                "failed to serialize job file {}: {err}",
                self.path.display()
            ))
        })?;
        fs::write(&self.path, data).await?;
        info!(path = %self.path.display(), "saved job file");
        Ok(())
    }

    pub fn controllers(&self) -> Result<Vec<ControllerConfig>> {
        self.entries
            .iter()
            .map(JobEntry::to_controller_config)
            .collect()
    }

    /// The polling interval is taken from the first controller of the job.
    pub fn refresh_interval_minutes(&self) -> u32 {
        self.entries
            .first()
            .map(|entry| entry.refresh_interval_minutes)
            .unwrap_or_else(default_refresh_interval)
    }
}
