use std::{net::IpAddr, sync::RwLock, time::Duration};

use appdx_common::{
    error::{AppdError, Result},
    types::{ControllerConfig, Secret},
};
use async_trait::async_trait;
use tracing::{debug, warn};
use url::Url;

use crate::transport::{ControllerRequest, ControllerResponse, ControllerTransport};

pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// `reqwest` backed transport. Every request carries basic auth for
/// `username@account`.
///
/// Closing drops the client, which releases its idle pooled connections.
/// Requests already in flight hold their own handle and run to completion.
pub struct HttpTransport {
    host: String,
    base_url: Url,
    client: RwLock<Option<reqwest::Client>>,
    login_user: String,
    password: Secret,
}

impl HttpTransport {
    pub fn new(config: &ControllerConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url()).map_err(|err| {
            AppdError::Config(format!("invalid controller url {}: {err}", config.base_url()))
        })?;

        if config.host.parse::<IpAddr>().is_ok() {
            warn!(
                controller = %config.host,
                "configured host is an IP address, consider using the DNS name instead"
            );
        }

        let mut builder = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .danger_accept_invalid_certs(!config.verify_ssl);
        if !config.use_proxy {
            builder = builder.no_proxy();
        }
        let client = builder.build().map_err(|err| {
            AppdError::Config(format!(
                "failed to create http client for {}: {err}",
                config.host
            ))
        })?;

        Ok(Self {
            host: config.host.clone(),
            base_url,
            client: RwLock::new(Some(client)),
            login_user: config.login_user(),
            password: config.password.clone(),
        })
    }

    /// A handle to the live client, or `SessionClosed` once closed.
    fn client(&self) -> Result<reqwest::Client> {
        let client = self
            .client
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        client
            .clone()
            .ok_or_else(|| AppdError::SessionClosed(self.host.clone()))
    }

    fn transport_error(&self, err: impl std::fmt::Display) -> AppdError {
        AppdError::Transport {
            host: self.host.clone(),
            reason: err.to_string(),
        }
    }
}

#[async_trait]
impl ControllerTransport for HttpTransport {
    async fn send(&self, request: ControllerRequest) -> Result<ControllerResponse> {
        let client = self.client()?;
        let url = self
            .base_url
            .join(&request.path)
            .map_err(|err| self.transport_error(err))?;

        let mut builder = client
            .get(url)
            .query(&request.query)
            .basic_auth(&self.login_user, Some(self.password.expose()));
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    String::from_utf8_lossy(value.as_bytes()).into_owned(),
                )
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|err| self.transport_error(err))?;

        Ok(ControllerResponse {
            status,
            headers,
            body,
        })
    }

    async fn close(&self) -> Result<()> {
        let released = self
            .client
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take();
        if released.is_none() {
            debug!(controller = %self.host, "http transport already closed");
        }
        Ok(())
    }
}
