use std::sync::{
    Arc, RwLock,
    atomic::{AtomicU64, Ordering},
};

use appdx_common::{
    error::{AppdError, Result},
    time::TimeWindow,
    types::{ControllerConfig, EntityType},
};
use serde::de::DeserializeOwned;
use tracing::{debug, error, warn};

use crate::{
    entity::{
        AllApplicationTypes, EntityRecord, RawApplication, RawApplicationBundle, RawMobileGroup,
        flatten_mobile_groups,
    },
    filter::{FilterDecision, FilterSet, retain_matching},
    http::HttpTransport,
    metric_data::MetricDataPoint,
    transport::{ControllerRequest, ControllerTransport},
};

pub const LOGIN_PATH: &str = "/controller/auth";
pub const APM_APPLICATIONS_PATH: &str = "/controller/rest/applications";
pub const ALL_APPLICATION_TYPES_PATH: &str =
    "/controller/restui/applicationManagerUiBean/getApplicationsAllTypes";
pub const BRUM_APPLICATIONS_PATH: &str =
    "/controller/restui/eumApplications/getAllEumApplicationsData";
pub const MRUM_APPLICATIONS_PATH: &str =
    "/controller/restui/eumApplications/getAllMobileApplicationsData";

pub const SESSION_COOKIE: &str = "JSESSIONID";
pub const CSRF_TOKEN: &str = "X-CSRF-TOKEN";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    New,
    Authenticated,
    Closed,
}

#[derive(Debug)]
struct SessionAuth {
    state: SessionState,
    session_id: Option<String>,
    csrf_token: Option<String>,
}

/// Authenticated conversation with one controller.
///
/// Tokens may expire between cycles, so `login` is expected to run at the
/// start of every cycle. The query window is fixed at construction.
pub struct ControllerSession {
    config: ControllerConfig,
    transport: Arc<dyn ControllerTransport>,
    filters: Option<FilterSet>,
    window: TimeWindow,
    auth: RwLock<SessionAuth>,
    calls: AtomicU64,
}

impl ControllerSession {
    pub fn new(config: ControllerConfig, transport: Arc<dyn ControllerTransport>) -> Result<Self> {
        debug!(controller = %config.host, "initializing controller session");
        let filters = config
            .application_filter
            .as_ref()
            .map(FilterSet::compile)
            .transpose()?;
        let window = TimeWindow::ending_now(config.refresh_interval_minutes);

        Ok(Self {
            config,
            transport,
            filters,
            window,
            auth: RwLock::new(SessionAuth {
                state: SessionState::New,
                session_id: None,
                csrf_token: None,
            }),
            calls: AtomicU64::new(0),
        })
    }

    pub fn connect(config: ControllerConfig) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(&config)?);
        Self::new(config, transport)
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    pub fn window(&self) -> &TimeWindow {
        &self.window
    }

    /// Successful controller responses handled so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> SessionState {
        self.auth
            .read()
            .map(|auth| auth.state)
            .unwrap_or(SessionState::Closed)
    }

    pub async fn login(&self) -> Result<()> {
        self.ensure_open()?;
        debug!(controller = %self.host(), "attempting controller connection");

        let request = ControllerRequest::get(LOGIN_PATH).query("action", "login");
        let response = self.transport.send(request).await.inspect_err(|err| {
            error!(controller = %self.host(), error = %err, "controller login failed");
        })?;

        if !response.is_success() {
            error!(
                controller = %self.host(),
                status = response.status,
                "controller login failed, check username and password"
            );
            return Err(self.auth_error(format!(
                "controller login failed with {}, check username and password",
                response.status
            )));
        }
        self.calls.fetch_add(1, Ordering::Relaxed);

        let session_id = find_cookie_token(&response.headers, SESSION_COOKIE);
        let csrf_token = find_cookie_token(&response.headers, CSRF_TOKEN);

        let mut auth = self.auth.write().map_err(|_| self.lock_error())?;
        match session_id {
            Some(value) => auth.session_id = Some(value),
            None => debug!(controller = %self.host(), "no JSESSIONID in login response"),
        }
        match csrf_token {
            Some(value) => auth.csrf_token = Some(value),
            None => debug!(controller = %self.host(), "no X-CSRF-TOKEN in login response"),
        }

        if auth.session_id.is_none() || auth.csrf_token.is_none() {
            return Err(self.auth_error(
                "valid authentication headers not cached from login call, verify credentials"
                    .to_string(),
            ));
        }

        auth.state = SessionState::Authenticated;
        debug!(controller = %self.host(), "controller login successful");
        Ok(())
    }

    /// Entity list of one type, after name normalization and filtering.
    pub async fn get_applications(&self, entity_type: EntityType) -> Result<Vec<EntityRecord>> {
        let decision = self
            .filters
            .as_ref()
            .and_then(|filters| filters.decision(entity_type));
        if let Some(FilterDecision::Exclude) = decision {
            warn!(
                controller = %self.host(),
                entity_type = %entity_type,
                "application filter has no pattern for this type, collecting nothing"
            );
            return Ok(Vec::new());
        }

        let mut records: Vec<EntityRecord> = match entity_type {
            EntityType::Apm => self
                .fetch_json::<Vec<RawApplication>>(
                    ControllerRequest::get(APM_APPLICATIONS_PATH).query("output", "json"),
                    "Gathering APM applications",
                )
                .await?
                .into_iter()
                .map(EntityRecord::from)
                .collect(),
            EntityType::Brum => self
                .fetch_json::<Vec<RawApplication>>(
                    ControllerRequest::get(BRUM_APPLICATIONS_PATH)
                        .query("output", "json")
                        .query("time-range", self.window.eum_time_range()),
                    "Gathering BRUM applications",
                )
                .await?
                .into_iter()
                .map(EntityRecord::from)
                .collect(),
            EntityType::Mrum => flatten_mobile_groups(
                self.fetch_json::<Vec<RawMobileGroup>>(
                    ControllerRequest::get(MRUM_APPLICATIONS_PATH)
                        .query("output", "json")
                        .query("time-range", self.window.eum_time_range()),
                    "Gathering MRUM applications",
                )
                .await?,
            ),
            EntityType::Analytics | EntityType::Database | EntityType::Sim => {
                let bundle = self.get_all_application_types().await?;
                return Ok(bundle.get(entity_type).cloned().into_iter().collect());
            }
        };

        if let Some(FilterDecision::Match(pattern)) = decision {
            for dropped in retain_matching(&mut records, pattern) {
                debug!(
                    controller = %self.host(),
                    entity_type = %entity_type,
                    application = %dropped.name,
                    rule = %pattern,
                    "filtered out application"
                );
            }
        }

        Ok(records)
    }

    pub async fn get_all_application_types(&self) -> Result<AllApplicationTypes> {
        let bundle = self
            .fetch_json::<RawApplicationBundle>(
                ControllerRequest::get(ALL_APPLICATION_TYPES_PATH).query("output", "json"),
                "Gathering all applications",
            )
            .await?;
        Ok(AllApplicationTypes::from(bundle))
    }

    pub async fn get_metric_data(
        &self,
        entity_id: i64,
        metric_path: &str,
        window: &TimeWindow,
    ) -> Result<Vec<MetricDataPoint>> {
        let request =
            ControllerRequest::get(format!("/controller/rest/applications/{entity_id}/metric-data"))
                .query("output", "json")
                .query("metric-path", metric_path)
                .query("rollup", true)
                .query("time-range-type", "BEFORE_NOW")
                .query("duration-in-mins", window.duration_minutes);

        self.fetch_json(
            request,
            &format!("Gathering metrics for \"{metric_path}\" on application {entity_id}"),
        )
        .await
    }

    pub async fn close(&self) -> Result<()> {
        {
            let mut auth = self.auth.write().map_err(|_| self.lock_error())?;
            if auth.state == SessionState::Closed {
                return Ok(());
            }
            auth.state = SessionState::Closed;
        }

        debug!(controller = %self.host(), "closing connection");
        self.transport.close().await
    }

    async fn fetch_json<T>(&self, request: ControllerRequest, context: &str) -> Result<T>
    where
        T: DeserializeOwned + Default,
    {
        self.ensure_open()?;
        let request = self.authorize(request)?;
        debug!(controller = %self.host(), "{context}");

        let response = self.transport.send(request).await?;
        if !response.is_success() {
            debug!(
                controller = %self.host(),
                status = response.status,
                body = %error_detail(&response.body),
                "{context} failed"
            );
            return Err(AppdError::Fetch {
                host: self.host().to_string(),
                context: context.to_string(),
                status: response.status,
            });
        }
        self.calls.fetch_add(1, Ordering::Relaxed);

        parse_body(&response.body).map_err(|err| {
            error!(
                controller = %self.host(),
                status = response.status,
                error = %err,
                "{context} returned a body that is not valid json"
            );
            AppdError::Parse {
                host: self.host().to_string(),
                context: context.to_string(),
                reason: err.to_string(),
            }
        })
    }

    fn authorize(&self, request: ControllerRequest) -> Result<ControllerRequest> {
        let auth = self.auth.read().map_err(|_| self.lock_error())?;
        let (Some(session_id), Some(csrf_token)) = (&auth.session_id, &auth.csrf_token) else {
            return Ok(request);
        };

        Ok(request
            .header(CSRF_TOKEN, csrf_token.clone())
            .header(
                "Cookie",
                format!("{SESSION_COOKIE}={session_id};{CSRF_TOKEN}={csrf_token};"),
            )
            .header("Content-Type", "application/json;charset=UTF-8"))
    }

    fn ensure_open(&self) -> Result<()> {
        if self.state() == SessionState::Closed {
            return Err(AppdError::SessionClosed(self.host().to_string()));
        }
        Ok(())
    }

    fn auth_error(&self, reason: String) -> AppdError {
        AppdError::Authentication {
            host: self.host().to_string(),
            reason,
        }
    }

    fn lock_error(&self) -> AppdError {
        AppdError::Internal(format!("{} - session state lock poisoned", self.host()))
    }
}

/// Finds `NAME=<word chars>` in any response header value.
fn find_cookie_token(headers: &[(String, String)], name: &str) -> Option<String> {
    let needle = format!("{name}=");
    headers.iter().find_map(|(_, value)| {
        let start = value.find(&needle)? + needle.len();
        let token = value[start..]
            .chars()
            .take_while(|ch| ch.is_alphanumeric() || *ch == '_')
            .collect::<String>();
        (!token.is_empty()).then_some(token)
    })
}

fn parse_body<T>(body: &[u8]) -> std::result::Result<T, serde_json::Error>
where
    T: DeserializeOwned + Default,
{
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(T::default());
    }
    serde_json::from_slice::<Option<T>>(body).map(Option::unwrap_or_default)
}

fn error_detail(body: &[u8]) -> String {
    serde_json::from_slice::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("message")
                .and_then(|message| message.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| String::from_utf8_lossy(body).into_owned())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use appdx_common::types::{ApplicationFilter, ControllerConfig, EntityType, Secret};
    use serde_json::json;

    use super::{
        APM_APPLICATIONS_PATH, ALL_APPLICATION_TYPES_PATH, ControllerSession, LOGIN_PATH,
        MRUM_APPLICATIONS_PATH, SessionState, find_cookie_token,
    };
    use crate::{mock::MockTransport, transport::ControllerResponse};

    fn config(filter: Option<ApplicationFilter>) -> ControllerConfig {
        ControllerConfig {
            host: "ctl.example.com".to_string(),
            port: 8090,
            ssl: false,
            account: "customer1".to_string(),
            username: "reader".to_string(),
            password: Secret::new("secret"),
            verify_ssl: true,
            use_proxy: false,
            application_filter: filter,
            refresh_interval_minutes: 5,
        }
    }

    fn session(filter: Option<ApplicationFilter>) -> (ControllerSession, Arc<MockTransport>) {
        let transport = Arc::new(MockTransport::new("ctl.example.com"));
        let session = ControllerSession::new(config(filter), transport.clone()).unwrap();
        (session, transport)
    }

    #[test]
    fn cookie_tokens_are_extracted_from_headers() {
        let headers = vec![
            ("set-cookie".to_string(), "JSESSIONID=abc123; Path=/; HttpOnly".to_string()),
            ("set-cookie".to_string(), "X-CSRF-TOKEN=f00d_beef; Path=/".to_string()),
        ];
        assert_eq!(find_cookie_token(&headers, "JSESSIONID").as_deref(), Some("abc123"));
        assert_eq!(find_cookie_token(&headers, "X-CSRF-TOKEN").as_deref(), Some("f00d_beef"));
        assert_eq!(find_cookie_token(&headers, "MISSING"), None);
    }

    #[tokio::test]
    async fn login_stores_tokens_and_sends_them_afterwards() {
        let (session, transport) = session(None);
        transport.accept_login("sess1", "csrf1");
        transport.respond_json(APM_APPLICATIONS_PATH, 200, json!([{"id": 1, "name": "shop"}]));

        session.login().await.unwrap();
        assert_eq!(session.state(), SessionState::Authenticated);

        let apps = session.get_applications(EntityType::Apm).await.unwrap();
        assert_eq!(apps.len(), 1);
        assert_eq!(session.calls(), 2);

        let requests = transport.requests();
        assert_eq!(requests[0].path, LOGIN_PATH);
        assert_eq!(requests[0].query_value("action"), Some("login"));
        assert_eq!(requests[1].header_value("X-CSRF-TOKEN"), Some("csrf1"));
        assert_eq!(
            requests[1].header_value("cookie"),
            Some("JSESSIONID=sess1;X-CSRF-TOKEN=csrf1;")
        );
    }

    #[tokio::test]
    async fn login_rejects_bad_status() {
        let (session, transport) = session(None);
        transport.respond(LOGIN_PATH, ControllerResponse::new(401, "Unauthorized"));

        let err = session.login().await.unwrap_err();
        assert_eq!(err.kind(), "authentication");
        assert_eq!(session.state(), SessionState::New);
    }

    #[tokio::test]
    async fn login_requires_both_tokens() {
        let (session, transport) = session(None);
        transport.respond(
            LOGIN_PATH,
            ControllerResponse::new(200, "").with_header("set-cookie", "JSESSIONID=only; Path=/"),
        );

        let err = session.login().await.unwrap_err();
        assert_eq!(err.kind(), "authentication");
    }

    #[tokio::test]
    async fn transport_fault_is_an_error_not_a_panic() {
        let (session, transport) = session(None);
        transport.fail(LOGIN_PATH, "connection refused");

        let err = session.login().await.unwrap_err();
        assert_eq!(err.kind(), "transport");
        assert_eq!(err.controller(), Some("ctl.example.com"));
    }

    #[tokio::test]
    async fn configured_filter_without_pattern_collects_nothing() {
        let (session, transport) = session(Some(ApplicationFilter {
            apm: Some("^prod-".to_string()),
            brum: None,
            mrum: None,
        }));
        transport.respond_json(
            APM_APPLICATIONS_PATH,
            200,
            json!([{"id": 1, "name": "prod-shop"}, {"id": 2, "name": "dev-shop"}, {"id": 3, "name": null}]),
        );

        let brum = session.get_applications(EntityType::Brum).await.unwrap();
        assert!(brum.is_empty());
        assert!(transport.requests().is_empty());

        let apm = session.get_applications(EntityType::Apm).await.unwrap();
        assert_eq!(apm.iter().map(|app| app.id).collect::<Vec<_>>(), vec![1]);
    }

    #[tokio::test]
    async fn without_filter_everything_is_collected() {
        let (session, transport) = session(None);
        transport.respond_json(
            APM_APPLICATIONS_PATH,
            200,
            json!([{"id": 1, "name": "prod-shop"}, {"id": 3, "name": null}]),
        );

        let apm = session.get_applications(EntityType::Apm).await.unwrap();
        assert_eq!(apm.len(), 2);
        assert_eq!(apm[1].name, "null");
    }

    #[tokio::test]
    async fn mobile_applications_are_flattened_then_filtered() {
        let (session, transport) = session(Some(ApplicationFilter {
            apm: None,
            brum: None,
            mrum: Some("ios".to_string()),
        }));
        transport.respond_json(
            MRUM_APPLICATIONS_PATH,
            200,
            json!([{"appKey": "AD-1", "children": [
                {"internalName": "ios-app", "applicationId": 21},
                {"internalName": "android-app", "applicationId": 22}
            ]}]),
        );

        let apps = session.get_applications(EntityType::Mrum).await.unwrap();
        assert_eq!(apps.len(), 1);
        assert_eq!(apps[0].id, 21);
        assert_eq!(apps[0].tagged_name.as_deref(), Some("AD-1-ios-app"));
        assert!(
            transport.requests()[0]
                .query_value("time-range")
                .is_some_and(|range| range.starts_with("Custom_Time_Range.BETWEEN_TIMES."))
        );
    }

    #[tokio::test]
    async fn singleton_types_come_from_the_bundle() {
        let (session, transport) = session(None);
        transport.respond_json(
            ALL_APPLICATION_TYPES_PATH,
            200,
            json!({"simApplication": {"id": 5, "name": "Server & Infrastructure Monitoring"}}),
        );

        let sim = session.get_applications(EntityType::Sim).await.unwrap();
        assert_eq!(sim.len(), 1);
        assert_eq!(sim[0].id, 5);
        let analytics = session.get_applications(EntityType::Analytics).await.unwrap();
        assert!(analytics.is_empty());
    }

    #[tokio::test]
    async fn metric_data_errors_carry_status_or_parse_reason() {
        let (session, transport) = session(None);
        let path = "/controller/rest/applications/7/metric-data";

        transport.respond(path, ControllerResponse::new(500, r#"{"message": "boom"}"#));
        let err = session
            .get_metric_data(7, "Overall Application Performance|*|Calls per Minute", session.window())
            .await
            .unwrap_err();
        assert!(matches!(err, appdx_common::AppdError::Fetch { status: 500, .. }));

        transport.respond(path, ControllerResponse::new(200, "<html>login</html>"));
        let err = session
            .get_metric_data(7, "Overall Application Performance|*|Calls per Minute", session.window())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "parse");

        transport.respond(path, ControllerResponse::new(200, ""));
        let points = session
            .get_metric_data(7, "Overall Application Performance|*|Calls per Minute", session.window())
            .await
            .unwrap();
        assert!(points.is_empty());

        let request = transport.requests().pop().unwrap();
        assert_eq!(
            request.query_value("metric-path"),
            Some("Overall Application Performance|*|Calls per Minute")
        );
        assert_eq!(request.query_value("rollup"), Some("true"));
        assert_eq!(request.query_value("time-range-type"), Some("BEFORE_NOW"));
        assert_eq!(request.query_value("duration-in-mins"), Some("5"));
    }

    #[tokio::test]
    async fn closed_session_refuses_work() {
        let (session, transport) = session(None);
        session.close().await.unwrap();
        session.close().await.unwrap();

        assert_eq!(session.state(), SessionState::Closed);
        assert_eq!(transport.close_calls(), 1);
        assert_eq!(session.login().await.unwrap_err().kind(), "session_closed");
    }
}
