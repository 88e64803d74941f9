use std::sync::Arc;

use appdx_common::{
    error::Result,
    types::EntityType,
};
use appdx_config::mapping::MetricDefinition;
use appdx_controller::ControllerSession;
use appdx_metrics::{ExporterMetrics, GaugeMetric, MetricsRegistry};
use tracing::{debug, info, warn};

use crate::{binder::bind, executor::BoundedExecutor, resolver::ControllerApplications};

/// A metric definition paired with the gauge its readings are written to.
pub struct GaugeBinding {
    pub definition: MetricDefinition,
    pub gauge: Arc<GaugeMetric>,
}

impl GaugeBinding {
    pub fn register(registry: &MetricsRegistry, definition: MetricDefinition) -> Result<Self> {
        let name = definition.gauge_name();
        let label_names = definition.gauge_label_names();
        let label_refs: Vec<&str> = label_names.iter().map(String::as_str).collect();

        info!(metric = %name, "registering metric");
        let gauge = registry.register_gauge(&name, &definition.metric_name, &label_refs)?;
        Ok(Self { definition, gauge })
    }

    pub fn register_all(
        registry: &MetricsRegistry,
        definitions: Vec<MetricDefinition>,
    ) -> Result<Vec<Self>> {
        definitions
            .into_iter()
            .map(|definition| Self::register(registry, definition))
            .collect()
    }
}

/// Runs one fetch cycle across every controller and metric definition.
pub struct Collector {
    sessions: Vec<Arc<ControllerSession>>,
    bindings: Vec<GaugeBinding>,
    executor: BoundedExecutor,
    exporter: ExporterMetrics,
}

impl Collector {
    pub fn new(
        sessions: Vec<Arc<ControllerSession>>,
        bindings: Vec<GaugeBinding>,
        executor: BoundedExecutor,
        exporter: ExporterMetrics,
    ) -> Self {
        Self {
            sessions,
            bindings,
            executor,
            exporter,
        }
    }

    pub fn exporter(&self) -> &ExporterMetrics {
        &self.exporter
    }

    /// Any failed batch ends the cycle with that batch's first error.
    pub async fn run_cycle(&self) -> Result<()> {
        self.login_all().await?;
        let applications = self.fetch_applications().await?;

        for (session, applications) in self.sessions.iter().zip(&applications) {
            self.collect_controller(session, applications).await?;
        }

        for session in &self.sessions {
            self.exporter
                .record_controller_calls(session.host(), session.calls());
        }
        Ok(())
    }

    /// Closes every session, reporting but not propagating failures.
    pub async fn close_all(&self) {
        let results = self
            .executor
            .run_all(self.sessions.iter().map(|session| session.close()))
            .await;

        for (session, result) in self.sessions.iter().zip(results) {
            if let Err(err) = result {
                warn!(controller = %session.host(), error = %err, "failed to close controller session");
            }
        }
    }

    async fn login_all(&self) -> Result<()> {
        let results = self
            .executor
            .run_all(self.sessions.iter().map(|session| session.login()))
            .await;
        settle(results, "login").map(drop)
    }

    async fn fetch_applications(&self) -> Result<Vec<ControllerApplications>> {
        let (apm, brum, mrum, bundles) = tokio::join!(
            self.executor.run_all(
                self.sessions
                    .iter()
                    .map(|session| session.get_applications(EntityType::Apm))
            ),
            self.executor.run_all(
                self.sessions
                    .iter()
                    .map(|session| session.get_applications(EntityType::Brum))
            ),
            self.executor.run_all(
                self.sessions
                    .iter()
                    .map(|session| session.get_applications(EntityType::Mrum))
            ),
            self.executor.run_all(
                self.sessions
                    .iter()
                    .map(|session| session.get_all_application_types())
            ),
        );

        let apm = settle(apm, "apm applications")?;
        let brum = settle(brum, "brum applications")?;
        let mrum = settle(mrum, "mrum applications")?;
        let bundles = settle(bundles, "all application types")?;

        Ok(apm
            .into_iter()
            .zip(brum)
            .zip(mrum)
            .zip(bundles)
            .map(|(((apm, brum), mrum), bundle)| ControllerApplications {
                apm,
                brum,
                mrum,
                bundle,
            })
            .collect())
    }

    async fn collect_controller(
        &self,
        session: &ControllerSession,
        applications: &ControllerApplications,
    ) -> Result<()> {
        let host = session.host();
        let total = self.bindings.len();

        for (index, binding) in self.bindings.iter().enumerate() {
            let definition = &binding.definition;
            info!(
                controller = %host,
                metric = %binding.gauge.name(),
                "fetching metric ({}/{total})",
                index + 1
            );

            let entities = applications.resolve(definition, host);
            if entities.is_empty() {
                continue;
            }

            let results = self
                .executor
                .run_all(entities.iter().map(|entity| {
                    session.get_metric_data(entity.id, &definition.metric_path, session.window())
                }))
                .await;
            let results = settle(results, "metric data")?;

            for (entity, points) in entities.iter().zip(results) {
                for value in bind(definition, host, &entity.name, &points) {
                    debug!(
                        metric = %binding.gauge.name(),
                        labels = ?value.labels,
                        value = value.value,
                        "setting metric"
                    );
                    binding.gauge.set(&value.label_values(), value.value);
                }
            }
        }
        Ok(())
    }
}

fn settle<T>(results: Vec<Result<T>>, batch: &'static str) -> Result<Vec<T>> {
    let failures = results.iter().filter(|result| result.is_err()).count();
    if failures > 0 {
        debug!(batch, failures, total = results.len(), "batch completed with failures");
    }
    results.into_iter().collect()
}
