use std::{future::Future, time::Duration};

use appdx_common::error::AppdError;
use tokio::time::Instant;
use tracing::{error, info, warn};

use crate::collector::Collector;

/// What to do after a cycle that took `elapsed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepPlan {
    Sleep(Duration),
    /// The cycle used the whole interval; start the next one immediately.
    Overrun { recommended_minutes: u64 },
}

pub fn plan_sleep(elapsed: Duration, interval: Duration) -> SleepPlan {
    if elapsed >= interval {
        SleepPlan::Overrun {
            recommended_minutes: elapsed.as_secs() / 60 + 1,
        }
    } else {
        SleepPlan::Sleep(interval - elapsed)
    }
}

#[derive(Debug)]
pub enum StopReason {
    Shutdown,
    Aborted(AppdError),
}

impl StopReason {
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Shutdown => 0,
            Self::Aborted(_) => 1,
        }
    }
}

/// Drives collection cycles until a cycle fails or shutdown is requested.
/// Either way every controller session is closed before returning.
pub struct Poller {
    collector: Collector,
    interval: Duration,
    interval_minutes: u32,
}

impl Poller {
    pub fn new(collector: Collector, interval_minutes: u32) -> Self {
        Self {
            collector,
            interval: Duration::from_secs(u64::from(interval_minutes) * 60),
            interval_minutes,
        }
    }

    pub async fn run<S>(&self, shutdown: S) -> StopReason
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);

        let reason = loop {
            let started = Instant::now();
            let outcome = tokio::select! {
                outcome = self.collector.run_cycle() => outcome,
                _ = &mut shutdown => break StopReason::Shutdown,
            };
            if let Err(err) = outcome {
                break StopReason::Aborted(err);
            }

            let elapsed = started.elapsed();
            self.collector.exporter().record_cycle(elapsed);
            info!(elapsed_secs = elapsed.as_secs_f64(), "metrics loop completed");

            match plan_sleep(elapsed, self.interval) {
                SleepPlan::Overrun {
                    recommended_minutes,
                } => {
                    warn!(
                        refresh_interval_minutes = self.interval_minutes,
                        recommended_minutes,
                        "metrics loop took longer than the refresh interval, skipping sleep; \
                         consider increasing refreshIntervalMinutes"
                    );
                }
                SleepPlan::Sleep(pause) => {
                    info!(sleep_secs = pause.as_secs_f64(), "sleeping until next cycle");
                    tokio::select! {
                        _ = tokio::time::sleep(pause) => {}
                        _ = &mut shutdown => break StopReason::Shutdown,
                    }
                }
            }
        };

        self.collector.close_all().await;
        match &reason {
            StopReason::Shutdown => info!("shutdown requested, controller sessions closed"),
            StopReason::Aborted(err) => match err.controller() {
                Some(controller) => error!(controller, error = %err, "aborting"),
                None => error!(error = %err, "aborting"),
            },
        }
        reason
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use appdx_common::types::{ControllerConfig, Secret};
    use appdx_controller::{
        ControllerSession,
        mock::MockTransport,
        session::{
            ALL_APPLICATION_TYPES_PATH, APM_APPLICATIONS_PATH, BRUM_APPLICATIONS_PATH,
            LOGIN_PATH, MRUM_APPLICATIONS_PATH,
        },
        transport::ControllerResponse,
    };
    use appdx_metrics::{ExporterMetrics, MetricsRegistry};

    use super::{Poller, SleepPlan, StopReason, plan_sleep};
    use crate::{
        collector::Collector,
        executor::{BoundedExecutor, ConcurrencyCap},
    };

    #[test]
    fn overrun_skips_sleep_and_recommends_a_longer_interval() {
        assert_eq!(
            plan_sleep(Duration::from_secs(130), Duration::from_secs(60)),
            SleepPlan::Overrun {
                recommended_minutes: 3
            }
        );
        assert_eq!(
            plan_sleep(Duration::from_secs(20), Duration::from_secs(60)),
            SleepPlan::Sleep(Duration::from_secs(40))
        );
        assert!(matches!(
            plan_sleep(Duration::from_secs(60), Duration::from_secs(60)),
            SleepPlan::Overrun { .. }
        ));
    }

    fn session(host: &str, transport: Arc<MockTransport>) -> Arc<ControllerSession> {
        let config = ControllerConfig {
            host: host.to_string(),
            port: 8090,
            ssl: false,
            account: "customer1".to_string(),
            username: "reader".to_string(),
            password: Secret::new("secret"),
            verify_ssl: true,
            use_proxy: false,
            application_filter: None,
            refresh_interval_minutes: 1,
        };
        Arc::new(ControllerSession::new(config, transport).unwrap())
    }

    #[tokio::test]
    async fn failed_login_closes_every_session_and_exits_non_zero() {
        let good = Arc::new(MockTransport::new("a.example.com"));
        good.accept_login("sess", "csrf");
        let bad = Arc::new(MockTransport::new("b.example.com"));
        bad.respond(LOGIN_PATH, ControllerResponse::new(401, "Unauthorized"));

        let registry = MetricsRegistry::new();
        let collector = Collector::new(
            vec![
                session("a.example.com", good.clone()),
                session("b.example.com", bad.clone()),
            ],
            Vec::new(),
            BoundedExecutor::new(ConcurrencyCap::new(10)),
            ExporterMetrics::register(&registry).unwrap(),
        );

        let reason = Poller::new(collector, 1)
            .run(std::future::pending::<()>())
            .await;

        assert!(matches!(reason, StopReason::Aborted(_)));
        assert_eq!(reason.exit_code(), 1);
        assert_eq!(good.close_calls(), 1);
        assert_eq!(bad.close_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_during_sleep_is_graceful() {
        let transport = Arc::new(MockTransport::new("a.example.com"));
        transport.accept_login("sess", "csrf");
        for path in [
            APM_APPLICATIONS_PATH,
            BRUM_APPLICATIONS_PATH,
            MRUM_APPLICATIONS_PATH,
            ALL_APPLICATION_TYPES_PATH,
        ] {
            transport.respond(path, ControllerResponse::new(200, ""));
        }

        let registry = MetricsRegistry::new();
        let collector = Collector::new(
            vec![session("a.example.com", transport.clone())],
            Vec::new(),
            BoundedExecutor::new(ConcurrencyCap::new(10)),
            ExporterMetrics::register(&registry).unwrap(),
        );

        let reason = Poller::new(collector, 1)
            .run(tokio::time::sleep(Duration::from_secs(90)))
            .await;

        assert_eq!(reason.exit_code(), 0);
        assert_eq!(transport.requests_to(LOGIN_PATH), 2);
        assert_eq!(transport.close_calls(), 1);
        assert!(registry.render_prometheus().contains("appdx_cycles_total 2"));
    }
}
