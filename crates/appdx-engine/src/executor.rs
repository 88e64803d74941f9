use std::{future::Future, sync::Arc};

use appdx_common::types::ControllerConfig;
use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{info, warn};

pub const MIN_CONCURRENCY: usize = 1;
pub const MAX_CONCURRENCY: usize = 100;
pub const ON_PREMISE_CONCURRENCY: usize = 10;
pub const SAAS_CONCURRENCY: usize = 50;

/// Process-wide limit on outstanding controller calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConcurrencyCap(usize);

impl ConcurrencyCap {
    /// Clamps `requested` to `[MIN_CONCURRENCY, MAX_CONCURRENCY]`.
    pub fn new(requested: usize) -> Self {
        let effective = requested.clamp(MIN_CONCURRENCY, MAX_CONCURRENCY);
        if effective != requested {
            warn!(
                requested,
                effective, "concurrent connections out of range, adjusted"
            );
        }
        Self(effective)
    }

    /// A single self-hosted controller makes the whole process use the
    /// conservative default.
    pub fn default_for(controllers: &[ControllerConfig]) -> Self {
        if controllers.iter().any(|controller| !controller.is_saas()) {
            info!(
                recommended = ON_PREMISE_CONCURRENCY,
                "on-premise controller detected"
            );
            Self(ON_PREMISE_CONCURRENCY)
        } else {
            info!(recommended = SAAS_CONCURRENCY, "saas controllers detected");
            Self(SAAS_CONCURRENCY)
        }
    }

    pub fn resolve(requested: Option<usize>, controllers: &[ControllerConfig]) -> Self {
        let default = Self::default_for(controllers);
        match requested {
            Some(requested) => Self::new(requested),
            None => default,
        }
    }

    pub fn get(self) -> usize {
        self.0
    }
}

/// Runs batches of operations with at most `cap` of them in flight.
///
/// One executor is shared by every batch of every cycle, so the cap bounds
/// the process rather than a single batch.
#[derive(Debug, Clone)]
pub struct BoundedExecutor {
    permits: Arc<Semaphore>,
}

impl BoundedExecutor {
    pub fn new(cap: ConcurrencyCap) -> Self {
        Self {
            permits: Arc::new(Semaphore::new(cap.get())),
        }
    }

    /// Drives every operation to completion and returns the outputs in input
    /// order. Operations are expected to report failure through their output.
    pub async fn run_all<I, F, T>(&self, operations: I) -> Vec<T>
    where
        I: IntoIterator<Item = F>,
        F: Future<Output = T>,
    {
        let permits = &self.permits;
        join_all(operations.into_iter().map(|operation| async move {
            // The semaphore is never closed, so acquire only fails after shutdown.
            let _permit = permits.acquire().await.ok();
            operation.await
        }))
        .await
    }
}
