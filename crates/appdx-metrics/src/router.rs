use std::sync::Arc;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::{handlers, registry::MetricsRegistry};

pub struct MetricsState {
    pub registry: Arc<MetricsRegistry>,
}

impl MetricsState {
    pub fn new(registry: Arc<MetricsRegistry>) -> Self {
        Self { registry }
    }
}

pub fn metrics_router(state: Arc<MetricsState>) -> Router {
    Router::new()
        .route("/metrics", get(handlers::prometheus_metrics))
        .route("/health/live", get(handlers::health_live))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
