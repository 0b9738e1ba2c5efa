//! Shared application state: configuration plus the metric registry every
//! component receives by reference.

use std::sync::Arc;

use crmetrics_core::error::Result;

use crate::config::ControllerConfig;
use crate::obs::{resource_metrics, MetricRegistry, ResourceMetrics};

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    cfg: ControllerConfig,
    metrics: ResourceMetrics,
}

impl AppState {
    /// Registers every metric; a mis-registration is a start-up error.
    pub fn new(cfg: ControllerConfig) -> Result<Self> {
        let registry = Arc::new(resource_metrics::build_registry()?);
        Ok(Self::with_registry(cfg, registry))
    }

    pub fn with_registry(cfg: ControllerConfig, registry: Arc<MetricRegistry>) -> Self {
        Self {
            inner: Arc::new(AppStateInner {
                cfg,
                metrics: ResourceMetrics::new(registry),
            }),
        }
    }

    pub fn cfg(&self) -> &ControllerConfig {
        &self.inner.cfg
    }

    pub fn registry(&self) -> &Arc<MetricRegistry> {
        self.inner.metrics.registry()
    }

    pub fn metrics(&self) -> ResourceMetrics {
        self.inner.metrics.clone()
    }
}
