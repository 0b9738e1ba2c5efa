//! Shared harness for controller integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use crmetrics_controller::cluster::{ClusterClient, MemoryCluster};
use crmetrics_controller::obs::{
    resource_metrics, MetricDescriptor, MetricRegistry, MetricsSnapshot, ResourceMetrics, SeriesValue,
};
use crmetrics_controller::reconcile::{ReconcileReport, Reconciler};
use crmetrics_core::ResourceIdentity;

pub fn id(name: &str) -> ResourceIdentity {
    ResourceIdentity::new("default", name)
}

pub fn new_metrics() -> ResourceMetrics {
    ResourceMetrics::new(Arc::new(resource_metrics::build_registry().expect("registry")))
}

/// Registry where `metric` is registered with `labels` instead of its own schema.
pub fn metrics_with_schema(metric: &str, labels: &[&str]) -> ResourceMetrics {
    let mut registry = MetricRegistry::new();
    for desc in resource_metrics::descriptors() {
        let desc = if desc.name == metric {
            MetricDescriptor::new(&desc.name, &desc.help, desc.kind, labels)
        } else {
            desc
        };
        registry.register(desc).expect("register");
    }
    ResourceMetrics::new(Arc::new(registry))
}

/// In-memory cluster + fresh registry + reconciler wired together.
pub struct Harness {
    pub cluster: Arc<MemoryCluster>,
    pub metrics: ResourceMetrics,
    pub reconciler: Reconciler,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_cluster(MemoryCluster::new())
    }

    pub fn with_cluster(cluster: MemoryCluster) -> Self {
        Self::with_parts(cluster, new_metrics())
    }

    pub fn with_parts(cluster: MemoryCluster, metrics: ResourceMetrics) -> Self {
        let cluster = Arc::new(cluster);
        let client: Arc<dyn ClusterClient> = cluster.clone();
        let reconciler = Reconciler::new(client, metrics.clone());
        Self {
            cluster,
            metrics,
            reconciler,
        }
    }

    pub fn gather(&self) -> MetricsSnapshot {
        self.metrics.registry().gather()
    }

    pub fn series_of(&self, id: &ResourceIdentity) -> usize {
        series_count(&self.gather(), id)
    }

    pub fn value(&self, metric: &str, id: &ResourceIdentity) -> Option<SeriesValue> {
        value_of(&self.gather(), metric, id)
    }

    pub async fn reconcile(&self, id: &ResourceIdentity) -> ReconcileReport {
        self.reconciler.reconcile(id).await.expect("reconcile pass failed")
    }
}

pub fn series_count(snapshot: &MetricsSnapshot, id: &ResourceIdentity) -> usize {
    snapshot
        .series_matching(&[("namespace", id.namespace.as_str()), ("name", id.name.as_str())])
        .len()
}

pub fn value_of(snapshot: &MetricsSnapshot, metric: &str, id: &ResourceIdentity) -> Option<SeriesValue> {
    snapshot
        .series_matching(&[("namespace", id.namespace.as_str()), ("name", id.name.as_str())])
        .into_iter()
        .find(|(name, _)| *name == metric)
        .map(|(_, s)| s.value)
}

/// Poll `cond` every 10ms for up to 5s.
pub async fn wait_until<F: Fn() -> bool>(what: &str, cond: F) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        if tokio::time::Instant::now() >= deadline {
            panic!("timed out waiting for: {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
