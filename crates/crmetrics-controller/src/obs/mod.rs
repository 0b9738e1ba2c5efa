//! In-process metrics: the metric vector set, its registry, the per-resource
//! metric families, and Prometheus text rendering for `/metrics`.

pub mod exposition;
pub mod metrics;
pub mod registry;
pub mod resource_metrics;

pub use metrics::{LabelSet, MetricDescriptor, MetricKind, MetricVec, Operation, Sample, SeriesValue};
pub use registry::{MetricFamily, MetricRegistry, MetricsSnapshot};
pub use resource_metrics::ResourceMetrics;
