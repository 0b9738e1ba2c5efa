//! Cluster API seam.
//!
//! The controller only talks to the cluster through `ClusterClient`; watch
//! notifications arrive as `ResourceEvent`s on a broadcast channel.

mod memory;

use std::sync::Arc;

use async_trait::async_trait;

use crmetrics_core::error::Result;
use crmetrics_core::{ResourceIdentity, ResourceSnapshot, Workload, WorkloadSpec};

pub use memory::{ClusterOp, MemoryCluster};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Created or modified (including deletion requested).
    Applied,
    /// Physically removed.
    Deleted,
}

/// "Something changed" notification for one identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceEvent {
    pub identity: ResourceIdentity,
    pub kind: EventKind,
}

/// Decides whether an event is delivered to the work queue.
pub type EventPredicate = Arc<dyn Fn(&ResourceEvent) -> bool + Send + Sync>;

/// Reads and writes against the backing store.
///
/// `get`/`get_owned` report absence as `CrMetricsError::NotFound`; writes with
/// a stale `resource_version` fail with `CrMetricsError::Conflict`.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn get(&self, id: &ResourceIdentity) -> Result<ResourceSnapshot>;

    /// Persist metadata and spec. Returns the stored snapshot; when the last
    /// finalizer of a terminating resource is removed the object is gone
    /// afterwards.
    async fn update(&self, snapshot: &ResourceSnapshot) -> Result<ResourceSnapshot>;

    async fn get_owned(&self, id: &ResourceIdentity) -> Result<Workload>;

    async fn create_owned(&self, spec: &WorkloadSpec) -> Result<Workload>;

    async fn update_owned(&self, workload: &Workload) -> Result<Workload>;

    async fn list(&self) -> Result<Vec<ResourceIdentity>>;
}
