//! Reconciliation pass for one resource identity: the lifecycle synchronizer
//! first, then the owned-workload sync while the resource is live.

mod lifecycle;
mod workload;

use std::sync::Arc;

use crmetrics_core::error::Result;
use crmetrics_core::ResourceIdentity;

use crate::cluster::ClusterClient;
use crate::obs::ResourceMetrics;

pub use lifecycle::{LifecycleState, LifecycleSynchronizer, SyncOutcome};
pub use workload::{SizingAction, WorkloadSync};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub observed: LifecycleState,
    /// None when the workload sync did not run (resource absent or terminating).
    pub sizing: Option<SizingAction>,
}

pub struct Reconciler {
    lifecycle: LifecycleSynchronizer,
    workload: WorkloadSync,
}

impl Reconciler {
    pub fn new(client: Arc<dyn ClusterClient>, metrics: ResourceMetrics) -> Self {
        Self {
            lifecycle: LifecycleSynchronizer::new(Arc::clone(&client), metrics.clone()),
            workload: WorkloadSync::new(client, metrics),
        }
    }

    /// Re-derive the full desired state from a fresh snapshot. Safe to run
    /// any number of times for the same observed state.
    pub async fn reconcile(&self, id: &ResourceIdentity) -> Result<ReconcileReport> {
        let outcome = self.lifecycle.sync(id).await?;
        let sizing = match &outcome.live {
            Some(snapshot) => Some(self.workload.sync(snapshot).await?),
            None => None,
        };
        Ok(ReconcileReport {
            observed: outcome.observed,
            sizing,
        })
    }
}
