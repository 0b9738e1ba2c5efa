//! Owned-workload sync: keep the workload's replica count at `spec.size`.
//!
//! The sizing counter measures corrective writes, not passes: nothing is
//! recorded while actual already equals desired, and metrics are only touched
//! after the write succeeded. The sizing label sets are validated before the
//! write, so a successful write is never left unrecorded.

use std::sync::Arc;

use crmetrics_core::error::Result;
use crmetrics_core::{ResourceSnapshot, WorkloadSpec};

use crate::cluster::ClusterClient;
use crate::obs::ResourceMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizingAction {
    InSync,
    Created { replicas: u32 },
    Resized { from: u32, to: u32 },
}

pub struct WorkloadSync {
    client: Arc<dyn ClusterClient>,
    metrics: ResourceMetrics,
}

impl WorkloadSync {
    pub fn new(client: Arc<dyn ClusterClient>, metrics: ResourceMetrics) -> Self {
        Self { client, metrics }
    }

    /// `snapshot` must be live and carry the finalizer token.
    pub async fn sync(&self, snapshot: &ResourceSnapshot) -> Result<SizingAction> {
        let id = &snapshot.identity;
        let desired = snapshot.spec.size;

        let mut workload = match self.client.get_owned(id).await {
            Ok(w) => w,
            Err(e) if e.is_not_found() => {
                let spec = WorkloadSpec {
                    identity: id.clone(),
                    replicas: desired,
                    owner: id.clone(),
                };
                self.metrics.check_sizing(id)?;
                self.client.create_owned(&spec).await?;
                self.metrics.record_created(id)?;
                tracing::info!(resource = %id, replicas = desired, "owned workload created");
                return Ok(SizingAction::Created { replicas: desired });
            }
            Err(e) => return Err(e),
        };

        let actual = workload.replicas;
        if actual == desired {
            return Ok(SizingAction::InSync);
        }

        self.metrics.check_sizing(id)?;
        workload.replicas = desired;
        self.client.update_owned(&workload).await?;
        self.metrics.record_resized(id, actual.abs_diff(desired))?;
        tracing::info!(resource = %id, from = actual, to = desired, "owned workload resized");
        Ok(SizingAction::Resized {
            from: actual,
            to: desired,
        })
    }
}
