//! Resource lifecycle synchronizer.
//!
//! The finalizer token and the metric series are the only durable state; the
//! lifecycle state is re-derived from a fresh snapshot on every pass.
//!
//! | state           | snapshot                         | action                                   |
//! |-----------------|----------------------------------|------------------------------------------|
//! | Absent          | not found                        | none                                     |
//! | LiveNoFinalizer | token absent, not deleting       | add token, persist, publish series       |
//! | LiveFinalized   | token present, not deleting      | refresh series                           |
//! | Terminating     | token present, deleting          | remove series, then remove token, persist |
//! | Released        | token absent, deleting           | none                                     |

use std::sync::Arc;

use crmetrics_core::error::Result;
use crmetrics_core::{ResourceIdentity, ResourceSnapshot, FINALIZER};

use crate::cluster::ClusterClient;
use crate::obs::ResourceMetrics;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleState {
    Absent,
    LiveNoFinalizer,
    LiveFinalized,
    Terminating,
    /// Deleting, our token already gone; other finalizers hold the object.
    Released,
}

impl LifecycleState {
    pub fn observe(snapshot: Option<&ResourceSnapshot>) -> Self {
        let Some(snap) = snapshot else {
            return LifecycleState::Absent;
        };
        match (snap.has_finalizer(FINALIZER), snap.deletion_requested) {
            (false, false) => LifecycleState::LiveNoFinalizer,
            (true, false) => LifecycleState::LiveFinalized,
            (true, true) => LifecycleState::Terminating,
            (false, true) => LifecycleState::Released,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            LifecycleState::Absent => "absent",
            LifecycleState::LiveNoFinalizer => "live_no_finalizer",
            LifecycleState::LiveFinalized => "live_finalized",
            LifecycleState::Terminating => "terminating",
            LifecycleState::Released => "released",
        }
    }
}

/// Result of one lifecycle step.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    /// State observed at the start of the pass.
    pub observed: LifecycleState,
    /// Persisted snapshot when the resource is live and carries the token.
    pub live: Option<ResourceSnapshot>,
}

pub struct LifecycleSynchronizer {
    client: Arc<dyn ClusterClient>,
    metrics: ResourceMetrics,
}

impl LifecycleSynchronizer {
    pub fn new(client: Arc<dyn ClusterClient>, metrics: ResourceMetrics) -> Self {
        Self { client, metrics }
    }

    pub async fn sync(&self, id: &ResourceIdentity) -> Result<SyncOutcome> {
        let snapshot = match self.client.get(id).await {
            Ok(s) => Some(s),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e),
        };
        let observed = LifecycleState::observe(snapshot.as_ref());
        let outcome = |live: Option<ResourceSnapshot>| SyncOutcome { observed, live };

        let Some(mut snap) = snapshot else {
            tracing::debug!(resource = %id, "resource not found; nothing to do");
            return Ok(outcome(None));
        };

        match observed {
            LifecycleState::LiveNoFinalizer => {
                snap.add_finalizer(FINALIZER);
                let persisted = self.client.update(&snap).await?;
                self.metrics.refresh(&persisted)?;
                tracing::info!(resource = %id, size = persisted.spec.size, "finalizer added; series published");
                Ok(outcome(Some(persisted)))
            }
            LifecycleState::LiveFinalized => {
                self.metrics.refresh(&snap)?;
                tracing::debug!(resource = %id, "series refreshed");
                Ok(outcome(Some(snap)))
            }
            LifecycleState::Terminating => {
                // series first, even if a previous pass already removed them
                let removed = self.metrics.purge(id)?;
                snap.remove_finalizer(FINALIZER);
                self.client.update(&snap).await?;
                tracing::info!(resource = %id, removed, "series removed; finalizer released");
                Ok(outcome(None))
            }
            LifecycleState::Released | LifecycleState::Absent => {
                tracing::debug!(resource = %id, state = observed.as_str(), "not ours to clean up");
                Ok(outcome(None))
            }
        }
    }
}
