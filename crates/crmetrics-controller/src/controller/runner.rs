//! Controller runtime: event pump + fixed-size worker pool.
//!
//! Watch events pass the registry predicate and land in the work queue;
//! `max_concurrent_reconciles` workers drain it. Every pass runs under the
//! configured deadline and failed passes are re-queued with backoff.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;
use tracing::Instrument;

use crmetrics_core::error::{CrMetricsError, Result};
use crmetrics_core::ResourceIdentity;

use crate::cluster::{ClusterClient, EventKind, EventPredicate, ResourceEvent};
use crate::config::ControllerSection;
use crate::controller::queue::WorkQueue;
use crate::obs::ResourceMetrics;
use crate::reconcile::Reconciler;

pub struct Controller {
    reconciler: Arc<Reconciler>,
    client: Arc<dyn ClusterClient>,
    metrics: ResourceMetrics,
    predicate: EventPredicate,
    queue: Arc<WorkQueue>,
    cfg: ControllerSection,
}

impl Controller {
    pub fn new(
        client: Arc<dyn ClusterClient>,
        metrics: ResourceMetrics,
        predicate: EventPredicate,
        cfg: ControllerSection,
    ) -> Self {
        let reconciler = Arc::new(Reconciler::new(Arc::clone(&client), metrics.clone()));
        let queue = Arc::new(WorkQueue::new(cfg.retry_base_delay(), cfg.retry_max_delay()));
        Self {
            reconciler,
            client,
            metrics,
            predicate,
            queue,
            cfg,
        }
    }

    /// Run until `shutdown` flips to true or the event stream closes.
    pub async fn run(
        self,
        mut events: broadcast::Receiver<ResourceEvent>,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<()> {
        let workers: Vec<_> = (0..self.cfg.max_concurrent_reconciles)
            .map(|n| {
                let worker = Worker {
                    reconciler: Arc::clone(&self.reconciler),
                    queue: Arc::clone(&self.queue),
                    metrics: self.metrics.clone(),
                    timeout: self.cfg.reconcile_timeout(),
                };
                tokio::spawn(worker.run().instrument(tracing::info_span!("worker", n)))
            })
            .collect();
        tracing::info!(workers = workers.len(), "controller started");

        self.enqueue_all().await;

        let resync_every = self.cfg.resync_interval();
        let mut resync = tokio::time::interval(resync_every.unwrap_or(Duration::from_secs(3600)));
        resync.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // first tick fires immediately; the initial list already ran
        resync.tick().await;

        loop {
            if *shutdown.borrow() {
                break;
            }
            tokio::select! {
                ev = events.recv() => match ev {
                    Ok(ev) => self.admit(ev),
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "event stream lagged; relisting");
                        self.enqueue_all().await;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        tracing::info!("event stream closed");
                        break;
                    }
                },

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }

                _ = resync.tick(), if resync_every.is_some() => {
                    tracing::debug!("periodic resync");
                    self.enqueue_all().await;
                }
            }
        }

        self.queue.shut_down();
        for result in futures_util::future::join_all(workers).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "worker task failed");
            }
        }
        tracing::info!("controller stopped");
        Ok(())
    }

    fn admit(&self, ev: ResourceEvent) {
        if (self.predicate)(&ev) {
            self.queue.add(ev.identity);
        }
    }

    /// List every resource and offer it to the queue as if it had changed.
    async fn enqueue_all(&self) {
        match self.client.list().await {
            Ok(ids) => {
                for identity in ids {
                    self.admit(ResourceEvent {
                        identity,
                        kind: EventKind::Applied,
                    });
                }
            }
            Err(e) => tracing::warn!(error = %e, "list failed; waiting for events"),
        }
    }
}

struct Worker {
    reconciler: Arc<Reconciler>,
    queue: Arc<WorkQueue>,
    metrics: ResourceMetrics,
    timeout: Duration,
}

impl Worker {
    async fn run(self) {
        while let Some(id) = self.queue.get().await {
            self.process(&id)
                .instrument(tracing::info_span!("reconcile", resource = %id))
                .await;
            self.queue.done(&id);
        }
    }

    async fn process(&self, id: &ResourceIdentity) {
        let result = match tokio::time::timeout(self.timeout, self.reconciler.reconcile(id)).await {
            Ok(r) => r,
            Err(_) => Err(CrMetricsError::Timeout(self.timeout.as_millis() as u64)),
        };

        if let Err(e) = self.metrics.record_outcome(result.as_ref().err()) {
            tracing::error!(error = %e, "recording reconcile outcome failed");
        }

        match result {
            Ok(report) => {
                self.queue.forget(id);
                tracing::debug!(state = report.observed.as_str(), sizing = ?report.sizing, "reconciled");
            }
            Err(e) if e.is_retryable() => {
                let delay = self.queue.add_rate_limited(id.clone());
                tracing::warn!(error = %e, class = e.class().as_str(), retry_in_ms = delay.as_millis() as u64, "reconcile failed; retrying");
            }
            Err(e) => {
                self.queue.forget(id);
                tracing::error!(error = %e, "reconcile failed permanently");
            }
        }
    }
}
