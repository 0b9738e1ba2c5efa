//! Metric registry: owns every metric vector, gathers snapshots for the
//! exposition endpoint, and gates event delivery on readiness.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crmetrics_core::error::{CrMetricsError, Result};

use crate::cluster::{EventPredicate, ResourceEvent};
use crate::obs::metrics::{LabelSet, MetricDescriptor, MetricKind, MetricVec, Operation, Sample};

/// Registered metrics. Registration happens once at start-up through
/// `&mut self`; afterwards the registry is shared behind an `Arc` and only
/// the per-metric maps are mutated.
#[derive(Default)]
pub struct MetricRegistry {
    vecs: HashMap<String, MetricVec>,
    ready: Arc<AtomicBool>,
}

impl MetricRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails on duplicate names or an invalid schema.
    pub fn register(&mut self, desc: MetricDescriptor) -> Result<()> {
        desc.validate()?;
        if self.vecs.contains_key(&desc.name) {
            return Err(CrMetricsError::Registration(format!(
                "duplicate metric name: {}",
                desc.name
            )));
        }
        self.vecs.insert(desc.name.clone(), MetricVec::new(desc));
        Ok(())
    }

    pub fn vec(&self, name: &str) -> Result<&MetricVec> {
        self.vecs
            .get(name)
            .ok_or_else(|| CrMetricsError::schema(name, "metric not registered"))
    }

    pub fn upsert<L: LabelSet + ?Sized>(&self, name: &str, labels: &L, op: Operation) -> Result<()> {
        self.vec(name)?.upsert(labels, op)
    }

    /// Validate an upsert against the registered schema without applying it.
    pub fn check<L: LabelSet + ?Sized>(&self, name: &str, labels: &L, op: Operation) -> Result<()> {
        self.vec(name)?.check(labels, op)
    }

    pub fn remove<L: LabelSet + ?Sized>(&self, name: &str, labels: &L) -> Result<bool> {
        self.vec(name)?.remove(labels)
    }

    pub fn remove_matching(&self, name: &str, partial: &[(&str, &str)]) -> Result<usize> {
        self.vec(name)?.remove_matching(partial)
    }

    /// Immutable copy of every series, families sorted by name.
    pub fn gather(&self) -> MetricsSnapshot {
        let mut families: Vec<MetricFamily> = self
            .vecs
            .values()
            .map(|v| {
                let d = v.descriptor();
                MetricFamily {
                    name: d.name.clone(),
                    help: d.help.clone(),
                    kind: d.kind,
                    samples: v.samples(),
                }
            })
            .collect();
        families.sort_by(|a, b| a.name.cmp(&b.name));
        MetricsSnapshot { families }
    }

    /// Open the event gate.
    pub fn mark_ready(&self) {
        self.ready.store(true, Ordering::Release);
    }

    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Gate consulted by the watch layer before an event reaches the queue.
    /// Events are dropped until the registry has been marked ready.
    pub fn predicate(&self) -> EventPredicate {
        let ready = Arc::clone(&self.ready);
        Arc::new(move |ev: &ResourceEvent| {
            let admitted = ready.load(Ordering::Acquire);
            if !admitted {
                tracing::debug!(resource = %ev.identity, kind = ?ev.kind, "event dropped: registry not ready");
            }
            admitted
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricFamily {
    pub name: String,
    pub help: String,
    pub kind: MetricKind,
    pub samples: Vec<Sample>,
}

/// Result of `MetricRegistry::gather`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub families: Vec<MetricFamily>,
}

impl MetricsSnapshot {
    pub fn family(&self, name: &str) -> Option<&MetricFamily> {
        self.families.iter().find(|f| f.name == name)
    }

    /// Every `(metric name, sample)` whose labels contain all of `partial`.
    pub fn series_matching(&self, partial: &[(&str, &str)]) -> Vec<(&str, &Sample)> {
        self.families
            .iter()
            .flat_map(|f| f.samples.iter().map(move |s| (f.name.as_str(), s)))
            .filter(|(_, s)| partial.iter().all(|(k, v)| s.label(k) == Some(*v)))
            .collect()
    }
}
