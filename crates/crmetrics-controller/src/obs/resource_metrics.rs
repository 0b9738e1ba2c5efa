//! Per-resource metric families and their fixed label structs.
//!
//! Metric names and label schemas are a contract with external dashboards.

use std::sync::Arc;

use crmetrics_core::error::{CrMetricsError, Result};
use crmetrics_core::{ResourceIdentity, ResourceSnapshot};

use crate::obs::metrics::{LabelSet, MetricDescriptor, MetricKind, Operation};
use crate::obs::registry::MetricRegistry;

pub const RESOURCE_INFO: &str = "custom_resource_info";
pub const SIZE_INFO: &str = "size_info";
pub const SIZING_ACTIONS: &str = "sizing_actions_total";
pub const SIZE_DRIFT: &str = "size_drift";
pub const LAST_SIZING: &str = "last_sizing_timestamp_seconds";
pub const RECONCILE_TOTAL: &str = "controller_reconcile_total";
pub const RECONCILE_ERRORS: &str = "controller_reconcile_errors_total";

/// Metrics keyed by `{namespace, name}`.
const PER_RESOURCE: [&str; 4] = [SIZE_INFO, SIZING_ACTIONS, SIZE_DRIFT, LAST_SIZING];

/// Every metric this controller exposes.
pub fn descriptors() -> Vec<MetricDescriptor> {
    vec![
        MetricDescriptor::new(
            RESOURCE_INFO,
            "Information about the custom resource.",
            MetricKind::Gauge,
            &["namespace", "name", "group", "kind"],
        ),
        MetricDescriptor::new(
            SIZE_INFO,
            "Desired size of the custom resource.",
            MetricKind::Gauge,
            &["namespace", "name"],
        ),
        MetricDescriptor::new(
            SIZING_ACTIONS,
            "Corrective writes to the owned workload (created or resized).",
            MetricKind::Counter,
            &["namespace", "name"],
        ),
        MetricDescriptor::new(
            SIZE_DRIFT,
            "Absolute difference between desired and actual replicas at correction time.",
            MetricKind::Summary,
            &["namespace", "name"],
        ),
        MetricDescriptor::new(
            LAST_SIZING,
            "Unix time of the last corrective write to the owned workload.",
            MetricKind::Gauge,
            &["namespace", "name"],
        ),
        MetricDescriptor::new(
            RECONCILE_TOTAL,
            "Reconciliation passes by result.",
            MetricKind::Counter,
            &["result"],
        ),
        MetricDescriptor::new(
            RECONCILE_ERRORS,
            "Failed reconciliation passes by error class.",
            MetricKind::Counter,
            &["class"],
        ),
    ]
}

/// Registry with every descriptor from `descriptors` registered.
pub fn build_registry() -> Result<MetricRegistry> {
    let mut registry = MetricRegistry::new();
    for desc in descriptors() {
        registry.register(desc)?;
    }
    Ok(registry)
}

pub struct IdentityLabels<'a> {
    pub namespace: &'a str,
    pub name: &'a str,
    pub group: &'a str,
    pub kind: &'a str,
}

impl LabelSet for IdentityLabels<'_> {
    fn label_pairs(&self) -> Vec<(String, String)> {
        vec![
            ("namespace".into(), self.namespace.into()),
            ("name".into(), self.name.into()),
            ("group".into(), self.group.into()),
            ("kind".into(), self.kind.into()),
        ]
    }
}

pub struct ResourceLabels<'a> {
    pub namespace: &'a str,
    pub name: &'a str,
}

impl<'a> ResourceLabels<'a> {
    pub fn of(id: &'a ResourceIdentity) -> Self {
        Self {
            namespace: &id.namespace,
            name: &id.name,
        }
    }
}

impl LabelSet for ResourceLabels<'_> {
    fn label_pairs(&self) -> Vec<(String, String)> {
        vec![
            ("namespace".into(), self.namespace.into()),
            ("name".into(), self.name.into()),
        ]
    }
}

/// `result` label of `controller_reconcile_total`.
pub struct OutcomeLabels {
    pub result: &'static str,
}

impl LabelSet for OutcomeLabels {
    fn label_pairs(&self) -> Vec<(String, String)> {
        vec![("result".into(), self.result.into())]
    }
}

/// `class` label of `controller_reconcile_errors_total`.
pub struct ErrorClassLabels {
    pub class: &'static str,
}

impl LabelSet for ErrorClassLabels {
    fn label_pairs(&self) -> Vec<(String, String)> {
        vec![("class".into(), self.class.into())]
    }
}

/// Typed facade over the registry used by both reconciliation paths.
#[derive(Clone)]
pub struct ResourceMetrics {
    registry: Arc<MetricRegistry>,
}

impl ResourceMetrics {
    pub fn new(registry: Arc<MetricRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<MetricRegistry> {
        &self.registry
    }

    /// Presence and size series for a live resource. Idempotent.
    pub fn refresh(&self, snap: &ResourceSnapshot) -> Result<()> {
        let id = &snap.identity;
        let info = IdentityLabels {
            namespace: &id.namespace,
            name: &id.name,
            group: snap.type_meta.group(),
            kind: &snap.type_meta.kind,
        };
        self.registry.upsert(RESOURCE_INFO, &info, Operation::SetPresence)?;
        self.registry.upsert(
            SIZE_INFO,
            &ResourceLabels::of(id),
            Operation::Set(f64::from(snap.spec.size)),
        )
    }

    /// Fails if any sizing series for `id` would be rejected. Run before the
    /// corrective write so a committed write is always recordable.
    pub fn check_sizing(&self, id: &ResourceIdentity) -> Result<()> {
        let labels = ResourceLabels::of(id);
        self.registry.check(SIZING_ACTIONS, &labels, Operation::Increment)?;
        self.registry.check(SIZE_DRIFT, &labels, Operation::Observe(0.0))?;
        self.registry
            .check(LAST_SIZING, &labels, Operation::SetToCurrentTime)
    }

    pub fn record_created(&self, id: &ResourceIdentity) -> Result<()> {
        self.registry
            .upsert(SIZING_ACTIONS, &ResourceLabels::of(id), Operation::Increment)
    }

    pub fn record_resized(&self, id: &ResourceIdentity, drift: u32) -> Result<()> {
        let labels = ResourceLabels::of(id);
        self.registry.upsert(SIZING_ACTIONS, &labels, Operation::Increment)?;
        self.registry
            .upsert(SIZE_DRIFT, &labels, Operation::Observe(f64::from(drift)))?;
        self.registry
            .upsert(LAST_SIZING, &labels, Operation::SetToCurrentTime)
    }

    /// Remove every series describing `id`. Safe to repeat; returns how many
    /// series were actually removed.
    pub fn purge(&self, id: &ResourceIdentity) -> Result<usize> {
        let mut removed = self.registry.remove_matching(
            RESOURCE_INFO,
            &[("namespace", id.namespace.as_str()), ("name", id.name.as_str())],
        )?;
        let labels = ResourceLabels::of(id);
        for name in PER_RESOURCE {
            if self.registry.remove(name, &labels)? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    /// Controller-level outcome of one pass.
    pub fn record_outcome(&self, err: Option<&CrMetricsError>) -> Result<()> {
        match err {
            None => self.registry.upsert(
                RECONCILE_TOTAL,
                &OutcomeLabels { result: "success" },
                Operation::Increment,
            ),
            Some(e) => {
                self.registry.upsert(
                    RECONCILE_TOTAL,
                    &OutcomeLabels { result: "error" },
                    Operation::Increment,
                )?;
                self.registry.upsert(
                    RECONCILE_ERRORS,
                    &ErrorClassLabels {
                        class: e.class().as_str(),
                    },
                    Operation::Increment,
                )
            }
        }
    }
}
