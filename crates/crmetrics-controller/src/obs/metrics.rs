//! Metric vector set.
//!
//! Each metric owns one `DashMap` from a label key to its current value.
//! Labels are flattened into sorted key vectors to keep deterministic ordering.
//! An upsert holds the write lock of a single shard for the whole
//! read-modify-write, so a concurrent gather never observes half of an
//! operation, while unrelated metrics and shards never contend.

use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use dashmap::DashMap;

use crmetrics_core::error::{CrMetricsError, Result};

/// Sorted `(label, value)` pairs; identifies a series within its metric.
pub type LabelKey = Vec<(String, String)>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Counter,
    Gauge,
    Summary,
}

impl MetricKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MetricKind::Counter => "counter",
            MetricKind::Gauge => "gauge",
            MetricKind::Summary => "summary",
        }
    }
}

/// Mutation applied to a single series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Operation {
    /// Gauge to 1.
    SetPresence,
    /// Gauge to an arbitrary value.
    Set(f64),
    /// Gauge to the current unix time in seconds.
    SetToCurrentTime,
    /// Counter or gauge plus one.
    Increment,
    /// One summary observation.
    Observe(f64),
}

/// Current value of one series.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeriesValue {
    Counter(f64),
    Gauge(f64),
    Summary { sum: f64, count: u64 },
}

impl SeriesValue {
    fn zero(kind: MetricKind) -> Self {
        match kind {
            MetricKind::Counter => SeriesValue::Counter(0.0),
            MetricKind::Gauge => SeriesValue::Gauge(0.0),
            MetricKind::Summary => SeriesValue::Summary { sum: 0.0, count: 0 },
        }
    }

    fn apply(&mut self, op: Operation, now: f64) {
        match (self, op) {
            (SeriesValue::Gauge(v), Operation::SetPresence) => *v = 1.0,
            (SeriesValue::Gauge(v), Operation::Set(x)) => *v = x,
            (SeriesValue::Gauge(v), Operation::SetToCurrentTime) => *v = now,
            (SeriesValue::Gauge(v), Operation::Increment) => *v += 1.0,
            (SeriesValue::Counter(v), Operation::Increment) => *v += 1.0,
            (SeriesValue::Summary { sum, count }, Operation::Observe(x)) => {
                *sum += x;
                *count += 1;
            }
            // rejected by `check_operation` before a series is touched
            (SeriesValue::Gauge(_), Operation::Observe(_))
            | (
                SeriesValue::Counter(_),
                Operation::SetPresence
                | Operation::Set(_)
                | Operation::SetToCurrentTime
                | Operation::Observe(_),
            )
            | (
                SeriesValue::Summary { .. },
                Operation::SetPresence
                | Operation::Set(_)
                | Operation::SetToCurrentTime
                | Operation::Increment,
            ) => {}
        }
    }
}

/// Source of label pairs for an upsert or removal.
///
/// Metrics use small fixed structs (see `obs::resource_metrics`); a
/// `BTreeMap` is accepted for dynamic callers.
pub trait LabelSet {
    fn label_pairs(&self) -> Vec<(String, String)>;
}

impl LabelSet for BTreeMap<String, String> {
    fn label_pairs(&self) -> Vec<(String, String)> {
        self.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

impl LabelSet for [(&str, &str)] {
    fn label_pairs(&self) -> Vec<(String, String)> {
        self.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

/// Name, help, kind, and declared label schema of a metric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDescriptor {
    pub name: String,
    pub help: String,
    pub kind: MetricKind,
    pub labels: Vec<String>,
}

impl MetricDescriptor {
    pub fn new(name: &str, help: &str, kind: MetricKind, labels: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            help: help.to_string(),
            kind,
            labels: labels.iter().map(|l| l.to_string()).collect(),
        }
    }

    /// Registration-time checks on the metric and label names.
    pub fn validate(&self) -> Result<()> {
        if !is_valid_metric_name(&self.name) {
            return Err(CrMetricsError::Registration(format!(
                "invalid metric name: {:?}",
                self.name
            )));
        }
        let mut seen = std::collections::HashSet::new();
        for label in &self.labels {
            if !is_valid_label_name(label) || label.starts_with("__") {
                return Err(CrMetricsError::Registration(format!(
                    "{}: invalid label name {:?}",
                    self.name, label
                )));
            }
            if !seen.insert(label.as_str()) {
                return Err(CrMetricsError::Registration(format!(
                    "{}: duplicate label {:?}",
                    self.name, label
                )));
            }
        }
        if self.kind == MetricKind::Summary && seen.contains("quantile") {
            return Err(CrMetricsError::Registration(format!(
                "{}: summaries reserve the quantile label",
                self.name
            )));
        }
        Ok(())
    }
}

fn is_valid_metric_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == ':' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == ':')
}

fn is_valid_label_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn unix_now() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

/// One labeled series as seen by `gather`.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub labels: LabelKey,
    pub value: SeriesValue,
}

impl Sample {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// All series of one registered metric.
pub struct MetricVec {
    desc: MetricDescriptor,
    series: DashMap<LabelKey, SeriesValue>,
}

impl MetricVec {
    pub(crate) fn new(desc: MetricDescriptor) -> Self {
        Self {
            desc,
            series: DashMap::new(),
        }
    }

    pub fn descriptor(&self) -> &MetricDescriptor {
        &self.desc
    }

    /// Create the series on first use and apply `op` to it.
    pub fn upsert<L: LabelSet + ?Sized>(&self, labels: &L, op: Operation) -> Result<()> {
        self.check_operation(op)?;
        let key = self.key_for(labels)?;
        let now = if op == Operation::SetToCurrentTime { unix_now() } else { 0.0 };

        let kind = self.desc.kind;
        let mut series = self
            .series
            .entry(key)
            .or_insert_with(|| SeriesValue::zero(kind));
        series.apply(op, now);
        Ok(())
    }

    /// Validate an upsert without applying it.
    pub fn check<L: LabelSet + ?Sized>(&self, labels: &L, op: Operation) -> Result<()> {
        self.check_operation(op)?;
        self.key_for(labels).map(|_| ())
    }

    /// Delete the series if present. Returns whether one was removed.
    pub fn remove<L: LabelSet + ?Sized>(&self, labels: &L) -> Result<bool> {
        let key = self.key_for(labels)?;
        Ok(self.series.remove(&key).is_some())
    }

    /// Delete every series whose labels contain all of `partial`.
    pub fn remove_matching(&self, partial: &[(&str, &str)]) -> Result<usize> {
        for (k, _) in partial {
            if !self.desc.labels.iter().any(|l| l == k) {
                return Err(CrMetricsError::schema(
                    &self.desc.name,
                    format!("unknown label {k:?} in partial match"),
                ));
            }
        }
        let mut removed = 0;
        self.series.retain(|key, _| {
            let hit = partial
                .iter()
                .all(|(k, v)| key.iter().any(|(lk, lv)| lk == k && lv == v));
            if hit {
                removed += 1;
            }
            !hit
        });
        Ok(removed)
    }

    pub fn get<L: LabelSet + ?Sized>(&self, labels: &L) -> Result<Option<SeriesValue>> {
        let key = self.key_for(labels)?;
        Ok(self.series.get(&key).map(|v| *v.value()))
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub(crate) fn samples(&self) -> Vec<Sample> {
        let mut out: Vec<Sample> = self
            .series
            .iter()
            .map(|r| Sample {
                labels: r.key().clone(),
                value: *r.value(),
            })
            .collect();
        out.sort_by(|a, b| a.labels.cmp(&b.labels));
        out
    }

    fn check_operation(&self, op: Operation) -> Result<()> {
        let ok = match (self.desc.kind, op) {
            (MetricKind::Counter, Operation::Increment) => true,
            (MetricKind::Gauge, Operation::Observe(_)) => false,
            (MetricKind::Gauge, _) => true,
            (MetricKind::Summary, Operation::Observe(x)) => x.is_finite(),
            _ => false,
        };
        if ok {
            Ok(())
        } else {
            Err(CrMetricsError::schema(
                &self.desc.name,
                format!("operation {op:?} not valid for a {}", self.desc.kind.as_str()),
            ))
        }
    }

    /// Validate `labels` against the declared schema and build the series key.
    fn key_for<L: LabelSet + ?Sized>(&self, labels: &L) -> Result<LabelKey> {
        let mut key = labels.label_pairs();
        key.sort();

        let mismatch = key.len() != self.desc.labels.len()
            || key.windows(2).any(|w| w[0].0 == w[1].0)
            || key.iter().any(|(k, _)| !self.desc.labels.contains(k));
        if mismatch {
            let got: Vec<&str> = key.iter().map(|(k, _)| k.as_str()).collect();
            return Err(CrMetricsError::schema(
                &self.desc.name,
                format!("expected labels {:?}, got {:?}", self.desc.labels, got),
            ));
        }
        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gauge() -> MetricVec {
        MetricVec::new(MetricDescriptor::new(
            "size_info",
            "size",
            MetricKind::Gauge,
            &["namespace", "name"],
        ))
    }

    #[test]
    fn upsert_is_idempotent_per_label_set() {
        let v = gauge();
        let labels = [("name", "a"), ("namespace", "ns")];
        v.upsert(&labels[..], Operation::SetPresence).unwrap();
        v.upsert(&[("namespace", "ns"), ("name", "a")][..], Operation::SetPresence)
            .unwrap();
        assert_eq!(v.len(), 1);
        assert_eq!(v.get(&labels[..]).unwrap(), Some(SeriesValue::Gauge(1.0)));
    }

    #[test]
    fn wrong_label_keys_are_rejected_without_creating_series() {
        let v = gauge();
        let err = v
            .upsert(&[("namespace", "ns")][..], Operation::Set(3.0))
            .unwrap_err();
        assert_eq!(err.class().as_str(), "schema_mismatch");

        let err = v
            .upsert(&[("namespace", "ns"), ("pod", "x")][..], Operation::Set(3.0))
            .unwrap_err();
        assert!(err.to_string().contains("expected labels"));

        let err = v
            .upsert(&[("namespace", "ns"), ("namespace", "x")][..], Operation::Set(3.0))
            .unwrap_err();
        assert_eq!(err.class().as_str(), "schema_mismatch");
        assert!(v.is_empty());
    }

    #[test]
    fn operations_must_fit_the_metric_kind() {
        let counter = MetricVec::new(MetricDescriptor::new(
            "sizing_actions_total",
            "actions",
            MetricKind::Counter,
            &["name"],
        ));
        let l = [("name", "a")];
        assert!(counter.upsert(&l[..], Operation::Set(2.0)).is_err());
        assert!(counter.upsert(&l[..], Operation::Observe(2.0)).is_err());
        counter.upsert(&l[..], Operation::Increment).unwrap();
        counter.upsert(&l[..], Operation::Increment).unwrap();
        assert_eq!(counter.get(&l[..]).unwrap(), Some(SeriesValue::Counter(2.0)));

        let summary = MetricVec::new(MetricDescriptor::new(
            "size_drift",
            "drift",
            MetricKind::Summary,
            &["name"],
        ));
        assert!(summary.upsert(&l[..], Operation::Observe(f64::NAN)).is_err());
        assert!(summary.upsert(&l[..], Operation::Increment).is_err());
        summary.upsert(&l[..], Operation::Observe(2.0)).unwrap();
        summary.upsert(&l[..], Operation::Observe(3.0)).unwrap();
        assert_eq!(
            summary.get(&l[..]).unwrap(),
            Some(SeriesValue::Summary { sum: 5.0, count: 2 })
        );
    }

    #[test]
    fn accepted_operations_always_take_effect() {
        let ops = [
            Operation::SetPresence,
            Operation::Set(2.0),
            Operation::SetToCurrentTime,
            Operation::Increment,
            Operation::Observe(2.0),
        ];
        for kind in [MetricKind::Counter, MetricKind::Gauge, MetricKind::Summary] {
            for op in ops {
                let v = MetricVec::new(MetricDescriptor::new("m", "m", kind, &["name"]));
                let l = [("name", "a")];
                let checked = v.check(&l[..], op);
                match v.upsert(&l[..], op) {
                    Ok(()) => {
                        assert!(checked.is_ok());
                        let value = v.get(&l[..]).unwrap().unwrap();
                        assert_ne!(value, SeriesValue::zero(kind), "{kind:?} {op:?} was a no-op");
                    }
                    Err(_) => {
                        assert!(checked.is_err());
                        assert!(v.is_empty(), "{kind:?} {op:?} left a series behind");
                    }
                }
            }
        }
    }

    #[test]
    fn check_leaves_the_vector_untouched() {
        let v = gauge();
        v.check(&[("namespace", "ns"), ("name", "a")][..], Operation::Set(1.0))
            .unwrap();
        assert!(v
            .check(&[("namespace", "ns")][..], Operation::Set(1.0))
            .is_err());
        assert!(v.is_empty());
    }

    #[test]
    fn remove_is_a_no_op_when_absent() {
        let v = gauge();
        let l = [("namespace", "ns"), ("name", "a")];
        assert!(!v.remove(&l[..]).unwrap());
        v.upsert(&l[..], Operation::Set(4.0)).unwrap();
        assert!(v.remove(&l[..]).unwrap());
        assert!(!v.remove(&l[..]).unwrap());
    }

    #[test]
    fn remove_matching_sweeps_partial_label_sets() {
        let v = MetricVec::new(MetricDescriptor::new(
            "custom_resource_info",
            "info",
            MetricKind::Gauge,
            &["namespace", "name", "kind"],
        ));
        for kind in ["Memcached", "Legacy"] {
            v.upsert(
                &[("namespace", "ns"), ("name", "a"), ("kind", kind)][..],
                Operation::SetPresence,
            )
            .unwrap();
        }
        v.upsert(
            &[("namespace", "ns"), ("name", "b"), ("kind", "Memcached")][..],
            Operation::SetPresence,
        )
        .unwrap();

        assert_eq!(v.remove_matching(&[("namespace", "ns"), ("name", "a")]).unwrap(), 2);
        assert_eq!(v.len(), 1);
        assert!(v.remove_matching(&[("pod", "a")]).is_err());
    }

    #[test]
    fn descriptor_validation() {
        assert!(MetricDescriptor::new("ok_total", "", MetricKind::Counter, &["a"])
            .validate()
            .is_ok());
        assert!(MetricDescriptor::new("9bad", "", MetricKind::Gauge, &[])
            .validate()
            .is_err());
        assert!(MetricDescriptor::new("m", "", MetricKind::Gauge, &["a", "a"])
            .validate()
            .is_err());
        assert!(MetricDescriptor::new("m", "", MetricKind::Gauge, &["__a"])
            .validate()
            .is_err());
        assert!(MetricDescriptor::new("m", "", MetricKind::Gauge, &["a-b"])
            .validate()
            .is_err());
        assert!(MetricDescriptor::new("m", "", MetricKind::Summary, &["quantile"])
            .validate()
            .is_err());
    }
}
