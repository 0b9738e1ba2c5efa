//! Prometheus text exposition format (version 0.0.4).

use std::fmt::Write;

use crate::obs::metrics::{MetricKind, SeriesValue};
use crate::obs::registry::MetricsSnapshot;

pub const CONTENT_TYPE: &str = "text/plain; version=0.0.4; charset=utf-8";

/// Helper to escape label values.
fn escape_label(v: &str) -> String {
    v.replace('\\', "\\\\").replace('"', "\\\"").replace('\n', "\\n")
}

fn escape_help(v: &str) -> String {
    v.replace('\\', "\\\\").replace('\n', "\\n")
}

fn format_value(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v.is_infinite() {
        if v > 0.0 { "+Inf".to_string() } else { "-Inf".to_string() }
    } else {
        v.to_string()
    }
}

fn label_block(labels: &[(String, String)]) -> String {
    if labels.is_empty() {
        return String::new();
    }
    let inner = labels
        .iter()
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label(v)))
        .collect::<Vec<_>>()
        .join(",");
    format!("{{{inner}}}")
}

/// Render a gathered snapshot. Families without series still emit their
/// HELP/TYPE header.
pub fn render(snapshot: &MetricsSnapshot) -> String {
    let mut out = String::new();
    for family in &snapshot.families {
        let _ = writeln!(out, "# HELP {} {}", family.name, escape_help(&family.help));
        let _ = writeln!(out, "# TYPE {} {}", family.name, family.kind.as_str());
        for sample in &family.samples {
            let labels = label_block(&sample.labels);
            match (family.kind, sample.value) {
                (MetricKind::Summary, SeriesValue::Summary { sum, count }) => {
                    let _ = writeln!(out, "{}_sum{} {}", family.name, labels, format_value(sum));
                    let _ = writeln!(out, "{}_count{} {}", family.name, labels, count);
                }
                (_, SeriesValue::Counter(v)) | (_, SeriesValue::Gauge(v)) => {
                    let _ = writeln!(out, "{}{} {}", family.name, labels, format_value(v));
                }
                // a summary value under a non-summary family cannot be built by MetricVec
                (_, SeriesValue::Summary { .. }) => {}
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::obs::metrics::{MetricDescriptor, Operation};
    use crate::obs::registry::MetricRegistry;

    #[test]
    fn renders_headers_escaped_labels_and_summaries() {
        let mut r = MetricRegistry::new();
        r.register(MetricDescriptor::new(
            "custom_resource_info",
            "Information about the custom resource.",
            MetricKind::Gauge,
            &["namespace", "name"],
        ))
        .unwrap();
        r.register(MetricDescriptor::new("size_drift", "Drift.", MetricKind::Summary, &["name"]))
            .unwrap();
        r.register(MetricDescriptor::new("up", "Up.\nmultiline", MetricKind::Gauge, &[]))
            .unwrap();

        r.upsert(
            "custom_resource_info",
            &[("namespace", "ns"), ("name", "a\"b\\c")][..],
            Operation::SetPresence,
        )
        .unwrap();
        r.upsert("size_drift", &[("name", "a")][..], Operation::Observe(2.0)).unwrap();
        r.upsert("size_drift", &[("name", "a")][..], Operation::Observe(0.5)).unwrap();
        r.upsert("up", &BTreeMap::<String, String>::new(), Operation::Set(1.0)).unwrap();

        let text = render(&r.gather());
        assert!(text.contains("# HELP custom_resource_info Information about the custom resource.\n"));
        assert!(text.contains("# TYPE custom_resource_info gauge\n"));
        assert!(text.contains("custom_resource_info{name=\"a\\\"b\\\\c\",namespace=\"ns\"} 1\n"));
        assert!(text.contains("# TYPE size_drift summary\n"));
        assert!(text.contains("size_drift_sum{name=\"a\"} 2.5\n"));
        assert!(text.contains("size_drift_count{name=\"a\"} 2\n"));
        assert!(text.contains("# HELP up Up.\\nmultiline\n"));
        assert!(text.contains("\nup 1\n"));
    }

    #[test]
    fn special_values() {
        assert_eq!(format_value(f64::NAN), "NaN");
        assert_eq!(format_value(f64::NEG_INFINITY), "-Inf");
        assert_eq!(format_value(3.0), "3");
        assert_eq!(format_value(0.25), "0.25");
    }
}
