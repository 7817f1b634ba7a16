//! Prometheus text exposition of aggregated series.

use std::fmt::Write;

use crate::storage::aggregate::MetricAggregation;

/// Replace characters Prometheus does not allow in metric names.
pub fn sanitize_name(name: &str) -> String {
    let mut out: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' || c == ':' { c } else { '_' })
        .collect();
    if out.starts_with(|c: char| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

fn escape_label_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn format_value(v: f64) -> String {
    if v.is_nan() {
        "NaN".to_string()
    } else if v == f64::INFINITY {
        "+Inf".to_string()
    } else if v == f64::NEG_INFINITY {
        "-Inf".to_string()
    } else {
        v.to_string()
    }
}

/// Render one aggregation: `# HELP`, `# TYPE`, then one sample line per point
/// with its timestamp in milliseconds.
pub fn render(aggregation: &MetricAggregation, help: &str) -> String {
    let name = sanitize_name(&aggregation.name);
    let mut out = String::new();
    let _ = writeln!(out, "# HELP {} {}", name, help.replace('\n', " "));
    let _ = writeln!(out, "# TYPE {} {}", name, aggregation.metric_type);

    let labels = if aggregation.labels.is_empty() {
        String::new()
    } else {
        let pairs: Vec<String> = aggregation
            .labels
            .iter()
            .map(|(k, v)| format!("{}=\"{}\"", sanitize_name(k), escape_label_value(v)))
            .collect();
        format!("{{{}}}", pairs.join(","))
    };

    for point in &aggregation.time_series {
        let _ = writeln!(
            out,
            "{}{} {} {}",
            name,
            labels,
            format_value(point.value),
            point.timestamp.timestamp_millis()
        );
    }
    out
}

/// Render several aggregations back to back.
pub fn render_all<'a, I>(aggregations: I) -> String
where
    I: IntoIterator<Item = &'a MetricAggregation>,
{
    aggregations
        .into_iter()
        .map(|agg| render(agg, &format!("Aggregated {} samples", agg.name)))
        .collect()
}
