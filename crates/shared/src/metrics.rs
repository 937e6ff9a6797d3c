//! A custom lightweight Counter/Gauge/Histogram collector serialized to
//! Prometheus text exposition format (spec 4.14). Grounded on the text
//! shape a `prometheus::TextEncoder` produces, hand-rolled per the
//! explicit "custom lightweight collector" requirement rather than
//! taking on that crate as a dependency.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

type Labels = Vec<(&'static str, String)>;

fn labels_key(labels: &Labels) -> String {
    let mut sorted = labels.clone();
    sorted.sort();
    sorted.into_iter().map(|(k, v)| format!("{k}={v}")).collect::<Vec<_>>().join(",")
}

fn format_labels(labels: &Labels) -> String {
    if labels.is_empty() {
        return String::new();
    }
    let mut sorted = labels.clone();
    sorted.sort();
    let rendered = sorted
        .iter()
        .map(|(k, v)| format!("{k}=\"{}\"", v.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect::<Vec<_>>()
        .join(",");
    format!("{{{rendered}}}")
}

#[derive(Default)]
struct CounterFamily {
    values: HashMap<String, (Labels, f64)>,
}

#[derive(Default)]
struct GaugeFamily {
    values: HashMap<String, (Labels, f64)>,
}

struct HistogramFamily {
    buckets: Vec<f64>,
    values: HashMap<String, (Labels, Vec<u64>, u64, f64)>,
}

pub struct Registry {
    counters: Mutex<HashMap<&'static str, (&'static str, CounterFamily)>>,
    gauges: Mutex<HashMap<&'static str, (&'static str, GaugeFamily)>>,
    histograms: Mutex<HashMap<&'static str, (&'static str, HistogramFamily)>>,
    started_at: Instant,
}

const DEFAULT_BUCKETS: &[f64] = &[5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0, 2500.0, 5000.0, 10000.0];

impl Registry {
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(HashMap::new()),
            gauges: Mutex::new(HashMap::new()),
            histograms: Mutex::new(HashMap::new()),
            started_at: Instant::now(),
        }
    }

    pub fn incr_counter(&self, name: &'static str, help: &'static str, labels: Labels) {
        self.incr_counter_by(name, help, labels, 1.0);
    }

    pub fn incr_counter_by(&self, name: &'static str, help: &'static str, labels: Labels, amount: f64) {
        let mut counters = self.counters.lock().expect("metrics mutex poisoned");
        let (_, family) = counters.entry(name).or_insert_with(|| (help, CounterFamily::default()));
        let key = labels_key(&labels);
        let entry = family.values.entry(key).or_insert((labels, 0.0));
        entry.1 += amount;
    }

    pub fn set_gauge(&self, name: &'static str, help: &'static str, labels: Labels, value: f64) {
        let mut gauges = self.gauges.lock().expect("metrics mutex poisoned");
        let (_, family) = gauges.entry(name).or_insert_with(|| (help, GaugeFamily::default()));
        let key = labels_key(&labels);
        family.values.insert(key, (labels, value));
    }

    pub fn observe_histogram(&self, name: &'static str, help: &'static str, labels: Labels, value: f64) {
        let mut histograms = self.histograms.lock().expect("metrics mutex poisoned");
        let (_, family) = histograms.entry(name).or_insert_with(|| {
            (
                help,
                HistogramFamily {
                    buckets: DEFAULT_BUCKETS.to_vec(),
                    values: HashMap::new(),
                },
            )
        });
        let key = labels_key(&labels);
        let bucket_count = family.buckets.len();
        let entry = family.values.entry(key).or_insert_with(|| (labels, vec![0; bucket_count], 0, 0.0));
        for (i, bound) in family.buckets.iter().enumerate() {
            if value <= *bound {
                entry.1[i] += 1;
            }
        }
        entry.2 += 1;
        entry.3 += value;
    }

    pub fn uptime_seconds(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }

    /// Prometheus text exposition: `# HELP`, `# TYPE`, then one sample
    /// line per label combination.
    pub fn render(&self) -> String {
        let mut out = String::new();

        {
            let counters = self.counters.lock().expect("metrics mutex poisoned");
            let mut names: Vec<_> = counters.keys().collect();
            names.sort();
            for name in names {
                let (help, family) = &counters[name];
                out.push_str(&format!("# HELP {name} {help}\n# TYPE {name} counter\n"));
                let mut entries: Vec<_> = family.values.values().collect();
                entries.sort_by(|a, b| labels_key(&a.0).cmp(&labels_key(&b.0)));
                for (labels, value) in entries {
                    out.push_str(&format!("{name}{} {value}\n", format_labels(labels)));
                }
            }
        }

        {
            let gauges = self.gauges.lock().expect("metrics mutex poisoned");
            let mut names: Vec<_> = gauges.keys().collect();
            names.sort();
            for name in names {
                let (help, family) = &gauges[name];
                out.push_str(&format!("# HELP {name} {help}\n# TYPE {name} gauge\n"));
                let mut entries: Vec<_> = family.values.values().collect();
                entries.sort_by(|a, b| labels_key(&a.0).cmp(&labels_key(&b.0)));
                for (labels, value) in entries {
                    out.push_str(&format!("{name}{} {value}\n", format_labels(labels)));
                }
            }
        }

        {
            let histograms = self.histograms.lock().expect("metrics mutex poisoned");
            let mut names: Vec<_> = histograms.keys().collect();
            names.sort();
            for name in names {
                let (help, family) = &histograms[name];
                out.push_str(&format!("# HELP {name} {help}\n# TYPE {name} histogram\n"));
                let mut entries: Vec<_> = family.values.values().collect();
                entries.sort_by(|a, b| labels_key(&a.0).cmp(&labels_key(&b.0)));
                for (labels, bucket_counts, total_count, sum) in entries {
                    let mut cumulative = 0u64;
                    for (bound, count) in family.buckets.iter().zip(bucket_counts) {
                        cumulative += count;
                        let mut bucket_labels = labels.clone();
                        bucket_labels.push(("le", bound.to_string()));
                        out.push_str(&format!("{name}_bucket{} {cumulative}\n", format_labels(&bucket_labels)));
                    }
                    let mut inf_labels = labels.clone();
                    inf_labels.push(("le", "+Inf".to_string()));
                    out.push_str(&format!("{name}_bucket{} {total_count}\n", format_labels(&inf_labels)));
                    out.push_str(&format!("{name}_sum{} {sum}\n", format_labels(labels)));
                    out.push_str(&format!("{name}_count{} {total_count}\n", format_labels(labels)));
                }
            }
        }

        out.push_str(&format!(
            "# HELP process_uptime_seconds seconds since process start\n# TYPE process_uptime_seconds gauge\nprocess_uptime_seconds {}\n",
            self.uptime_seconds()
        ));

        out
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Collapses store ids, uuids, and purely numeric path segments to
/// placeholders so route cardinality stays bounded.
pub fn normalize_route(path: &str) -> String {
    path.split('/')
        .map(|segment| {
            if segment.starts_with("store-") && segment.len() == 14 {
                ":id"
            } else if is_uuid_like(segment) {
                ":id"
            } else if !segment.is_empty() && segment.bytes().all(|b| b.is_ascii_digit()) {
                ":id"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

fn is_uuid_like(segment: &str) -> bool {
    segment.len() == 36 && uuid::Uuid::parse_str(segment).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counter_accumulates_across_calls_with_the_same_labels() {
        let registry = Registry::new();
        registry.incr_counter("requests_total", "help", vec![("method", "GET".to_string())]);
        registry.incr_counter("requests_total", "help", vec![("method", "GET".to_string())]);
        let rendered = registry.render();
        assert!(rendered.contains("requests_total{method=\"GET\"} 2"));
    }

    #[test]
    fn gauge_reflects_the_most_recent_value() {
        let registry = Registry::new();
        registry.set_gauge("queue_depth", "help", vec![], 3.0);
        registry.set_gauge("queue_depth", "help", vec![], 7.0);
        let rendered = registry.render();
        assert!(rendered.contains("queue_depth 7"));
    }

    #[test]
    fn histogram_counts_are_cumulative_across_buckets() {
        let registry = Registry::new();
        registry.observe_histogram("duration_ms", "help", vec![], 3.0);
        let rendered = registry.render();
        assert!(rendered.contains("duration_ms_bucket{le=\"5\"} 1"));
        assert!(rendered.contains("duration_ms_count 1"));
    }

    #[test]
    fn route_normalization_collapses_ids() {
        assert_eq!(normalize_route("/api/v1/stores/store-a1b2c3d4"), "/api/v1/stores/:id");
        assert_eq!(normalize_route("/api/v1/stores/store-a1b2c3d4/retry"), "/api/v1/stores/:id/retry");
        assert_eq!(normalize_route("/api/v1/stores/42"), "/api/v1/stores/:id");
    }
}
