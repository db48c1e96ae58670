//! Prometheus-style metrics for uploads
//!
//! Counters, gauges, and histograms backed by atomics, rendered in the
//! Prometheus text format.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Counter metric (monotonically increasing)
pub struct Counter {
    value: AtomicU64,
    name: String,
    help: String,
}

impl Counter {
    /// Create a new counter
    pub fn new(name: &str, help: &str) -> Self {
        Self {
            value: AtomicU64::new(0),
            name: name.into(),
            help: help.into(),
        }
    }

    /// Increment by 1
    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    /// Increment by delta
    pub fn inc_by(&self, delta: u64) {
        self.value.fetch_add(delta, Ordering::Relaxed);
    }

    /// Get current value
    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Format as Prometheus metric
    pub fn to_prometheus(&self) -> String {
        format!(
            "# HELP {} {}\n# TYPE {} counter\n{} {}\n",
            self.name, self.help, self.name, self.name, self.get()
        )
    }
}

/// Gauge metric (can go up or down)
pub struct Gauge {
    value: AtomicI64,
    name: String,
    help: String,
}

impl Gauge {
    /// Create a new gauge
    pub fn new(name: &str, help: &str) -> Self {
        Self {
            value: AtomicI64::new(0),
            name: name.into(),
            help: help.into(),
        }
    }

    pub fn set(&self, val: i64) {
        self.value.store(val, Ordering::Relaxed);
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dec(&self) {
        self.value.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }

    /// Format as Prometheus metric
    pub fn to_prometheus(&self) -> String {
        format!(
            "# HELP {} {}\n# TYPE {} gauge\n{} {}\n",
            self.name, self.help, self.name, self.name, self.get()
        )
    }
}

/// Histogram for latency measurements
pub struct Histogram {
    buckets: Vec<(f64, AtomicU64)>,
    sum: AtomicU64,
    count: AtomicU64,
    name: String,
    help: String,
}

impl Histogram {
    /// Create with buckets suited to part uploads (10ms to 5min)
    pub fn new(name: &str, help: &str) -> Self {
        Self::with_buckets(
            name,
            help,
            vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0, 300.0],
        )
    }

    /// Create with custom buckets
    pub fn with_buckets(name: &str, help: &str, bounds: Vec<f64>) -> Self {
        let buckets = bounds
            .into_iter()
            .map(|b| (b, AtomicU64::new(0)))
            .collect();

        Self {
            buckets,
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
            name: name.into(),
            help: help.into(),
        }
    }

    /// Observe a value in seconds
    pub fn observe(&self, value: f64) {
        self.count.fetch_add(1, Ordering::Relaxed);

        // Sum is kept in micros
        let micros = (value * 1_000_000.0) as u64;
        self.sum.fetch_add(micros, Ordering::Relaxed);

        for (bound, count) in &self.buckets {
            if value <= *bound {
                count.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    /// Format as Prometheus metric
    pub fn to_prometheus(&self) -> String {
        let mut output = format!(
            "# HELP {} {}\n# TYPE {} histogram\n",
            self.name, self.help, self.name
        );

        for (bound, count) in &self.buckets {
            output.push_str(&format!(
                "{}_bucket{{le=\"{}\"}} {}\n",
                self.name, bound, count.load(Ordering::Relaxed)
            ));
        }
        output.push_str(&format!(
            "{}_bucket{{le=\"+Inf\"}} {}\n",
            self.name,
            self.count()
        ));

        let sum_secs = self.sum.load(Ordering::Relaxed) as f64 / 1_000_000.0;
        output.push_str(&format!("{}_sum {}\n", self.name, sum_secs));
        output.push_str(&format!("{}_count {}\n", self.name, self.count()));

        output
    }
}

/// Process-wide upload metrics
pub mod standard {
    use super::*;
    use std::sync::LazyLock;

    pub static PARTS_ARCHIVED: LazyLock<Counter> = LazyLock::new(|| {
        Counter::new("nimbus_parts_archived_total", "Conjoined parts archived")
    });

    pub static BYTES_ARCHIVED: LazyLock<Counter> = LazyLock::new(|| {
        Counter::new("nimbus_bytes_archived_total", "Bytes archived as conjoined parts")
    });

    pub static PART_FAILURES: LazyLock<Counter> = LazyLock::new(|| {
        Counter::new("nimbus_part_failures_total", "Parts whose seek or archive failed")
    });

    pub static SESSIONS_FINISHED: LazyLock<Counter> = LazyLock::new(|| {
        Counter::new("nimbus_sessions_finished_total", "Conjoined sessions finished")
    });

    pub static SESSIONS_ABORTED: LazyLock<Counter> = LazyLock::new(|| {
        Counter::new("nimbus_sessions_aborted_total", "Conjoined sessions aborted")
    });

    pub static ACTIVE_WORKERS: LazyLock<Gauge> = LazyLock::new(|| {
        Gauge::new("nimbus_active_workers", "Upload workers currently running")
    });

    pub static ARCHIVE_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
        Histogram::new("nimbus_archive_duration_seconds", "Per-part archive latency")
    });
}

/// Render all standard metrics
pub fn gather_upload_metrics() -> String {
    let mut output = String::new();

    output.push_str(&standard::PARTS_ARCHIVED.to_prometheus());
    output.push_str(&standard::BYTES_ARCHIVED.to_prometheus());
    output.push_str(&standard::PART_FAILURES.to_prometheus());
    output.push_str(&standard::SESSIONS_FINISHED.to_prometheus());
    output.push_str(&standard::SESSIONS_ABORTED.to_prometheus());

    output.push_str(&standard::ACTIVE_WORKERS.to_prometheus());

    output.push_str(&standard::ARCHIVE_DURATION.to_prometheus());

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let counter = Counter::new("test_counter", "Test counter");
        assert_eq!(counter.get(), 0);

        counter.inc();
        assert_eq!(counter.get(), 1);

        counter.inc_by(5);
        assert_eq!(counter.get(), 6);
        assert!(counter.to_prometheus().contains("test_counter 6"));
    }

    #[test]
    fn test_gauge() {
        let gauge = Gauge::new("test_gauge", "Test gauge");
        gauge.set(10);
        gauge.dec();
        assert_eq!(gauge.get(), 9);
    }

    #[test]
    fn test_histogram() {
        let histogram = Histogram::new("test_histogram", "Test histogram");

        histogram.observe(0.02);
        histogram.observe(0.2);
        histogram.observe(400.0);

        let prometheus = histogram.to_prometheus();
        assert!(prometheus.contains("test_histogram_count 3"));
        assert!(prometheus.contains("test_histogram_bucket{le=\"0.05\"} 1"));
        assert!(prometheus.contains("test_histogram_bucket{le=\"+Inf\"} 3"));
    }

    #[test]
    fn test_gather_contains_all_metrics() {
        let output = gather_upload_metrics();
        assert!(output.contains("nimbus_parts_archived_total"));
        assert!(output.contains("nimbus_sessions_aborted_total"));
        assert!(output.contains("nimbus_archive_duration_seconds_count"));
    }
}
