//! Prometheus metrics
//!
//! Lock-free counters, gauges and histograms rendered in the Prometheus
//! text exposition format.

use std::fmt::Write;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

/// Anything that renders itself as Prometheus text
pub trait Metric: Sync {
    fn render(&self, out: &mut String);
}

fn header(out: &mut String, name: &str, help: &str, kind: &str) {
    let _ = writeln!(out, "# HELP {name} {help}");
    let _ = writeln!(out, "# TYPE {name} {kind}");
}

/// Monotonically increasing count
pub struct Counter {
    name: &'static str,
    help: &'static str,
    value: AtomicU64,
}

impl Counter {
    pub const fn new(name: &'static str, help: &'static str) -> Self {
        Self {
            name,
            help,
            value: AtomicU64::new(0),
        }
    }

    pub fn inc(&self) {
        self.add(1);
    }

    pub fn add(&self, delta: u64) {
        self.value.fetch_add(delta, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Metric for Counter {
    fn render(&self, out: &mut String) {
        header(out, self.name, self.help, "counter");
        let _ = writeln!(out, "{} {}", self.name, self.get());
    }
}

/// Point-in-time value
pub struct Gauge {
    name: &'static str,
    help: &'static str,
    value: AtomicI64,
}

impl Gauge {
    pub const fn new(name: &'static str, help: &'static str) -> Self {
        Self {
            name,
            help,
            value: AtomicI64::new(0),
        }
    }

    pub fn set(&self, val: i64) {
        self.value.store(val, Ordering::Relaxed);
    }

    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Metric for Gauge {
    fn render(&self, out: &mut String) {
        header(out, self.name, self.help, "gauge");
        let _ = writeln!(out, "{} {}", self.name, self.get());
    }
}

const LATENCY_BOUNDS: [f64; 10] = [0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 5.0];

/// Latency distribution in seconds, cumulative buckets
pub struct Histogram {
    name: &'static str,
    help: &'static str,
    buckets: [AtomicU64; LATENCY_BOUNDS.len()],
    /// Microseconds
    sum_us: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    pub const fn new(name: &'static str, help: &'static str) -> Self {
        Self {
            name,
            help,
            buckets: [const { AtomicU64::new(0) }; LATENCY_BOUNDS.len()],
            sum_us: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, secs: f64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_us
            .fetch_add((secs * 1_000_000.0) as u64, Ordering::Relaxed);
        for (bound, bucket) in LATENCY_BOUNDS.iter().zip(&self.buckets) {
            if secs <= *bound {
                bucket.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

impl Metric for Histogram {
    fn render(&self, out: &mut String) {
        header(out, self.name, self.help, "histogram");
        for (bound, bucket) in LATENCY_BOUNDS.iter().zip(&self.buckets) {
            let _ = writeln!(
                out,
                "{}_bucket{{le=\"{}\"}} {}",
                self.name,
                bound,
                bucket.load(Ordering::Relaxed)
            );
        }
        let count = self.count();
        let _ = writeln!(out, "{}_bucket{{le=\"+Inf\"}} {}", self.name, count);
        let sum = self.sum_us.load(Ordering::Relaxed) as f64 / 1_000_000.0;
        let _ = writeln!(out, "{}_sum {}", self.name, sum);
        let _ = writeln!(out, "{}_count {}", self.name, count);
    }
}

/// Process-wide node metrics
pub mod standard {
    use super::*;

    pub static BEATS_WRITTEN: Counter =
        Counter::new("xferd_heartbeats_total", "Beacons written to the liveness store");
    pub static BEAT_FAILURES: Counter =
        Counter::new("xferd_heartbeat_failures_total", "Beacon writes that failed");
    pub static FLEET_SIZE: Gauge = Gauge::new("xferd_fleet_size", "Live nodes in the last fleet view");
    pub static IS_LEAD: Gauge = Gauge::new("xferd_is_lead", "1 when this node is the lead node");

    pub static MESSAGES_ENQUEUED: Counter =
        Counter::new("xferd_messages_enqueued_total", "Worker messages accepted");
    pub static MESSAGES_REJECTED: Counter = Counter::new(
        "xferd_messages_rejected_total",
        "Worker messages rejected by a full channel",
    );
    pub static MESSAGES_INGESTED: Counter =
        Counter::new("xferd_messages_ingested_total", "Worker messages persisted");
    pub static MESSAGES_DROPPED: Counter = Counter::new(
        "xferd_messages_dropped_total",
        "Drained worker messages lost to a failed persist",
    );
    pub static INGEST_DURATION: Histogram =
        Histogram::new("xferd_ingest_duration_seconds", "Batch persist latency");

    pub static STALLED_TRANSFERS: Counter =
        Counter::new("xferd_stalled_transfers_total", "Transfers declared stalled");
    pub static WATCHDOG_TRIPS: Counter =
        Counter::new("xferd_watchdog_trips_total", "Stall watchdog trips");

    pub(super) fn all() -> [&'static dyn Metric; 11] {
        [
            &BEATS_WRITTEN,
            &BEAT_FAILURES,
            &FLEET_SIZE,
            &IS_LEAD,
            &MESSAGES_ENQUEUED,
            &MESSAGES_REJECTED,
            &MESSAGES_INGESTED,
            &MESSAGES_DROPPED,
            &INGEST_DURATION,
            &STALLED_TRANSFERS,
            &WATCHDOG_TRIPS,
        ]
    }
}

/// Render every standard metric
pub fn gather_system_metrics() -> String {
    let mut out = String::new();
    for metric in standard::all() {
        metric.render(&mut out);
    }
    out
}
