use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Histogram {
    buckets: Vec<(u64, u64)>,
    sum_ms: u64,
    count: u64,
}

impl Histogram {
    pub fn new() -> Self {
        Self {
            buckets: vec![
                (10, 0),
                (50, 0),
                (100, 0),
                (500, 0),
                (1000, 0),
                (5000, 0),
                (30000, 0),
                (u64::MAX, 0),
            ],
            sum_ms: 0,
            count: 0,
        }
    }

    pub fn observe(&mut self, value_ms: u64) {
        self.sum_ms += value_ms;
        self.count += 1;

        for (threshold, count) in &mut self.buckets {
            if value_ms <= *threshold {
                *count += 1;
                break;
            }
        }
    }

    /// Non-cumulative bucket counts. The last bucket has no upper bound.
    pub fn buckets(&self) -> Vec<LatencyBucket> {
        self.buckets
            .iter()
            .map(|&(threshold, count)| LatencyBucket {
                le_ms: (threshold != u64::MAX).then_some(threshold),
                count,
            })
            .collect()
    }

    pub fn mean_ms(&self) -> Option<f64> {
        if self.count == 0 {
            None
        } else {
            Some(self.sum_ms as f64 / self.count as f64)
        }
    }
}

/// One histogram bucket: observations at or below `le_ms`, or above every bound when `None`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct LatencyBucket {
    pub le_ms: Option<u64>,
    pub count: u64,
}

impl Default for Histogram {
    fn default() -> Self {
        Self::new()
    }
}

// Atomic counter so concurrent pipelines never contend on a lock.
#[derive(Debug)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self { value: AtomicU64::new(0) }
    }

    pub fn inc(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

/// Outcome counts for one tracking session.
#[derive(Debug, Default)]
pub struct TrackerMetrics {
    pub classifier_latency: Mutex<Histogram>,

    pub events_received: Counter,
    pub events_ignored: Counter,
    pub pages_empty: Counter,
    pub visits_recorded: Counter,
    pub transport_failures: Counter,
    pub storage_failures: Counter,
}

impl TrackerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_classifier_latency(&self, duration: Duration) {
        self.classifier_latency.lock().observe(duration.as_millis() as u64);
    }

    pub fn summary(&self) -> MetricsSummary {
        let latency = self.classifier_latency.lock();
        MetricsSummary {
            events_received: self.events_received.get(),
            events_ignored: self.events_ignored.get(),
            pages_empty: self.pages_empty.get(),
            visits_recorded: self.visits_recorded.get(),
            transport_failures: self.transport_failures.get(),
            storage_failures: self.storage_failures.get(),
            mean_classifier_ms: latency.mean_ms(),
            classifier_latency_buckets: latency.buckets(),
        }
    }
}

/// Point-in-time copy of the counters, for printing at the end of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSummary {
    pub events_received: u64,
    pub events_ignored: u64,
    pub pages_empty: u64,
    pub visits_recorded: u64,
    pub transport_failures: u64,
    pub storage_failures: u64,
    pub mean_classifier_ms: Option<f64>,
    pub classifier_latency_buckets: Vec<LatencyBucket>,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Events: {} received, {} ignored, {} empty, {} recorded, {} transport failures, {} storage failures",
            self.events_received,
            self.events_ignored,
            self.pages_empty,
            self.visits_recorded,
            self.transport_failures,
            self.storage_failures
        )?;
        if let Some(mean) = self.mean_classifier_ms {
            write!(f, ", classifier mean {:.0}ms", mean)?;

            let mut lower = 0;
            for bucket in self.classifier_latency_buckets.iter() {
                match bucket.le_ms {
                    Some(le) if bucket.count > 0 => write!(f, " [{}-{}ms: {}]", lower, le, bucket.count)?,
                    None if bucket.count > 0 => write!(f, " [>{}ms: {}]", lower, bucket.count)?,
                    _ => {}
                }
                if let Some(le) = bucket.le_ms {
                    lower = le;
                }
            }
        }
        Ok(())
    }
}

pub type SharedMetrics = Arc<TrackerMetrics>;
