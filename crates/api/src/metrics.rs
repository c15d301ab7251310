use serde::Serialize;
use source::{Origin, Resolution, SourceError};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

/// Counters over every chapter resolution the server performs.
#[derive(Default)]
pub struct ResolveMetrics {
    requests: AtomicUsize,
    failures: AtomicUsize,

    cache_hits: AtomicUsize,
    remote_loads: AtomicUsize,
    local_loads: AtomicUsize,
    // Local loads that happened because the remote failed
    remote_fallbacks: AtomicUsize,

    // Microseconds
    total_resolve_time_us: AtomicU64,
}

impl ResolveMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record(&self, outcome: &Result<Resolution, SourceError>, duration: Duration) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.total_resolve_time_us
            .fetch_add(duration.as_micros() as u64, Ordering::Relaxed);

        match outcome {
            Ok(resolution) => {
                let counter = match resolution.origin {
                    Origin::Cache => &self.cache_hits,
                    Origin::Remote => &self.remote_loads,
                    Origin::Local => &self.local_loads,
                };
                counter.fetch_add(1, Ordering::Relaxed);
                if resolution.remote_failure.is_some() {
                    self.remote_fallbacks.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(_) => {
                self.failures.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let requests = self.requests.load(Ordering::Relaxed);
        let total_us = self.total_resolve_time_us.load(Ordering::Relaxed) as f64;

        MetricsSnapshot {
            requests,
            failures: self.failures.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            remote_loads: self.remote_loads.load(Ordering::Relaxed),
            local_loads: self.local_loads.load(Ordering::Relaxed),
            remote_fallbacks: self.remote_fallbacks.load(Ordering::Relaxed),
            avg_resolve_time_ms: if requests > 0 {
                total_us / requests as f64 / 1000.0
            } else {
                0.0
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MetricsSnapshot {
    pub requests: usize,
    pub failures: usize,
    pub cache_hits: usize,
    pub remote_loads: usize,
    pub local_loads: usize,
    pub remote_fallbacks: usize,
    pub avg_resolve_time_ms: f64,
}

pub struct TimedOperation {
    start: Instant,
}

impl TimedOperation {
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use analysis::normalize_document;
    use serde_json::json;

    fn resolution(origin: Origin, remote_failure: Option<SourceError>) -> Result<Resolution, SourceError> {
        let document = normalize_document(&json!({"novel_id": "n1", "chapter_id": "ch1"})).unwrap();
        Ok(Resolution {
            document: Arc::new(document),
            revision: "r1".to_string(),
            origin,
            remote_failure,
        })
    }

    #[test]
    fn test_counts_by_origin() {
        let metrics = ResolveMetrics::new();
        let ms = Duration::from_millis(4);

        metrics.record(&resolution(Origin::Remote, None), ms);
        metrics.record(&resolution(Origin::Cache, None), ms);
        metrics.record(
            &resolution(Origin::Local, Some(SourceError::RemoteTimeout(Duration::from_secs(30)))),
            ms,
        );
        metrics.record(&Err(SourceError::NotFound("ch9".to_string())), ms);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.requests, 4);
        assert_eq!(snapshot.failures, 1);
        assert_eq!(snapshot.cache_hits, 1);
        assert_eq!(snapshot.remote_loads, 1);
        assert_eq!(snapshot.local_loads, 1);
        assert_eq!(snapshot.remote_fallbacks, 1);
        assert!((snapshot.avg_resolve_time_ms - 4.0).abs() < 1e-6);
    }

    #[test]
    fn test_empty_snapshot() {
        let snapshot = ResolveMetrics::new().snapshot();
        assert_eq!(snapshot.requests, 0);
        assert_eq!(snapshot.avg_resolve_time_ms, 0.0);
    }
}
