use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::error::Stage;

pub struct Metrics {
    // Counters
    runs_started: AtomicUsize,
    runs_succeeded: AtomicUsize,
    runs_failed: AtomicUsize,
    runs_cancelled: AtomicUsize,

    // Timing (in microseconds)
    total_extract_time_us: AtomicU64,
    total_score_time_us: AtomicU64,
    total_assemble_time_us: AtomicU64,
    total_report_time_us: AtomicU64,

    // Counts
    total_chunks_processed: AtomicUsize,
    total_events_extracted: AtomicUsize,
    total_relationships_assembled: AtomicUsize,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            runs_started: AtomicUsize::new(0),
            runs_succeeded: AtomicUsize::new(0),
            runs_failed: AtomicUsize::new(0),
            runs_cancelled: AtomicUsize::new(0),
            total_extract_time_us: AtomicU64::new(0),
            total_score_time_us: AtomicU64::new(0),
            total_assemble_time_us: AtomicU64::new(0),
            total_report_time_us: AtomicU64::new(0),
            total_chunks_processed: AtomicUsize::new(0),
            total_events_extracted: AtomicUsize::new(0),
            total_relationships_assembled: AtomicUsize::new(0),
        })
    }

    pub fn record_started(&self) {
        self.runs_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_finished(&self, success: bool, cancelled: bool) {
        if success {
            self.runs_succeeded.fetch_add(1, Ordering::Relaxed);
        } else if cancelled {
            self.runs_cancelled.fetch_add(1, Ordering::Relaxed);
        } else {
            self.runs_failed.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_extract(&self, duration: Duration, chunks: usize, events: usize) {
        self.total_extract_time_us.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
        self.total_chunks_processed.fetch_add(chunks, Ordering::Relaxed);
        self.total_events_extracted.fetch_add(events, Ordering::Relaxed);
    }

    pub fn record_stage(&self, stage: Stage, duration: Duration) {
        let total = match stage {
            Stage::Topic | Stage::Events | Stage::Relationships => &self.total_extract_time_us,
            Stage::Scoring => &self.total_score_time_us,
            Stage::Assembly | Stage::Selection => &self.total_assemble_time_us,
            Stage::Report => &self.total_report_time_us,
        };
        total.fetch_add(duration.as_micros() as u64, Ordering::Relaxed);
    }

    pub fn record_relationships(&self, count: usize) {
        self.total_relationships_assembled.fetch_add(count, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        let finished = self.runs_succeeded.load(Ordering::Relaxed);
        MetricsSnapshot {
            runs_started: self.runs_started.load(Ordering::Relaxed),
            runs_succeeded: finished,
            runs_failed: self.runs_failed.load(Ordering::Relaxed),
            runs_cancelled: self.runs_cancelled.load(Ordering::Relaxed),
            avg_extract_time_ms: avg_time_ms(&self.total_extract_time_us, finished),
            avg_score_time_ms: avg_time_ms(&self.total_score_time_us, finished),
            avg_assemble_time_ms: avg_time_ms(&self.total_assemble_time_us, finished),
            avg_report_time_ms: avg_time_ms(&self.total_report_time_us, finished),
            total_chunks_processed: self.total_chunks_processed.load(Ordering::Relaxed),
            total_events_extracted: self.total_events_extracted.load(Ordering::Relaxed),
            total_relationships_assembled: self.total_relationships_assembled.load(Ordering::Relaxed),
        }
    }
}

fn avg_time_ms(total_us: &AtomicU64, count: usize) -> f64 {
    let total = total_us.load(Ordering::Relaxed) as f64;
    if count > 0 {
        total / count as f64 / 1000.0 // Convert to ms
    } else {
        0.0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSnapshot {
    pub runs_started: usize,
    pub runs_succeeded: usize,
    pub runs_failed: usize,
    pub runs_cancelled: usize,
    pub avg_extract_time_ms: f64,
    pub avg_score_time_ms: f64,
    pub avg_assemble_time_ms: f64,
    pub avg_report_time_ms: f64,
    pub total_chunks_processed: usize,
    pub total_events_extracted: usize,
    pub total_relationships_assembled: usize,
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

    #[test]
    fn averages_are_per_successful_run() {
        let metrics = Metrics::new();
        metrics.record_started();
        metrics.record_started();
        metrics.record_stage(Stage::Scoring, Duration::from_millis(8));
        metrics.record_finished(true, false);
        metrics.record_finished(false, true);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.runs_started, 2);
        assert_eq!(snapshot.runs_succeeded, 1);
        assert_eq!(snapshot.runs_cancelled, 1);
        assert_eq!(snapshot.runs_failed, 0);
        assert!((snapshot.avg_score_time_ms - 8.0).abs() < 1e-9);
    }
}
