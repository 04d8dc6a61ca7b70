//! Inclusion latency measurement.
//!
//! The Confirmation Tracker records, for every tracked recipient, the time
//! from being handed over by the Sender Loop to the first poll that observed
//! its funding transfer in a block. Poll granularity bounds the resolution:
//! with a 30 s poll interval every sample is rounded up to the next poll.

use hdrhistogram::Histogram;
use std::time::Duration;

/// Histogram of inclusion latencies, in microseconds.
#[derive(Clone)]
pub struct LatencyRecorder {
    histogram: Histogram<u64>,
}

impl Default for LatencyRecorder {
    fn default() -> Self {
        Self::new()
    }
}

impl LatencyRecorder {
    pub fn new() -> Self {
        Self {
            histogram: Histogram::new(3).expect("histogram creation should succeed"),
        }
    }

    /// Record one inclusion latency.
    pub fn record(&mut self, latency: Duration) {
        let latency_us = u64::try_from(latency.as_micros()).unwrap_or(u64::MAX);
        // The histogram auto-resizes; a failed resize drops the sample.
        let _ = self.histogram.record(latency_us);
    }

    /// Number of samples recorded.
    pub fn len(&self) -> u64 {
        self.histogram.len()
    }

    pub fn is_empty(&self) -> bool {
        self.histogram.is_empty()
    }

    /// Snapshot the current distribution.
    pub fn report(&self) -> LatencyReport {
        LatencyReport {
            histogram: self.histogram.clone(),
        }
    }
}

/// Summary of recorded inclusion latencies.
pub struct LatencyReport {
    histogram: Histogram<u64>,
}

impl LatencyReport {
    /// Get the P50 (median) latency.
    pub fn p50_latency(&self) -> Duration {
        Duration::from_micros(self.histogram.value_at_quantile(0.50))
    }

    /// Get the P90 latency.
    pub fn p90_latency(&self) -> Duration {
        Duration::from_micros(self.histogram.value_at_quantile(0.90))
    }

    /// Get the P99 latency.
    pub fn p99_latency(&self) -> Duration {
        Duration::from_micros(self.histogram.value_at_quantile(0.99))
    }

    pub fn max_latency(&self) -> Duration {
        Duration::from_micros(self.histogram.max())
    }

    pub fn min_latency(&self) -> Duration {
        Duration::from_micros(self.histogram.min())
    }

    pub fn avg_latency(&self) -> Duration {
        Duration::from_micros(self.histogram.mean() as u64)
    }

    /// Number of samples in the report.
    pub fn samples(&self) -> u64 {
        self.histogram.len()
    }

    pub fn has_measurements(&self) -> bool {
        !self.histogram.is_empty()
    }

    /// Print a summary of the latency report.
    pub fn print_summary(&self) {
        println!("\n--- Inclusion Latency ---");
        if !self.has_measurements() {
            println!("No inclusions observed.");
            return;
        }
        println!("Samples: {}", self.samples());
        println!("  P50:  {:?}", self.p50_latency());
        println!("  P90:  {:?}", self.p90_latency());
        println!("  P99:  {:?}", self.p99_latency());
        println!("  Max:  {:?}", self.max_latency());
        println!("  Avg:  {:?}", self.avg_latency());
        println!("  Min:  {:?}", self.min_latency());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_report() {
        let recorder = LatencyRecorder::new();
        assert!(recorder.is_empty());
        let report = recorder.report();
        assert!(!report.has_measurements());
        assert_eq!(report.samples(), 0);
    }

    #[test]
    fn test_quantiles() {
        let mut recorder = LatencyRecorder::new();
        for secs in 1..=100 {
            recorder.record(Duration::from_secs(secs));
        }
        let report = recorder.report();
        assert_eq!(report.samples(), 100);

        // Three significant figures: allow 0.1% slack.
        let close = |actual: Duration, expected_secs: f64| {
            (actual.as_secs_f64() - expected_secs).abs() <= expected_secs * 0.001
        };
        assert!(close(report.p50_latency(), 50.0));
        assert!(close(report.p99_latency(), 99.0));
        assert!(close(report.max_latency(), 100.0));
        assert!(close(report.min_latency(), 1.0));
    }

    #[test]
    fn test_report_is_a_snapshot() {
        let mut recorder = LatencyRecorder::new();
        recorder.record(Duration::from_millis(10));
        let report = recorder.report();
        recorder.record(Duration::from_millis(20));
        assert_eq!(report.samples(), 1);
        assert_eq!(recorder.len(), 2);
    }
}
