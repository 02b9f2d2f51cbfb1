//! Running counters and the bounded dispatch history

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use serde::Serialize;
use trellis_types::Signal;

/// Snapshot of the bus counters
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BusMetrics {
    /// Signals stamped by `emit`, including rejected ones.
    pub total_signals: u64,
    pub signals_by_type: HashMap<String, u64>,
    /// Validation failures, middleware failures and handler failures.
    pub error_count: u64,
    pub handler_error_count: u64,
    /// Dispatches stopped by a middleware that never called `next`.
    pub halted_count: u64,
    /// Simple moving average over every completed emission.
    pub average_processing_time: Duration,
}

impl BusMetrics {
    pub(crate) fn record(&mut self, signal_type: &str, duration: Duration, errors: u64) {
        self.total_signals += 1;
        *self
            .signals_by_type
            .entry(signal_type.to_string())
            .or_insert(0) += 1;
        self.error_count += errors;

        let n = self.total_signals as f64;
        let avg = self.average_processing_time.as_secs_f64();
        let updated = avg + (duration.as_secs_f64() - avg) / n;
        self.average_processing_time = Duration::from_secs_f64(updated.max(0.0));
    }

    pub fn count_for(&self, signal_type: &str) -> u64 {
        self.signals_by_type.get(signal_type).copied().unwrap_or(0)
    }
}

/// How one emission ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DispatchOutcome {
    /// Routed; every handler succeeded.
    Delivered,
    /// Routed; at least one handler failed.
    HandlerErrors,
    /// A middleware stopped propagation.
    Halted,
    Rejected,
    MiddlewareFailed,
}

/// One entry of the diagnostic history
#[derive(Debug, Clone, Serialize)]
pub struct DispatchRecord {
    pub signal: Signal,
    pub success: bool,
    pub outcome: DispatchOutcome,
    pub duration: Duration,
    pub handlers_invoked: usize,
    pub error: Option<String>,
}

/// FIFO ring of the last `capacity` dispatches
#[derive(Debug)]
pub(crate) struct DispatchHistory {
    capacity: usize,
    records: VecDeque<DispatchRecord>,
}

impl DispatchHistory {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            capacity,
            records: VecDeque::with_capacity(capacity.min(1024)),
        }
    }

    pub(crate) fn push(&mut self, record: DispatchRecord) {
        if self.capacity == 0 {
            return;
        }
        while self.records.len() >= self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    pub(crate) fn snapshot(&self) -> Vec<DispatchRecord> {
        self.records.iter().cloned().collect()
    }

    pub(crate) fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use trellis_types::{SignalDraft, SignalId, SignalPayload, SignalSource};

    fn record(n: u64) -> DispatchRecord {
        DispatchRecord {
            signal: SignalDraft::new("x", SignalSource::new("p", "r"), SignalPayload::Empty)
                .stamp(SignalId::from_raw(n), Utc::now()),
            success: true,
            outcome: DispatchOutcome::Delivered,
            duration: Duration::from_millis(1),
            handlers_invoked: 0,
            error: None,
        }
    }

    #[test]
    fn test_history_evicts_oldest_first() {
        let mut history = DispatchHistory::new(3);
        for n in 1..=5 {
            history.push(record(n));
        }
        let ids: Vec<u64> = history.snapshot().iter().map(|r| r.signal.id.as_u64()).collect();
        assert_eq!(ids, vec![3, 4, 5]);
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let mut history = DispatchHistory::new(0);
        history.push(record(1));
        assert!(history.snapshot().is_empty());
    }

    #[test]
    fn test_moving_average() {
        let mut metrics = BusMetrics::default();
        metrics.record("a", Duration::from_millis(10), 0);
        metrics.record("a", Duration::from_millis(30), 1);
        metrics.record("b", Duration::from_millis(20), 0);

        assert_eq!(metrics.total_signals, 3);
        assert_eq!(metrics.count_for("a"), 2);
        assert_eq!(metrics.error_count, 1);
        let avg = metrics.average_processing_time.as_secs_f64();
        assert!((avg - 0.020).abs() < 1e-6);
    }
}
