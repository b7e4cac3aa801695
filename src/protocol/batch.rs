use std::sync::{
    Mutex,
    atomic::{AtomicI64, Ordering},
};

use log::trace;

use crate::connection::TCP_BUFFER_SIZE;

/// Upper bound for a single append block; one block always fits the socket buffer.
pub const MAX_BATCH_SIZE: usize = TCP_BUFFER_SIZE - 1024;

/// Observes appends and their acknowledgements to decide how many bytes of
/// appends are worth coalescing before they are flushed to the socket.
pub trait AppendBatchSizeTracker: Send + Sync {
    /// Records that an append of `size` bytes numbered `event_number` was written.
    fn record_append(&self, event_number: i64, size: usize);

    /// Records an acknowledgement up to `event_number`; returns the number of
    /// appends still awaiting acknowledgement.
    fn record_ack(&self, event_number: i64) -> i64;

    /// Bytes of appends to buffer before flushing. Zero means flush every append.
    fn append_block_size(&self) -> usize;
}

#[derive(Debug)]
struct MovingAverage {
    value: f64,
    weight: f64,
}

impl MovingAverage {
    fn new(initial: f64, weight: f64) -> Self {
        Self {
            value: initial,
            weight,
        }
    }

    fn add_sample(&mut self, sample: f64) {
        self.value = self.value * (1.0 - self.weight) + sample * self.weight;
    }
}

#[derive(Debug)]
struct Averages {
    event_size: MovingAverage,
    appends_outstanding: MovingAverage,
}

/// Tracker sizing blocks from the average event size times the average
/// number of un-acked appends. A mostly idle writer never batches.
#[derive(Debug)]
pub struct AdaptiveBatchSizeTracker {
    last_append_number: AtomicI64,
    last_ack_number: AtomicI64,
    averages: Mutex<Averages>,
}

impl Default for AdaptiveBatchSizeTracker {
    fn default() -> Self {
        Self {
            last_append_number: AtomicI64::new(0),
            last_ack_number: AtomicI64::new(0),
            averages: Mutex::new(Averages {
                event_size: MovingAverage::new(1024.0, 0.1),
                appends_outstanding: MovingAverage::new(2.0, 0.05),
            }),
        }
    }
}

impl AdaptiveBatchSizeTracker {
    fn with_averages(&self, f: impl FnOnce(&mut Averages)) {
        // A poisoned lock only means a sample was lost; keep sizing with what is there.
        let mut averages = match self.averages.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        f(&mut averages);
    }
}

impl AppendBatchSizeTracker for AdaptiveBatchSizeTracker {
    fn record_append(&self, event_number: i64, size: usize) {
        self.last_append_number.store(event_number, Ordering::Release);
        let outstanding = event_number - self.last_ack_number.load(Ordering::Acquire);
        self.with_averages(|a| {
            a.event_size.add_sample(size as f64);
            a.appends_outstanding.add_sample(outstanding as f64);
        });
    }

    fn record_ack(&self, event_number: i64) -> i64 {
        self.last_ack_number.store(event_number, Ordering::Release);
        let outstanding = self.last_append_number.load(Ordering::Acquire) - event_number;
        self.with_averages(|a| a.appends_outstanding.add_sample(outstanding as f64));
        trace!("ack {event_number}, {outstanding} appends outstanding");
        outstanding
    }

    fn append_block_size(&self) -> usize {
        let in_flight = self.last_append_number.load(Ordering::Acquire)
            - self.last_ack_number.load(Ordering::Acquire);
        if in_flight <= 1 {
            return 0;
        }
        let mut size = 0.0;
        self.with_averages(|a| size = a.appends_outstanding.value * a.event_size.value);
        (size.max(0.0) as usize).min(MAX_BATCH_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_writer_does_not_batch() {
        let tracker = AdaptiveBatchSizeTracker::default();
        tracker.record_append(1, 100);
        tracker.record_ack(1);

        assert_eq!(tracker.append_block_size(), 0);
    }

    #[test]
    fn outstanding_appends_grow_blocks() {
        let tracker = AdaptiveBatchSizeTracker::default();
        for n in 1..=50 {
            tracker.record_append(n, 512);
        }

        let size = tracker.append_block_size();
        assert!(size > 0);
        assert!(size <= MAX_BATCH_SIZE);
    }

    #[test]
    fn block_size_is_capped() {
        let tracker = AdaptiveBatchSizeTracker::default();
        for n in 1..=10_000 {
            tracker.record_append(n, 1 << 20);
        }

        assert_eq!(tracker.append_block_size(), MAX_BATCH_SIZE);
    }

    #[test]
    fn ack_reports_outstanding() {
        let tracker = AdaptiveBatchSizeTracker::default();
        for n in 1..=10 {
            tracker.record_append(n, 10);
        }

        assert_eq!(tracker.record_ack(4), 6);
        assert_eq!(tracker.record_ack(10), 0);
        assert_eq!(tracker.append_block_size(), 0);
    }
}
