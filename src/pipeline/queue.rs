use std::{
    collections::VecDeque,
    mem,
    sync::{
        Mutex, MutexGuard, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

use crate::defs::Sample;

/// Bounded FIFO between the telemetry pump and the sample sink.
///
/// Overflow drops the oldest queued sample: live telemetry favours freshness
/// over completeness, and the bound caps memory if the sink stalls.
pub struct SampleQueue {
    capacity: usize,
    dropped: AtomicU64,
    samples: Mutex<VecDeque<Sample>>,
}

impl SampleQueue {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "Queue capacity must be non-zero");

        SampleQueue {
            capacity,
            dropped: AtomicU64::new(0),
            samples: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    pub fn push(&self, sample: Sample) {
        let mut samples = self.lock();

        if samples.len() == self.capacity {
            samples.pop_front();

            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::trace!("Queue full, dropped oldest sample ({dropped} dropped so far)");
        }

        samples.push_back(sample);
    }

    /// Removes every queued sample in FIFO order. The storage is swapped out
    /// under the lock, so the producer is never blocked by a slow consumer.
    pub fn drain(&self) -> Vec<Sample> {
        Vec::from(mem::take(&mut *self.lock()))
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Total samples discarded to the overflow policy since creation.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Sample>> {
        self.samples.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(temperature: f64) -> Sample {
        Sample::now(temperature)
    }

    #[test]
    fn test_drains_in_fifo_order() {
        let queue = SampleQueue::new(4);

        for temperature in [1.0, 2.0, 3.0] {
            queue.push(sample(temperature));
        }

        let drained = queue.drain();
        let temperatures: Vec<_> = drained.iter().map(|s| s.temperature).collect();

        assert_eq!(temperatures, [1.0, 2.0, 3.0]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_overflow_drops_oldest() {
        let capacity = 4;
        let queue = SampleQueue::new(capacity);

        for temperature in 0..=capacity {
            queue.push(sample(temperature as f64));
        }

        let drained = queue.drain();
        let temperatures: Vec<_> = drained.iter().map(|s| s.temperature).collect();

        assert_eq!(drained.len(), capacity);
        assert_eq!(temperatures, [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(queue.dropped(), 1);
    }

    #[test]
    fn test_drain_resets_queue() {
        let queue = SampleQueue::new(2);

        queue.push(sample(21.5));
        assert_eq!(queue.len(), 1);

        assert_eq!(queue.drain().len(), 1);
        assert_eq!(queue.drain().len(), 0);
    }
}
