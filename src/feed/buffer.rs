use std::collections::VecDeque;
use std::time::Duration;

use crate::detection::Detection;

/// Bounded, most-recent-first list of retained detections.
///
/// Only the feed controller mutates it. Capacity is enforced by an explicit
/// `truncate()` after each poll cycle, so a batch larger than the capacity is
/// briefly held in full.
#[derive(Clone, Debug)]
pub struct RollingBuffer {
    entries: VecDeque<Detection>,
    capacity: usize,
}

impl RollingBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Place a batch at the front, keeping the batch's own order.
    pub fn prepend(&mut self, batch: Vec<Detection>) {
        for detection in batch.into_iter().rev() {
            self.entries.push_front(detection);
        }
    }

    /// Drop tail entries beyond the capacity. Returns how many were dropped.
    pub fn truncate(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.truncate(self.capacity);
        before - self.entries.len()
    }

    /// Evict every entry whose age has reached `max_age`.
    pub fn sweep(&mut self, now_ms: u64, max_age: Duration) -> usize {
        let max_age_ms = max_age.as_millis() as u64;
        let before = self.entries.len();
        self.entries.retain(|d| d.age_ms(now_ms) < max_age_ms);
        before - self.entries.len()
    }

    /// Restore entries (most recent first), cut to capacity. Returns how many
    /// were dropped.
    pub fn preload<I>(&mut self, entries: I) -> usize
    where
        I: IntoIterator<Item = Detection>,
    {
        self.entries.extend(entries);
        self.truncate()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Detection> + '_ {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn snapshot(&self) -> Vec<Detection> {
        self.entries.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::{BoundingBox, DetectionKind};

    fn det(label: &str, timestamp_ms: u64) -> Detection {
        Detection {
            kind: DetectionKind::Object,
            label: label.to_string(),
            confidence: 0.8,
            timestamp_ms,
            coordinates: BoundingBox::default(),
            vector: Vec::new(),
            priority: None,
            details: None,
            subtype: None,
        }
    }

    fn labels(buffer: &RollingBuffer) -> Vec<String> {
        buffer.iter().map(|d| d.label.clone()).collect()
    }

    #[test]
    fn prepend_keeps_batch_order_at_front() {
        let mut buffer = RollingBuffer::new(4);
        buffer.prepend(vec![det("a", 1), det("b", 1)]);
        buffer.prepend(vec![det("c", 2), det("d", 2)]);
        assert_eq!(labels(&buffer), vec!["c", "d", "a", "b"]);
    }

    #[test]
    fn truncate_drops_tail() {
        let mut buffer = RollingBuffer::new(2);
        buffer.prepend(vec![det("old", 1)]);
        buffer.prepend(vec![det("new1", 2), det("new2", 2)]);
        assert_eq!(buffer.truncate(), 1);
        assert_eq!(labels(&buffer), vec!["new1", "new2"]);
        assert_eq!(buffer.truncate(), 0);
    }

    #[test]
    fn sweep_evicts_at_horizon() {
        let mut buffer = RollingBuffer::new(8);
        buffer.preload(vec![det("fresh", 5_000), det("edge", 1_000), det("stale", 0)]);
        let evicted = buffer.sweep(11_000, Duration::from_secs(10));
        assert_eq!(evicted, 2);
        assert_eq!(labels(&buffer), vec!["fresh"]);
    }

    #[test]
    fn preload_is_cut_to_capacity() {
        let mut buffer = RollingBuffer::new(2);
        assert_eq!(buffer.preload(vec![det("a", 3), det("b", 2), det("c", 1)]), 1);
        assert_eq!(labels(&buffer), vec!["a", "b"]);
        assert_eq!(buffer.len(), buffer.capacity());
        assert_eq!(buffer.truncate(), 0);
    }
}
