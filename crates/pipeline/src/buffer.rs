//! Fixed-capacity circular buffers of shared snapshots.
//!
//! Entries are `Arc`s so a fetch hands out snapshots without copying and
//! without holding the buffer lock while the caller looks at them.
//! Once full, each insert evicts exactly the oldest entry.

use std::fmt;
use std::sync::Arc;

use contracts::{Reading, ReadingSet};
use ringbuf::{traits::*, HeapRb};

/// Overwrite-oldest ring of shared entries with a single-shot read cursor
pub struct CircularBuffer<T> {
    ring: HeapRb<Arc<T>>,
    /// Entries inserted since the last single-shot extraction, newest last
    unread: usize,
    evicted: u64,
}

/// Buffer of reading set snapshots
pub type ReadingSetCircularBuffer = CircularBuffer<ReadingSet>;

/// Buffer of single reading snapshots
pub type ReadingCircularBuffer = CircularBuffer<Reading>;

impl<T> fmt::Debug for CircularBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircularBuffer")
            .field("len", &self.ring.occupied_len())
            .field("capacity", &self.capacity())
            .field("unread", &self.unread)
            .field("evicted", &self.evicted)
            .finish()
    }
}

impl<T> CircularBuffer<T> {
    /// Create a buffer holding at most `capacity` entries (at least one)
    pub fn new(capacity: usize) -> Self {
        Self {
            ring: HeapRb::new(capacity.max(1)),
            unread: 0,
            evicted: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.ring.capacity().get()
    }

    pub fn len(&self) -> usize {
        self.ring.occupied_len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Entries not yet returned by a single-shot extraction
    pub fn unread(&self) -> usize {
        self.unread
    }

    /// Entries lost to overwrite since construction
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Insert an already shared entry, evicting the oldest when full
    pub fn insert_shared(&mut self, entry: Arc<T>) {
        if self.ring.push_overwrite(entry).is_some() {
            self.evicted += 1;
        }
        self.unread = (self.unread + 1).min(self.len());
    }

    /// Read entries.
    ///
    /// `all = true` returns every entry, oldest to newest, and leaves the read
    /// cursor alone. `all = false` returns the oldest unread entry (or nothing)
    /// and advances the cursor past it. Entries are never removed.
    pub fn extract(&mut self, all: bool) -> Vec<Arc<T>> {
        if all {
            return self.ring.iter().cloned().collect();
        }
        if self.unread == 0 {
            return Vec::new();
        }
        let oldest_unread = self.len() - self.unread;
        self.unread -= 1;
        self.ring.iter().nth(oldest_unread).cloned().into_iter().collect()
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.ring.clear();
        self.unread = 0;
    }
}

impl CircularBuffer<ReadingSet> {
    /// Store a deep copy of `set`; the live set is never retained
    pub fn insert(&mut self, set: &ReadingSet) {
        self.insert_shared(Arc::new(set.deep_copy()));
    }
}

impl CircularBuffer<Reading> {
    /// Store a deep copy of every reading in `set`, in order
    pub fn insert(&mut self, set: &ReadingSet) {
        for reading in set {
            self.insert_shared(Arc::new(reading.deep_copy()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::Datapoint;

    fn set_of(asset: &str) -> ReadingSet {
        ReadingSet::new(vec![Reading::single(asset, Datapoint::new("v", 1i64))])
    }

    fn assets(entries: &[Arc<ReadingSet>]) -> Vec<String> {
        entries
            .iter()
            .map(|s| s.readings()[0].asset_name().to_string())
            .collect()
    }

    #[test]
    fn test_overwrite_keeps_newest_in_order() {
        let mut buffer = ReadingSetCircularBuffer::new(3);
        for asset in ["A", "B", "C", "D"] {
            buffer.insert(&set_of(asset));
        }
        assert_eq!(buffer.len(), 3);
        assert_eq!(buffer.evicted(), 1);
        assert_eq!(assets(&buffer.extract(true)), vec!["B", "C", "D"]);
    }

    #[test]
    fn test_overwrite_many() {
        let capacity = 5;
        let k = 7;
        let mut buffer = ReadingSetCircularBuffer::new(capacity);
        for i in 0..capacity + k {
            buffer.insert(&set_of(&format!("a{i}")));
        }
        let all = buffer.extract(true);
        assert_eq!(all.len(), capacity);
        let expected: Vec<String> = (k..capacity + k).map(|i| format!("a{i}")).collect();
        assert_eq!(assets(&all), expected);
    }

    #[test]
    fn test_single_shot_advances_cursor_only() {
        let mut buffer = ReadingSetCircularBuffer::new(4);
        buffer.insert(&set_of("A"));
        buffer.insert(&set_of("B"));

        assert_eq!(assets(&buffer.extract(false)), vec!["A"]);
        assert_eq!(assets(&buffer.extract(false)), vec!["B"]);
        assert!(buffer.extract(false).is_empty());

        // nothing was removed
        assert_eq!(buffer.len(), 2);
        buffer.insert(&set_of("C"));
        assert_eq!(assets(&buffer.extract(false)), vec!["C"]);
        assert_eq!(assets(&buffer.extract(true)), vec!["A", "B", "C"]);
    }

    #[test]
    fn test_unread_capped_by_eviction() {
        let mut buffer = ReadingSetCircularBuffer::new(2);
        for asset in ["A", "B", "C"] {
            buffer.insert(&set_of(asset));
        }
        assert_eq!(buffer.unread(), 2);
        assert_eq!(assets(&buffer.extract(false)), vec!["B"]);
    }

    #[test]
    fn test_reading_buffer_splits_sets() {
        let mut buffer = ReadingCircularBuffer::new(10);
        let set = ReadingSet::new(vec![
            Reading::single("x", Datapoint::new("v", 1i64)),
            Reading::single("y", Datapoint::new("v", 2i64)),
        ]);
        buffer.insert(&set);
        let names: Vec<_> = buffer
            .extract(true)
            .iter()
            .map(|r| r.asset_name().to_string())
            .collect();
        assert_eq!(names, vec!["x", "y"]);
    }

    #[test]
    fn test_zero_capacity_clamped() {
        let mut buffer = ReadingSetCircularBuffer::new(0);
        assert_eq!(buffer.capacity(), 1);
        buffer.insert(&set_of("A"));
        buffer.insert(&set_of("B"));
        assert_eq!(assets(&buffer.extract(true)), vec!["B"]);
    }
}
