//! Bounded FIFO ring buffer for scored telemetry
//!
//! ## Overview
//!
//! The live simulator keeps the most recent N scored samples in a ring. When
//! the ring is full, a push overwrites the oldest entry, so the buffer length
//! never exceeds its capacity and eviction order is strictly FIFO.
//!
//! Storage is allocated once at construction (capacity is a runtime setting,
//! 1000 by default) and never grows afterwards:
//!
//! ```text
//! RingBuffer capacity 5, after 7 pushes (A..G):
//! ┌─────┬─────┬─────┬─────┬─────┐
//! │  F  │  G  │  C  │  D  │  E  │  ← physical slots
//! └─────┴─────┴─────┴─────┴─────┘
//!              ↑
//!              └── write_pos = 2 (oldest entry, next to be overwritten)
//!
//! Logical view (oldest → newest): C D E F G
//! ```
//!
//! ## Thread Safety
//!
//! This type is not synchronized. The simulator wraps it in its state mutex
//! and hands readers owned copies from [`RingBuffer::latest`], never
//! references into the ring.
//!
//! ```rust
//! use orbitguard_core::buffer::RingBuffer;
//!
//! let mut ring = RingBuffer::with_capacity(3);
//! for x in ["A", "B", "C", "D"] {
//!     ring.push(x);
//! }
//! assert_eq!(ring.to_vec(), vec!["B", "C", "D"]);
//! ```

/// Fixed-capacity ring that evicts its oldest entry when full
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    /// Slots, `None` until first written
    data: Vec<Option<T>>,
    /// Index where the next write will occur
    write_pos: usize,
    /// Current number of valid entries
    len: usize,
}

impl<T> RingBuffer<T> {
    /// Create an empty ring holding at most `capacity` entries.
    ///
    /// A capacity of zero is raised to one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let mut data = Vec::with_capacity(capacity);
        data.resize_with(capacity, || None);
        Self {
            data,
            write_pos: 0,
            len: 0,
        }
    }

    /// Append an entry, evicting the oldest when full.
    ///
    /// Returns the evicted entry, if any.
    pub fn push(&mut self, item: T) -> Option<T> {
        let capacity = self.capacity();
        let evicted = self.data[self.write_pos].replace(item);
        self.write_pos = (self.write_pos + 1) % capacity;

        if self.len < capacity {
            self.len += 1;
        }
        evicted
    }

    /// Maximum number of entries
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the ring is empty
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Check if the ring is full
    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// Most recent entry
    pub fn last(&self) -> Option<&T> {
        if self.is_empty() {
            return None;
        }
        self.get(self.len - 1)
    }

    /// Entry by logical index (0 = oldest, len-1 = newest)
    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.len {
            return None;
        }

        let physical = if self.len < self.capacity() {
            index
        } else {
            (self.write_pos + index) % self.capacity()
        };
        self.data[physical].as_ref()
    }

    /// Iterate from oldest to newest
    pub fn iter(&self) -> RingIter<'_, T> {
        RingIter {
            ring: self,
            front: 0,
            back: self.len,
        }
    }

    /// Drop every entry, keeping the allocation
    pub fn clear(&mut self) {
        for slot in self.data.iter_mut() {
            *slot = None;
        }
        self.write_pos = 0;
        self.len = 0;
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Copy of the newest `n` entries, oldest first (`n` capped to `len`)
    pub fn latest(&self, n: usize) -> Vec<T> {
        let n = n.min(self.len);
        self.iter().skip(self.len - n).cloned().collect()
    }

    /// Copy of all entries, oldest first
    pub fn to_vec(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }
}

/// Iterator over ring contents
pub struct RingIter<'a, T> {
    ring: &'a RingBuffer<T>,
    front: usize,
    back: usize,
}

impl<'a, T> Iterator for RingIter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }
        let item = self.ring.get(self.front)?;
        self.front += 1;
        Some(item)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.back - self.front;
        (remaining, Some(remaining))
    }
}

impl<T> DoubleEndedIterator for RingIter<'_, T> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front >= self.back {
            return None;
        }
        self.back -= 1;
        self.ring.get(self.back)
    }
}

impl<T> ExactSizeIterator for RingIter<'_, T> {}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn empty_ring() {
        let ring: RingBuffer<u32> = RingBuffer::with_capacity(5);
        assert!(ring.is_empty());
        assert_eq!(ring.len(), 0);
        assert_eq!(ring.capacity(), 5);
        assert!(ring.last().is_none());
        assert!(ring.latest(10).is_empty());
    }

    #[test]
    fn fifo_eviction() {
        let mut ring = RingBuffer::with_capacity(3);
        assert_eq!(ring.push('A'), None);
        ring.push('B');
        ring.push('C');
        assert_eq!(ring.push('D'), Some('A'));

        assert!(ring.is_full());
        assert_eq!(ring.to_vec(), vec!['B', 'C', 'D']);
        assert_eq!(ring.last(), Some(&'D'));
    }

    #[test]
    fn latest_caps_to_len() {
        let mut ring = RingBuffer::with_capacity(10);
        for i in 0..4 {
            ring.push(i);
        }
        assert_eq!(ring.latest(2), vec![2, 3]);
        assert_eq!(ring.latest(100), vec![0, 1, 2, 3]);
        assert_eq!(ring.latest(0), Vec::<i32>::new());
    }

    #[test]
    fn reverse_iteration() {
        let mut ring = RingBuffer::with_capacity(3);
        for i in 0..5 {
            ring.push(i);
        }
        let newest_first: Vec<_> = ring.iter().rev().copied().collect();
        assert_eq!(newest_first, vec![4, 3, 2]);
        assert_eq!(ring.iter().len(), 3);
    }

    #[test]
    fn clear_resets() {
        let mut ring = RingBuffer::with_capacity(2);
        ring.push(1);
        ring.push(2);
        ring.push(3);
        ring.clear();
        assert!(ring.is_empty());
        ring.push(9);
        assert_eq!(ring.to_vec(), vec![9]);
    }

    #[test]
    fn zero_capacity_holds_one() {
        let mut ring = RingBuffer::with_capacity(0);
        ring.push(1);
        ring.push(2);
        assert_eq!(ring.to_vec(), vec![2]);
    }

    proptest! {
        #[test]
        fn keeps_newest_capacity_entries(capacity in 1usize..64, pushes in 0usize..300) {
            let mut ring = RingBuffer::with_capacity(capacity);
            for i in 0..pushes {
                ring.push(i);
            }
            let expected: Vec<usize> = (pushes.saturating_sub(capacity)..pushes).collect();
            prop_assert_eq!(ring.len(), pushes.min(capacity));
            prop_assert_eq!(ring.to_vec(), expected);
        }
    }
}
